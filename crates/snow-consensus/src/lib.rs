//! Snow family consensus.
//!
//! [`snowball`] holds the repeated-sampling primitives and the bag-driven
//! [`snowball::Flat`] and [`snowball::Tree`] consensus built from them.
//! [`snowman`] applies snowball trees across a chain of blocks to pick and
//! finalize a canonical chain.

mod error;
mod parameters;

pub mod snowball;
pub mod snowman;

pub use error::{ConsensusError, Result};
pub use parameters::{
    Parameters, ParametersError, TerminationCondition, MIN_PERCENT_CONNECTED_BUFFER,
};
