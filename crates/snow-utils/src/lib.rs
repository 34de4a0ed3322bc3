//! Utilities shared by the Snow consensus crates.
//!
//! - [`Bag`]: a multiset of votes with an incrementally tracked mode
//! - [`logging`]: `tracing-subscriber` bootstrap

pub mod bag;
pub mod logging;

pub use bag::Bag;
