//! Snowball family of repeated-sampling consensus primitives.
//!
//! The primitives nest: a [`Sampler`] (slush) remembers the last successful
//! choice, a snowflake instance wraps it with consecutive-success
//! finalization, and a snowball instance wraps that with cumulative
//! preference strength. Each comes in three arities:
//!
//! - [`Unary`]: a single choice, before any conflict is known
//! - [`Binary`]: choices `0` and `1`, used per bit by the [`Tree`]
//! - [`Nnary`]: an open set of [`Id`] choices
//!
//! [`Flat`] and [`Tree`] turn an n-ary instance into a bag-driven
//! [`Consensus`]. A [`Factory`] picks snowflake or snowball semantics.

mod confidence;
mod factory;
mod flat;
pub mod network;
mod slush;
mod snowflake;
mod tree;

use std::fmt;

use snow_ids::Id;
use snow_utils::Bag;

use crate::Parameters;

pub use confidence::{BinarySnowball, NnarySnowball, UnarySnowball};
pub use factory::{FactoryKind, SnowballFactory, SnowflakeFactory};
pub use flat::Flat;
pub use slush::Sampler;
pub use snowflake::{BinarySnowflake, NnarySnowflake, Snowflake, UnarySnowflake};
pub use tree::Tree;

/// Consensus over an open set of choices, driven by bags of votes.
pub trait Consensus: fmt::Display + Send + Sync {
    /// Adds a new choice to vote on.
    fn add(&mut self, choice: Id);

    /// Returns the currently preferred choice.
    fn preference(&self) -> Id;

    /// Records the results of a network poll. Returns true if the poll was
    /// successful at the top level.
    fn record_poll(&mut self, votes: &Bag<Id>) -> bool;

    /// Resets the confidence counters after a poll that failed to gather
    /// enough responses.
    fn record_unsuccessful_poll(&mut self);

    /// Returns true once the preference can no longer change.
    fn finalized(&self) -> bool;
}

/// Builds the per-arity instances backing a [`Consensus`].
pub trait Factory: fmt::Debug + Send + Sync {
    fn new_nnary(&self, params: &Parameters, choice: Id) -> Box<dyn Nnary>;
    fn new_unary(&self, params: &Parameters) -> Box<dyn Unary>;
}

/// A snow instance deciding between an open set of [`Id`]s.
pub trait Nnary: fmt::Display + Send + Sync {
    /// Adds a new possible choice.
    fn add(&mut self, choice: Id);

    fn preference(&self) -> Id;

    /// Records a successful poll that returned `count` votes for `choice`.
    fn record_poll(&mut self, count: usize, choice: Id);

    fn record_unsuccessful_poll(&mut self);

    fn finalized(&self) -> bool;
}

/// A snow instance deciding between `0` and `1`.
pub trait Binary: fmt::Display + Send + Sync {
    fn preference(&self) -> usize;

    /// Records a poll that returned `count` votes for `choice`.
    fn record_poll(&mut self, count: usize, choice: usize);

    fn record_unsuccessful_poll(&mut self);

    fn finalized(&self) -> bool;
}

/// A snow instance with a single choice.
pub trait Unary: fmt::Display + Send + Sync {
    /// Records a poll that returned `count` votes for the choice.
    fn record_poll(&mut self, count: usize);

    fn record_unsuccessful_poll(&mut self);

    fn finalized(&self) -> bool;

    /// Converts this instance into a binary one preferring `choice`. The new
    /// instance starts from a copy of this instance's confidence.
    fn extend(&self, choice: usize) -> Box<dyn Binary>;

    /// Returns an independent copy of this instance.
    fn clone_box(&self) -> Box<dyn Unary>;
}

impl Clone for Box<dyn Unary> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
