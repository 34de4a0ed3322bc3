//! Snowflake: finalization after enough consecutive successful polls.

use std::fmt;
use std::sync::Arc;

use snow_ids::Id;

use super::{Binary, Nnary, Sampler, Unary};
use crate::parameters::TerminationCondition;

/// Snowflake over choices `0` and `1`.
pub type BinarySnowflake = Snowflake<usize>;

/// Snowflake over an open set of IDs.
pub type NnarySnowflake = Snowflake<Id>;

/// Snowflake with a single choice.
///
/// There is nothing to flip between, so every poll with enough votes counts
/// towards finalization.
#[derive(Debug, Clone)]
pub struct UnarySnowflake {
    alpha_preference: usize,
    termination_conditions: Arc<[TerminationCondition]>,
    confidence: Vec<usize>,
    finalized: bool,
}

impl UnarySnowflake {
    #[must_use]
    pub fn new(alpha_preference: usize, termination_conditions: Arc<[TerminationCondition]>) -> Self {
        Self {
            alpha_preference,
            confidence: vec![0; termination_conditions.len()],
            termination_conditions,
            finalized: false,
        }
    }

    /// Consecutive successful polls, one counter per termination condition.
    #[must_use]
    pub fn confidence(&self) -> &[usize] {
        &self.confidence
    }

    pub(crate) fn alpha_preference(&self) -> usize {
        self.alpha_preference
    }

    /// A binary snowflake preferring `choice` that continues from this
    /// instance's counters.
    pub(crate) fn extend_flake(&self, choice: usize) -> BinarySnowflake {
        Snowflake {
            sampler: Sampler::new(choice),
            alpha_preference: self.alpha_preference,
            termination_conditions: Arc::clone(&self.termination_conditions),
            confidence: self.confidence.clone(),
            finalized: self.finalized,
        }
    }
}

impl Unary for UnarySnowflake {
    fn record_poll(&mut self, count: usize) {
        record_confidence(
            &self.termination_conditions,
            &mut self.confidence,
            &mut self.finalized,
            count,
        );
    }

    fn record_unsuccessful_poll(&mut self) {
        self.confidence.fill(0);
    }

    fn finalized(&self) -> bool {
        self.finalized
    }

    fn extend(&self, choice: usize) -> Box<dyn Binary> {
        Box::new(self.extend_flake(choice))
    }

    fn clone_box(&self) -> Box<dyn Unary> {
        Box::new(self.clone())
    }
}

impl fmt::Display for UnarySnowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SF(Confidence = {:?}, Finalized = {})",
            self.confidence, self.finalized
        )
    }
}

/// Snowflake over choices of type `T`.
///
/// Wraps a [`Sampler`] and counts consecutive successful polls for the
/// current preference against each termination condition. Finalizes as soon
/// as any condition's streak reaches its `beta`.
#[derive(Debug, Clone)]
pub struct Snowflake<T> {
    sampler: Sampler<T>,
    alpha_preference: usize,
    termination_conditions: Arc<[TerminationCondition]>,
    confidence: Vec<usize>,
    finalized: bool,
}

impl<T: Copy + PartialEq> Snowflake<T> {
    #[must_use]
    pub fn new(
        alpha_preference: usize,
        termination_conditions: Arc<[TerminationCondition]>,
        choice: T,
    ) -> Self {
        Self {
            sampler: Sampler::new(choice),
            alpha_preference,
            confidence: vec![0; termination_conditions.len()],
            termination_conditions,
            finalized: false,
        }
    }

    #[must_use]
    pub fn preference(&self) -> T {
        self.sampler.preference()
    }

    #[must_use]
    pub fn confidence(&self) -> &[usize] {
        &self.confidence
    }

    #[must_use]
    pub fn finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn alpha_preference(&self) -> usize {
        self.alpha_preference
    }

    pub fn record_poll(&mut self, count: usize, choice: T) {
        if self.finalized {
            return;
        }
        if count < self.alpha_preference {
            self.record_unsuccessful_poll();
            return;
        }

        // Switching preference discards the streak of the old one.
        if choice != self.sampler.preference() {
            self.confidence.fill(0);
        }
        self.sampler.record_successful_poll(choice);

        record_confidence(
            &self.termination_conditions,
            &mut self.confidence,
            &mut self.finalized,
            count,
        );
    }

    pub fn record_unsuccessful_poll(&mut self) {
        self.confidence.fill(0);
    }
}

/// Advances the per-condition streaks for a poll with `count` votes.
///
/// Conditions are ascending in `alpha_confidence`, so the first one `count`
/// misses clears every counter from there on.
fn record_confidence(
    conditions: &[TerminationCondition],
    confidence: &mut [usize],
    finalized: &mut bool,
    count: usize,
) {
    for (i, condition) in conditions.iter().enumerate() {
        if count < condition.alpha_confidence {
            confidence[i..].fill(0);
            return;
        }
        confidence[i] += 1;
        if confidence[i] >= condition.beta {
            *finalized = true;
            return;
        }
    }
}

impl<T: fmt::Display> fmt::Display for Snowflake<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SF(Confidence = {:?}, Finalized = {}, {})",
            self.confidence, self.finalized, self.sampler
        )
    }
}

impl Binary for Snowflake<usize> {
    fn preference(&self) -> usize {
        Snowflake::preference(self)
    }

    fn record_poll(&mut self, count: usize, choice: usize) {
        Snowflake::record_poll(self, count, choice);
    }

    fn record_unsuccessful_poll(&mut self) {
        Snowflake::record_unsuccessful_poll(self);
    }

    fn finalized(&self) -> bool {
        self.finalized
    }
}

impl Nnary for Snowflake<Id> {
    // Snowflake keeps no per-choice state.
    fn add(&mut self, _choice: Id) {}

    fn preference(&self) -> Id {
        Snowflake::preference(self)
    }

    fn record_poll(&mut self, count: usize, choice: Id) {
        Snowflake::record_poll(self, count, choice);
    }

    fn record_unsuccessful_poll(&mut self) {
        Snowflake::record_unsuccessful_poll(self);
    }

    fn finalized(&self) -> bool {
        self.finalized
    }
}
