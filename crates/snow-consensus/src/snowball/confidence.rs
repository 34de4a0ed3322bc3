//! Snowball: snowflake plus cumulative preference strength.
//!
//! Strength counts every successful poll a choice ever received, not just the
//! current streak. The preference only moves to a choice whose strength
//! strictly exceeds the current leader's, which damps flapping between
//! choices that keep trading narrow wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use snow_ids::Id;

use super::{Binary, BinarySnowflake, Nnary, NnarySnowflake, Unary, UnarySnowflake};
use crate::parameters::TerminationCondition;

/// Snowball with a single choice.
#[derive(Debug, Clone)]
pub struct UnarySnowball {
    flake: UnarySnowflake,
    preference_strength: usize,
}

impl UnarySnowball {
    #[must_use]
    pub fn new(alpha_preference: usize, termination_conditions: Arc<[TerminationCondition]>) -> Self {
        Self {
            flake: UnarySnowflake::new(alpha_preference, termination_conditions),
            preference_strength: 0,
        }
    }

    #[must_use]
    pub fn preference_strength(&self) -> usize {
        self.preference_strength
    }
}

impl Unary for UnarySnowball {
    fn record_poll(&mut self, count: usize) {
        if count >= self.flake.alpha_preference() {
            self.preference_strength += 1;
        }
        self.flake.record_poll(count);
    }

    fn record_unsuccessful_poll(&mut self) {
        self.flake.record_unsuccessful_poll();
    }

    fn finalized(&self) -> bool {
        self.flake.finalized()
    }

    fn extend(&self, choice: usize) -> Box<dyn Binary> {
        let mut preference_strength = [0; 2];
        preference_strength[choice] = self.preference_strength;
        Box::new(BinarySnowball {
            flake: self.flake.extend_flake(choice),
            preference: choice,
            preference_strength,
        })
    }

    fn clone_box(&self) -> Box<dyn Unary> {
        Box::new(self.clone())
    }
}

impl fmt::Display for UnarySnowball {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SB(PreferenceStrength = {}, {})",
            self.preference_strength, self.flake
        )
    }
}

/// Snowball over choices `0` and `1`.
#[derive(Debug, Clone)]
pub struct BinarySnowball {
    flake: BinarySnowflake,
    preference: usize,
    preference_strength: [usize; 2],
}

impl BinarySnowball {
    #[must_use]
    pub fn new(
        alpha_preference: usize,
        termination_conditions: Arc<[TerminationCondition]>,
        choice: usize,
    ) -> Self {
        Self {
            flake: BinarySnowflake::new(alpha_preference, termination_conditions, choice),
            preference: choice,
            preference_strength: [0; 2],
        }
    }

    #[must_use]
    pub fn preference_strength(&self, choice: usize) -> usize {
        self.preference_strength[choice]
    }
}

impl Binary for BinarySnowball {
    fn preference(&self) -> usize {
        // The snowflake's choice is frozen once it finalizes, and may differ
        // from the strength leader.
        if self.flake.finalized() {
            return self.flake.preference();
        }
        self.preference
    }

    fn record_poll(&mut self, count: usize, choice: usize) {
        debug_assert!(choice < 2, "binary choice must be 0 or 1, got {choice}");
        if count >= self.flake.alpha_preference() {
            self.preference_strength[choice] += 1;
            if self.preference_strength[choice] > self.preference_strength[1 - choice] {
                self.preference = choice;
            }
        }
        self.flake.record_poll(count, choice);
    }

    fn record_unsuccessful_poll(&mut self) {
        self.flake.record_unsuccessful_poll();
    }

    fn finalized(&self) -> bool {
        self.flake.finalized()
    }
}

impl fmt::Display for BinarySnowball {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SB(Preference = {}, PreferenceStrength[0] = {}, PreferenceStrength[1] = {}, {})",
            self.preference, self.preference_strength[0], self.preference_strength[1], self.flake
        )
    }
}

/// Snowball over an open set of IDs.
#[derive(Debug, Clone)]
pub struct NnarySnowball {
    flake: NnarySnowflake,
    preference: Id,
    preference_strength: HashMap<Id, usize>,
    max_preference_strength: usize,
}

impl NnarySnowball {
    #[must_use]
    pub fn new(
        alpha_preference: usize,
        termination_conditions: Arc<[TerminationCondition]>,
        choice: Id,
    ) -> Self {
        Self {
            flake: NnarySnowflake::new(alpha_preference, termination_conditions, choice),
            preference: choice,
            preference_strength: HashMap::new(),
            max_preference_strength: 0,
        }
    }

    #[must_use]
    pub fn preference_strength(&self, choice: &Id) -> usize {
        self.preference_strength.get(choice).copied().unwrap_or(0)
    }
}

impl Nnary for NnarySnowball {
    // Unseen choices have zero strength, so there is nothing to record.
    fn add(&mut self, _choice: Id) {}

    fn preference(&self) -> Id {
        if self.flake.finalized() {
            return self.flake.preference();
        }
        self.preference
    }

    fn record_poll(&mut self, count: usize, choice: Id) {
        if count >= self.flake.alpha_preference() {
            let strength = self.preference_strength.entry(choice).or_insert(0);
            *strength += 1;
            if *strength > self.max_preference_strength {
                self.max_preference_strength = *strength;
                self.preference = choice;
            }
        }
        self.flake.record_poll(count, choice);
    }

    fn record_unsuccessful_poll(&mut self) {
        self.flake.record_unsuccessful_poll();
    }

    fn finalized(&self) -> bool {
        self.flake.finalized()
    }
}

impl fmt::Display for NnarySnowball {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SB(Preference = {}, PreferenceStrength = {}, {})",
            self.preference, self.max_preference_strength, self.flake
        )
    }
}
