//! Consensus parameters.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fraction of stake, on top of the alpha ratio, that must stay connected for
/// the node to report itself healthy.
pub const MIN_PERCENT_CONNECTED_BUFFER: f64 = 0.2;

const BANNER: &str = r"
__________                    .___
\______   \____________     __| _/__.__.
 |    |  _/\_  __ \__  \   / __ <   |  |
 |    |   \ |  | \// __ \_/ /_/ |\___  |
 |______  / |__|  (____  /\____ |/ ____|
        \/             \/      \/\/
  ________ ________      ________________
 /  _____/ \_____  \    /  _  \__    ___/
/   \  ___  /   |   \  /  /_\  \|    |
\    \_\  \/    |    \/    |    \    |
 \______  /\_______  /\____|__  /____|
        \/         \/         \/
";

/// Reasons [`Parameters::verify`] rejects a configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParametersError {
    #[error("invalid parameters: k = {k}, alphaPreference = {alpha_preference}: fails the condition that: k/2 < alphaPreference")]
    AlphaPreferenceTooLow { k: usize, alpha_preference: usize },

    #[error("invalid parameters: alphaPreference = {alpha_preference}, alphaConfidence = {alpha_confidence}: fails the condition that: alphaPreference <= alphaConfidence")]
    AlphaConfidenceBelowPreference {
        alpha_preference: usize,
        alpha_confidence: usize,
    },

    #[error("invalid parameters: k = {k}, alphaConfidence = {alpha_confidence}: fails the condition that: alphaConfidence <= k")]
    AlphaConfidenceAboveK { k: usize, alpha_confidence: usize },

    #[error("invalid parameters: alphaConfidence = {alpha_confidence}, alphaPreference = {alpha_preference}: fails the condition that: alphaPreference <= alphaConfidence\n{}", BANNER)]
    ReservedAlphas {
        alpha_confidence: usize,
        alpha_preference: usize,
    },

    #[error("invalid parameters: concurrentRepolls = {concurrent_repolls}: fails the condition that: 0 < concurrentRepolls")]
    ZeroConcurrentRepolls { concurrent_repolls: usize },

    #[error("invalid parameters: concurrentRepolls = {concurrent_repolls}, beta = {beta}: fails the condition that: concurrentRepolls <= beta")]
    RepollsAboveBeta { concurrent_repolls: usize, beta: usize },

    #[error("invalid parameters: optimalProcessing = {optimal_processing}: fails the condition that: 0 < optimalProcessing")]
    ZeroOptimalProcessing { optimal_processing: usize },

    #[error("invalid parameters: maxOutstandingItems = {max_outstanding_items}: fails the condition that: 0 < maxOutstandingItems")]
    ZeroMaxOutstandingItems { max_outstanding_items: usize },

    #[error("invalid parameters: maxItemProcessingTime = {max_item_processing_time:?}: fails the condition that: 0 < maxItemProcessingTime")]
    ZeroMaxItemProcessingTime { max_item_processing_time: Duration },
}

/// Parameters shared by every Snow consensus instance of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
    /// Sample size: number of validators polled per round.
    pub k: usize,

    /// Votes needed for a poll to change the preference.
    pub alpha_preference: usize,

    /// Votes needed for a poll to count towards finalization.
    pub alpha_confidence: usize,

    /// Consecutive successful polls needed to finalize.
    pub beta: usize,

    /// Number of polls the engine keeps outstanding at once.
    pub concurrent_repolls: usize,

    /// Target number of processing items.
    pub optimal_processing: usize,

    /// Processing items above which the node reports itself unhealthy.
    pub max_outstanding_items: usize,

    /// Processing time above which an item makes the node unhealthy.
    #[serde(with = "duration_nanos")]
    pub max_item_processing_time: Duration,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            k: 20,
            alpha_preference: 15,
            alpha_confidence: 15,
            beta: 20,
            concurrent_repolls: 4,
            optimal_processing: 10,
            max_outstanding_items: 256,
            max_item_processing_time: Duration::from_secs(30),
        }
    }
}

/// One finalization rule: `beta` consecutive polls with at least
/// `alpha_confidence` votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationCondition {
    pub alpha_confidence: usize,
    pub beta: usize,
}

impl Parameters {
    /// Parameters with the given thresholds and default engine settings.
    #[must_use]
    pub fn new(k: usize, alpha_preference: usize, alpha_confidence: usize, beta: usize) -> Self {
        Self {
            k,
            alpha_preference,
            alpha_confidence,
            beta,
            concurrent_repolls: 1,
            ..Default::default()
        }
    }

    /// Checks that the parameters describe a safe configuration.
    ///
    /// # Errors
    ///
    /// Returns the first violated condition.
    pub fn verify(&self) -> Result<(), ParametersError> {
        let p = self;
        if p.alpha_preference <= p.k / 2 {
            return Err(ParametersError::AlphaPreferenceTooLow {
                k: p.k,
                alpha_preference: p.alpha_preference,
            });
        }
        if p.alpha_confidence < p.alpha_preference {
            return Err(ParametersError::AlphaConfidenceBelowPreference {
                alpha_preference: p.alpha_preference,
                alpha_confidence: p.alpha_confidence,
            });
        }
        if p.k < p.alpha_confidence {
            return Err(ParametersError::AlphaConfidenceAboveK {
                k: p.k,
                alpha_confidence: p.alpha_confidence,
            });
        }
        if p.alpha_confidence == 3 && p.alpha_preference == 28 {
            return Err(ParametersError::ReservedAlphas {
                alpha_confidence: p.alpha_confidence,
                alpha_preference: p.alpha_preference,
            });
        }
        if p.concurrent_repolls == 0 {
            return Err(ParametersError::ZeroConcurrentRepolls {
                concurrent_repolls: p.concurrent_repolls,
            });
        }
        if p.concurrent_repolls > p.beta {
            return Err(ParametersError::RepollsAboveBeta {
                concurrent_repolls: p.concurrent_repolls,
                beta: p.beta,
            });
        }
        if p.optimal_processing == 0 {
            return Err(ParametersError::ZeroOptimalProcessing {
                optimal_processing: p.optimal_processing,
            });
        }
        if p.max_outstanding_items == 0 {
            return Err(ParametersError::ZeroMaxOutstandingItems {
                max_outstanding_items: p.max_outstanding_items,
            });
        }
        if p.max_item_processing_time.is_zero() {
            return Err(ParametersError::ZeroMaxItemProcessingTime {
                max_item_processing_time: p.max_item_processing_time,
            });
        }
        Ok(())
    }

    /// Minimum fraction of connected stake for the node to be healthy.
    #[must_use]
    pub fn min_percent_connected_healthy(&self) -> f64 {
        let alpha_ratio = self.alpha_confidence as f64 / self.k as f64;
        alpha_ratio * (1.0 - MIN_PERCENT_CONNECTED_BUFFER) + MIN_PERCENT_CONNECTED_BUFFER
    }

    /// The finalization rules, ascending in `alpha_confidence`.
    #[must_use]
    pub fn termination_conditions(&self) -> Arc<[TerminationCondition]> {
        Arc::from(vec![TerminationCondition {
            alpha_confidence: self.alpha_confidence,
            beta: self.beta,
        }])
    }
}

mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(d.as_nanos()).map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(nanos)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_nanos(u64::deserialize(deserializer)?))
    }
}
