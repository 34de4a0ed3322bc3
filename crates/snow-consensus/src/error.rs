//! Error types for consensus.

use snow_ids::Id;
use thiserror::Error;

use crate::parameters::ParametersError;

/// Result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Errors that can occur during consensus operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error(transparent)]
    InvalidParameters(#[from] ParametersError),

    /// A block was added twice.
    #[error("duplicate block add: {0}")]
    BlockExists(Id),

    /// A block was added before its parent.
    #[error("unknown parent block: {0}")]
    ParentNotFound(Id),

    /// A block that consensus expected to hold was missing.
    #[error("block not found: {0}")]
    BlockNotFound(Id),

    /// The block failed to apply its acceptance.
    #[error("failed to accept block {id}: {reason}")]
    AcceptFailed { id: Id, reason: String },

    /// The block failed to apply its rejection.
    #[error("failed to reject block {id}: {reason}")]
    RejectFailed { id: Id, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}
