//! Snowman linear chain consensus.
//!
//! Snowman is a linear chain consensus protocol built on Snowball.
//! It achieves consensus on a single preferred chain of blocks.

mod metrics;
pub mod test_block;
mod topological;

use std::fmt;

use chrono::{DateTime, Utc};
use snow_ids::Id;

use crate::Result;

pub use metrics::Metrics;
pub use topological::Topological;

/// A block in the Snowman chain.
pub trait Block: Send + Sync {
    /// Returns the block's unique identifier.
    fn id(&self) -> Id;

    /// Returns the parent block's ID.
    fn parent(&self) -> Id;

    /// Returns the block's height.
    fn height(&self) -> u64;

    /// Returns the block's timestamp.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Returns the block's status.
    fn status(&self) -> Status;

    /// Accepts the block.
    fn accept(&mut self) -> Result<()>;

    /// Rejects the block.
    fn reject(&mut self) -> Result<()>;
}

/// Status of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// Not yet known to consensus
    #[default]
    Unknown,
    /// Being processed
    Processing,
    /// Accepted and finalized
    Accepted,
    /// Rejected
    Rejected,
}

impl Status {
    /// Returns true if decided (accepted or rejected).
    pub fn decided(&self) -> bool {
        matches!(self, Status::Accepted | Status::Rejected)
    }

    /// Returns true if the block was accepted.
    pub fn accepted(&self) -> bool {
        matches!(self, Status::Accepted)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Unknown => "Unknown",
            Status::Processing => "Processing",
            Status::Accepted => "Accepted",
            Status::Rejected => "Rejected",
        };
        f.write_str(s)
    }
}
