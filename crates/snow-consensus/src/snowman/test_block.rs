//! In-memory blocks for exercising [`Topological`](super::Topological).
//!
//! A [`TestBlock`] keeps its status behind a shared lock, so a clone handed to
//! consensus and the copy kept by a test observe the same decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use snow_ids::Id;

use super::{Block, Status};
use crate::{ConsensusError, Result};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a fresh, process-unique block ID.
pub fn generate_id() -> Id {
    let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    Id::from_hash(&n.to_be_bytes())
}

/// A block whose decisions are observable through every clone.
#[derive(Debug, Clone)]
pub struct TestBlock {
    id: Id,
    parent: Id,
    height: u64,
    timestamp: DateTime<Utc>,
    status: Arc<RwLock<Status>>,
    accept_error: Option<String>,
    reject_error: Option<String>,
}

impl TestBlock {
    pub fn new(id: Id, parent: Id, height: u64) -> Self {
        Self {
            id,
            parent,
            height,
            timestamp: Utc::now(),
            status: Arc::new(RwLock::new(Status::Processing)),
            accept_error: None,
            reject_error: None,
        }
    }

    /// Creates an accepted block at height zero with a fresh ID.
    pub fn genesis() -> Self {
        let block = Self::new(generate_id(), Id::EMPTY, 0);
        *block.status.write() = Status::Accepted;
        block
    }

    /// Creates a processing child of `parent` with a fresh ID.
    pub fn child_of(parent: &TestBlock) -> Self {
        Self::new(generate_id(), parent.id, parent.height + 1)
    }

    /// Builds a chain of `len` blocks, each a child of the previous one.
    pub fn chain(parent: &TestBlock, len: usize) -> Vec<Self> {
        let mut blocks: Vec<Self> = Vec::with_capacity(len);
        for _ in 0..len {
            let block = Self::child_of(blocks.last().unwrap_or(parent));
            blocks.push(block);
        }
        blocks
    }

    /// Makes [`Block::accept`] fail with `reason`.
    pub fn with_accept_error(mut self, reason: impl Into<String>) -> Self {
        self.accept_error = Some(reason.into());
        self
    }

    /// Makes [`Block::reject`] fail with `reason`.
    pub fn with_reject_error(mut self, reason: impl Into<String>) -> Self {
        self.reject_error = Some(reason.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl Block for TestBlock {
    fn id(&self) -> Id {
        self.id
    }

    fn parent(&self) -> Id {
        self.parent
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn status(&self) -> Status {
        *self.status.read()
    }

    fn accept(&mut self) -> Result<()> {
        if let Some(reason) = &self.accept_error {
            return Err(ConsensusError::AcceptFailed {
                id: self.id,
                reason: reason.clone(),
            });
        }

        let mut status = self.status.write();
        match *status {
            Status::Unknown | Status::Rejected => Err(ConsensusError::AcceptFailed {
                id: self.id,
                reason: format!("invalid state transition from {} to Accepted", *status),
            }),
            _ => {
                *status = Status::Accepted;
                Ok(())
            }
        }
    }

    fn reject(&mut self) -> Result<()> {
        if let Some(reason) = &self.reject_error {
            return Err(ConsensusError::RejectFailed {
                id: self.id,
                reason: reason.clone(),
            });
        }

        let mut status = self.status.write();
        match *status {
            Status::Unknown | Status::Accepted => Err(ConsensusError::RejectFailed {
                id: self.id,
                reason: format!("invalid state transition from {} to Rejected", *status),
            }),
            _ => {
                *status = Status::Rejected;
                Ok(())
            }
        }
    }
}
