use std::fmt;

/// Decision and poll counters kept by [`Topological`](super::Topological).
///
/// The number of processing blocks is not stored here since it is always
/// [`Topological::num_processing`](super::Topological::num_processing).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub blocks_accepted: u64,
    pub blocks_rejected: u64,
    /// Polls that some block's tree recorded as successful.
    pub polls_successful: u64,
    pub polls_failed: u64,
}

impl Metrics {
    pub(crate) fn accepted(&mut self) {
        self.blocks_accepted += 1;
    }

    pub(crate) fn rejected(&mut self) {
        self.blocks_rejected += 1;
    }

    pub(crate) fn poll(&mut self, successful: bool) {
        if successful {
            self.polls_successful += 1;
        } else {
            self.polls_failed += 1;
        }
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accepted={} rejected={} polls_successful={} polls_failed={}",
            self.blocks_accepted, self.blocks_rejected, self.polls_successful, self.polls_failed
        )
    }
}
