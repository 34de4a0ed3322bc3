use std::fmt;

use snow_ids::Id;
use snow_utils::Bag;

use super::{Consensus, Factory, Nnary};
use crate::Parameters;

/// Consensus that feeds the most popular vote of every poll to a single
/// n-ary instance.
pub struct Flat {
    nnary: Box<dyn Nnary>,
    params: Parameters,
}

impl Flat {
    #[must_use]
    pub fn new(factory: &dyn Factory, params: Parameters, choice: Id) -> Self {
        Self {
            nnary: factory.new_nnary(&params, choice),
            params,
        }
    }
}

impl Consensus for Flat {
    fn add(&mut self, choice: Id) {
        self.nnary.add(choice);
    }

    fn preference(&self) -> Id {
        self.nnary.preference()
    }

    fn record_poll(&mut self, votes: &Bag<Id>) -> bool {
        let (poll_mode, num_votes) = votes.mode().unwrap_or((Id::EMPTY, 0));
        self.nnary.record_poll(num_votes, poll_mode);
        num_votes >= self.params.alpha_preference
    }

    fn record_unsuccessful_poll(&mut self) {
        self.nnary.record_unsuccessful_poll();
    }

    fn finalized(&self) -> bool {
        self.nnary.finalized()
    }
}

impl fmt::Display for Flat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.nnary, f)
    }
}
