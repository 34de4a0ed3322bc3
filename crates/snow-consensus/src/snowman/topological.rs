//! Tree-structured snowman consensus.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use snow_ids::Id;
use snow_utils::Bag;
use tracing::{debug, trace};

use super::{Block, Metrics};
use crate::snowball::{Consensus, Factory, Tree};
use crate::{ConsensusError, Parameters, Result};

/// A block tracked by [`Topological`], together with the snowball tree that
/// decides between its children.
struct ChainBlock<B> {
    /// `None` only for the block consensus was initialized with.
    blk: Option<B>,
    /// Set when the tree must reset its confidence before the next
    /// successful poll is applied.
    should_falter: bool,
    /// Created when the first child is added.
    sb: Option<Tree>,
    children: HashSet<Id>,
}

impl<B: Block> ChainBlock<B> {
    fn new(blk: Option<B>) -> Self {
        Self {
            blk,
            should_falter: false,
            sb: None,
            children: HashSet::new(),
        }
    }

    fn decided(&self, last_accepted_height: u64) -> bool {
        match &self.blk {
            None => true,
            Some(blk) => blk.height() <= last_accepted_height,
        }
    }

    fn add_child(&mut self, factory: &Arc<dyn Factory>, params: &Parameters, child_id: Id) {
        match &mut self.sb {
            Some(sb) => sb.add(child_id),
            None => self.sb = Some(Tree::new(Arc::clone(factory), params.clone(), child_id)),
        }
        self.children.insert(child_id);
    }
}

/// Per-block state of the Kahn traversal.
#[derive(Default)]
struct KahnNode {
    in_degree: usize,
    votes: Bag<Id>,
}

/// Votes to apply to the tree of `parent_id`.
struct Votes {
    parent_id: Id,
    votes: Bag<Id>,
}

/// Snowman consensus over a tree of processing blocks rooted at the last
/// accepted block.
///
/// Every block with children owns a snowball [`Tree`] choosing between them.
/// Polls are propagated from the voted blocks toward the last accepted block,
/// and the preferred chain is the path of tree preferences starting there.
pub struct Topological<B> {
    factory: Arc<dyn Factory>,
    params: Parameters,
    poll_number: u64,

    last_accepted_id: Id,
    last_accepted_height: u64,

    /// Processing blocks plus the last accepted block.
    blocks: HashMap<Id, ChainBlock<B>>,

    /// Processing blocks on the preferred chain.
    preferred_ids: HashSet<Id>,
    preferred_heights: HashMap<u64, Id>,
    /// Tail of the preferred chain.
    preference: Id,

    metrics: Metrics,

    // Scratch space for vote propagation.
    leaves: HashSet<Id>,
    kahn_nodes: HashMap<Id, KahnNode>,
}

impl<B: Block> Topological<B> {
    /// Creates consensus rooted at the given last accepted block.
    pub fn new(
        factory: Arc<dyn Factory>,
        params: Parameters,
        last_accepted_id: Id,
        last_accepted_height: u64,
    ) -> Result<Self> {
        params.verify()?;

        let mut blocks = HashMap::new();
        blocks.insert(last_accepted_id, ChainBlock::new(None));

        Ok(Self {
            factory,
            params,
            poll_number: 0,
            last_accepted_id,
            last_accepted_height,
            blocks,
            preferred_ids: HashSet::new(),
            preferred_heights: HashMap::new(),
            preference: last_accepted_id,
            metrics: Metrics::default(),
            leaves: HashSet::new(),
            kahn_nodes: HashMap::new(),
        })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Returns the number of blocks that are neither accepted nor rejected.
    pub fn num_processing(&self) -> usize {
        self.blocks.len() - 1
    }

    /// Issues a block whose parent is either processing or last accepted.
    pub fn add(&mut self, blk: B) -> Result<()> {
        let blk_id = blk.id();
        let height = blk.height();
        let parent_id = blk.parent();
        trace!(block_id = %blk_id, height, "adding block");

        if self.blocks.contains_key(&blk_id) {
            return Err(ConsensusError::BlockExists(blk_id));
        }

        let parent = self
            .blocks
            .get_mut(&parent_id)
            .ok_or(ConsensusError::ParentNotFound(parent_id))?;
        parent.add_child(&self.factory, &self.params, blk_id);
        self.blocks.insert(blk_id, ChainBlock::new(Some(blk)));

        // Extending the tail keeps it preferred.
        if self.preference == parent_id {
            self.preference = blk_id;
            self.preferred_ids.insert(blk_id);
            self.preferred_heights.insert(height, blk_id);
        }

        debug!(
            block_id = %blk_id,
            height,
            parent_id = %parent_id,
            num_processing = self.num_processing(),
            "added block"
        );
        Ok(())
    }

    /// Returns true if the block is issued and not yet decided.
    pub fn processing(&self, blk_id: &Id) -> bool {
        *blk_id != self.last_accepted_id && self.blocks.contains_key(blk_id)
    }

    /// Returns true if the block is last accepted or on the preferred chain.
    pub fn is_preferred(&self, blk_id: &Id) -> bool {
        *blk_id == self.last_accepted_id || self.preferred_ids.contains(blk_id)
    }

    pub fn last_accepted(&self) -> (Id, u64) {
        (self.last_accepted_id, self.last_accepted_height)
    }

    /// Returns the tail of the preferred chain.
    pub fn preference(&self) -> Id {
        self.preference
    }

    /// Returns the preferred block at `height`, if the preferred chain
    /// reaches it.
    pub fn preference_at_height(&self, height: u64) -> Option<Id> {
        if height == self.last_accepted_height {
            return Some(self.last_accepted_id);
        }
        self.preferred_heights.get(&height).copied()
    }

    /// Returns true if the block is decided, including blocks at or below the
    /// last accepted height that consensus rejected implicitly.
    pub fn decided(&self, blk: &B) -> bool {
        blk.status().decided() || blk.height() <= self.last_accepted_height
    }

    /// Applies a poll of up to K votes.
    ///
    /// Votes for blocks that are unknown or decided are dropped. Every
    /// remaining vote also counts for the ancestors of the voted block. Each
    /// block whose children gathered at least alpha preference votes records
    /// the poll on its tree; the others falter lazily. Decisions are applied
    /// as the trees finalize, and the preferred chain is recomputed.
    pub fn record_poll(&mut self, votes: &Bag<Id>) -> Result<()> {
        self.poll_number += 1;

        let vote_stack = if votes.len() >= self.params.alpha_preference {
            self.calculate_in_degree(votes);
            self.push_votes()
        } else {
            Vec::new()
        };

        let preferred = self.vote(vote_stack)?;

        // Following a preferred block already leads to the current tail.
        if self.preferred_ids.contains(&preferred) {
            return Ok(());
        }

        self.preferred_ids.clear();
        self.preferred_heights.clear();
        self.preference = preferred;

        let last_accepted_height = self.last_accepted_height;
        let mut blk_id = preferred;
        while let Some(block) = self.blocks.get(&blk_id) {
            if block.decided(last_accepted_height) {
                break;
            }
            let Some(blk) = &block.blk else { break };
            self.preferred_ids.insert(blk_id);
            self.preferred_heights.insert(blk.height(), blk_id);
            blk_id = blk.parent();
        }

        let mut blk_id = preferred;
        while let Some(sb) = self.blocks.get(&blk_id).and_then(|block| block.sb.as_ref()) {
            let pref = sb.preference();
            self.preference = pref;
            self.preferred_ids.insert(pref);

            let Some(height) = self
                .blocks
                .get(&pref)
                .and_then(|block| block.blk.as_ref())
                .map(|blk| blk.height())
            else {
                break;
            };
            self.preferred_heights.insert(height, pref);
            blk_id = pref;
        }

        Ok(())
    }

    /// Populates the Kahn nodes of every undecided ancestor of the voted
    /// blocks and the initial set of leaves.
    fn calculate_in_degree(&mut self, votes: &Bag<Id>) {
        self.kahn_nodes.clear();
        self.leaves.clear();

        let last_accepted_height = self.last_accepted_height;
        for (vote, count) in votes.iter() {
            let Some(voted) = self.blocks.get(vote) else {
                continue;
            };
            if voted.decided(last_accepted_height) {
                continue;
            }
            let Some(blk) = &voted.blk else { continue };

            let mut parent_id = blk.parent();
            let previously_seen = self.kahn_nodes.contains_key(&parent_id);
            self.kahn_nodes
                .entry(parent_id)
                .or_default()
                .votes
                .add_count(*vote, count);

            // The ancestors were already walked.
            if previously_seen {
                continue;
            }
            self.leaves.insert(parent_id);

            while let Some(block) = self.blocks.get(&parent_id) {
                if block.decided(last_accepted_height) {
                    break;
                }
                let Some(blk) = &block.blk else { break };
                parent_id = blk.parent();

                // A block with a Kahn node already had its ancestors walked,
                // either as the parent of a vote or through another branch.
                let previously_seen = self.kahn_nodes.contains_key(&parent_id);
                self.kahn_nodes.entry(parent_id).or_default().in_degree += 1;
                self.leaves.remove(&parent_id);
                if previously_seen {
                    break;
                }
            }
        }
    }

    /// Pushes the votes from the leaves toward the last accepted block and
    /// returns the blocks that gathered at least alpha preference votes,
    /// deepest first.
    fn push_votes(&mut self) -> Vec<Votes> {
        let mut vote_stack = Vec::with_capacity(self.kahn_nodes.len());
        let last_accepted_height = self.last_accepted_height;

        while let Some(leaf_id) = self.leaves.iter().next().copied() {
            self.leaves.remove(&leaf_id);

            let kahn = self.kahn_nodes.remove(&leaf_id).unwrap_or_default();
            let Some(block) = self.blocks.get(&leaf_id) else {
                continue;
            };
            let num_votes = kahn.votes.len();
            let parent_id = if block.decided(last_accepted_height) {
                None
            } else {
                block.blk.as_ref().map(|blk| blk.parent())
            };

            if num_votes >= self.params.alpha_preference {
                vote_stack.push(Votes {
                    parent_id: leaf_id,
                    votes: kahn.votes,
                });
            }

            let Some(parent_id) = parent_id else {
                continue;
            };
            let dep = self.kahn_nodes.entry(parent_id).or_default();
            dep.in_degree = dep.in_degree.saturating_sub(1);
            dep.votes.add_count(leaf_id, num_votes);
            if dep.in_degree == 0 {
                self.leaves.insert(parent_id);
            }
        }

        vote_stack
    }

    /// Applies the vote stack from the last accepted block outward and
    /// returns the block the preferred chain should continue from.
    fn vote(&mut self, mut vote_stack: Vec<Votes>) -> Result<Id> {
        // Without an alpha majority anywhere the whole tree falters.
        if vote_stack.is_empty() {
            if let Some(last_accepted) = self.blocks.get_mut(&self.last_accepted_id) {
                last_accepted.should_falter = true;
            }
            self.metrics.poll(false);
            let num_processing = self.num_processing();
            if num_processing > 0 {
                debug!(
                    poll_number = self.poll_number,
                    num_processing, "no progress was made after processing pending blocks"
                );
            }
            return Ok(self.preference);
        }

        let mut new_preferred = self.last_accepted_id;
        let mut on_preferred_branch = true;
        let mut poll_successful = false;

        while let Some(Votes { parent_id, votes }) = vote_stack.pop() {
            // Stop once the votes reach a rejected block.
            let Some(parent) = self.blocks.get_mut(&parent_id) else {
                break;
            };
            let should_transitively_falter = parent.should_falter;
            let Some(sb) = parent.sb.as_mut() else {
                return Err(ConsensusError::Internal(format!(
                    "block {parent_id} received votes without children"
                )));
            };

            if should_transitively_falter {
                trace!(parent_id = %parent_id, "resetting confidence below parent");
                sb.record_unsuccessful_poll();
                parent.should_falter = false;
            }

            poll_successful |= sb.record_poll(&votes);
            let finalized = sb.finalized();
            let parent_preference = sb.preference();
            let children: Vec<Id> = parent.children.iter().copied().collect();

            // Only the children of the last accepted block can be accepted.
            if finalized && parent_id == self.last_accepted_id {
                self.accept_preferred_child(parent_preference, &children)?;
                self.blocks.remove(&parent_id);
            }

            if on_preferred_branch {
                new_preferred = parent_preference;
            }

            let next_id = vote_stack.last().map_or(Id::EMPTY, |next| next.parent_id);
            on_preferred_branch = on_preferred_branch && next_id == parent_preference;

            for child_id in children {
                if !should_transitively_falter && child_id == next_id {
                    continue;
                }
                // Siblings of an accepted child are already gone.
                if let Some(child) = self.blocks.get_mut(&child_id) {
                    trace!(
                        child_id = %child_id,
                        next_id = %next_id,
                        "deferring confidence reset of child block"
                    );
                    child.should_falter = true;
                }
            }
        }

        self.metrics.poll(poll_successful);
        debug!(poll_number = self.poll_number, poll_successful, "recorded poll");
        Ok(new_preferred)
    }

    /// Accepts `pref`, a child of the last accepted block, and rejects its
    /// siblings along with their descendants.
    fn accept_preferred_child(&mut self, pref: Id, children: &[Id]) -> Result<()> {
        let child = self
            .blocks
            .get_mut(&pref)
            .and_then(|block| block.blk.as_mut())
            .ok_or(ConsensusError::BlockNotFound(pref))?;

        let height = child.height();
        let timestamp = child.timestamp();
        trace!(block_id = %pref, height, %timestamp, "accepting block");
        child.accept()?;
        self.metrics.accepted();

        self.last_accepted_id = pref;
        self.last_accepted_height = height;
        // An accepted block is preferred by its status alone.
        self.preferred_ids.remove(&pref);
        self.preferred_heights.remove(&height);

        debug!(
            block_id = %pref,
            height,
            poll_number = self.poll_number,
            "accepted block"
        );

        let mut rejects = Vec::with_capacity(children.len().saturating_sub(1));
        for &child_id in children {
            if child_id == pref {
                continue;
            }
            if let Some(blk) = self
                .blocks
                .get_mut(&child_id)
                .and_then(|block| block.blk.as_mut())
            {
                trace!(
                    block_id = %child_id,
                    reason = "conflict with accepted block",
                    "rejecting block"
                );
                blk.reject()?;
                self.metrics.rejected();
            }
            rejects.push(child_id);
        }

        self.reject_transitively(rejects)
    }

    /// Removes the rejected blocks and rejects all of their descendants.
    fn reject_transitively(&mut self, mut rejected: Vec<Id>) -> Result<()> {
        while let Some(rejected_id) = rejected.pop() {
            let Some(node) = self.blocks.remove(&rejected_id) else {
                continue;
            };

            for child_id in node.children {
                if let Some(blk) = self
                    .blocks
                    .get_mut(&child_id)
                    .and_then(|block| block.blk.as_mut())
                {
                    trace!(
                        block_id = %child_id,
                        reason = "rejected ancestor",
                        "rejecting block"
                    );
                    blk.reject()?;
                    self.metrics.rejected();
                }
                rejected.push(child_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snowball::{SnowballFactory, SnowflakeFactory};
    use crate::snowman::test_block::{generate_id, TestBlock};
    use crate::snowman::Status;

    fn params(k: usize, alpha: usize, beta: usize) -> Parameters {
        Parameters::new(k, alpha, alpha, beta)
    }

    fn setup(params: Parameters) -> (TestBlock, Topological<TestBlock>) {
        let genesis = TestBlock::genesis();
        let sm = Topological::new(Arc::new(SnowballFactory), params, genesis.id(), 0).unwrap();
        (genesis, sm)
    }

    fn add(sm: &mut Topological<TestBlock>, block: &TestBlock) {
        sm.add(block.clone()).unwrap();
    }

    #[test]
    fn test_initialize() {
        let (genesis, sm) = setup(params(1, 1, 3));

        assert_eq!(sm.preference(), genesis.id());
        assert_eq!(sm.last_accepted(), (genesis.id(), 0));
        assert_eq!(sm.num_processing(), 0);
        assert_eq!(sm.preference_at_height(0), Some(genesis.id()));
    }

    #[test]
    fn test_initialize_rejects_invalid_parameters() {
        let result = Topological::<TestBlock>::new(
            Arc::new(SnowballFactory),
            Parameters::new(2, 1, 1, 1),
            Id::EMPTY,
            0,
        );
        assert!(matches!(
            result,
            Err(ConsensusError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_num_processing() {
        let (genesis, mut sm) = setup(params(1, 1, 1));
        let block = TestBlock::child_of(&genesis);

        add(&mut sm, &block);
        assert_eq!(sm.num_processing(), 1);

        sm.record_poll(&Bag::of([block.id()])).unwrap();
        assert_eq!(sm.num_processing(), 0);
        assert_eq!(block.status(), Status::Accepted);
    }

    #[test]
    fn test_add_to_tail() {
        let (genesis, mut sm) = setup(params(1, 1, 3));
        let block = TestBlock::child_of(&genesis);

        add(&mut sm, &block);
        assert_eq!(sm.preference(), block.id());
        assert!(sm.is_preferred(&block.id()));
        assert_eq!(sm.preference_at_height(1), Some(block.id()));
        assert_eq!(sm.preference_at_height(2), None);
    }

    #[test]
    fn test_add_to_non_tail() {
        let (genesis, mut sm) = setup(params(1, 1, 3));
        let first = TestBlock::child_of(&genesis);
        let second = TestBlock::child_of(&genesis);

        add(&mut sm, &first);
        add(&mut sm, &second);
        assert_eq!(sm.preference(), first.id());
        assert!(!sm.is_preferred(&second.id()));
        assert_eq!(sm.num_processing(), 2);
    }

    #[test]
    fn test_add_errors() {
        let (genesis, mut sm) = setup(params(1, 1, 3));
        let block = TestBlock::child_of(&genesis);
        let orphan = TestBlock::new(generate_id(), generate_id(), 2);

        assert_eq!(
            sm.add(orphan.clone()),
            Err(ConsensusError::ParentNotFound(orphan.parent()))
        );

        add(&mut sm, &block);
        assert_eq!(
            sm.add(block.clone()),
            Err(ConsensusError::BlockExists(block.id()))
        );
        assert_eq!(
            sm.add(genesis.clone()),
            Err(ConsensusError::BlockExists(genesis.id()))
        );
        assert_eq!(sm.num_processing(), 1);
    }

    #[test]
    fn test_status_of_previously_accepted() {
        let (genesis, sm) = setup(params(1, 1, 3));

        assert!(!sm.processing(&genesis.id()));
        assert!(sm.decided(&genesis));
        assert!(sm.is_preferred(&genesis.id()));
    }

    #[test]
    fn test_status_of_previously_rejected() {
        let (genesis, sm) = setup(params(1, 1, 3));
        let block = TestBlock::child_of(&genesis);
        let mut rejected = block.clone();
        rejected.reject().unwrap();

        assert_eq!(block.status(), Status::Rejected);
        assert!(!sm.processing(&block.id()));
        assert!(sm.decided(&block));
        assert!(!sm.is_preferred(&block.id()));
        assert_eq!(sm.preference_at_height(block.height()), None);
    }

    #[test]
    fn test_status_of_unissued() {
        let (genesis, sm) = setup(params(1, 1, 3));
        let block = TestBlock::child_of(&genesis);

        assert!(!sm.processing(&block.id()));
        assert!(!sm.decided(&block));
        assert!(!sm.is_preferred(&block.id()));
    }

    #[test]
    fn test_status_of_issued() {
        let (genesis, mut sm) = setup(params(1, 1, 3));
        let block = TestBlock::child_of(&genesis);

        add(&mut sm, &block);
        assert!(sm.processing(&block.id()));
        assert!(!sm.decided(&block));
        assert!(sm.is_preferred(&block.id()));
    }

    #[test]
    fn test_record_poll_accept_single_block() {
        let (genesis, mut sm) = setup(params(1, 1, 2));
        let block = TestBlock::child_of(&genesis);
        add(&mut sm, &block);

        let votes = Bag::of([block.id()]);
        sm.record_poll(&votes).unwrap();
        assert_eq!(sm.preference(), block.id());
        assert_eq!(sm.num_processing(), 1);
        assert_eq!(block.status(), Status::Processing);

        sm.record_poll(&votes).unwrap();
        assert_eq!(sm.preference(), block.id());
        assert_eq!(sm.num_processing(), 0);
        assert_eq!(block.status(), Status::Accepted);
        assert_eq!(sm.last_accepted(), (block.id(), 1));
        assert!(sm.is_preferred(&block.id()));
        assert!(sm.decided(&block));
    }

    #[test]
    fn test_record_poll_accept_and_reject() {
        let (genesis, mut sm) = setup(params(1, 1, 2));
        let first = TestBlock::child_of(&genesis);
        let second = TestBlock::child_of(&genesis);
        add(&mut sm, &first);
        add(&mut sm, &second);

        let votes = Bag::of([second.id()]);
        sm.record_poll(&votes).unwrap();
        assert_eq!(sm.preference(), second.id());
        assert_eq!(sm.num_processing(), 2);
        assert_eq!(first.status(), Status::Processing);
        assert_eq!(second.status(), Status::Processing);

        sm.record_poll(&votes).unwrap();
        assert_eq!(sm.preference(), second.id());
        assert_eq!(sm.num_processing(), 0);
        assert_eq!(first.status(), Status::Rejected);
        assert_eq!(second.status(), Status::Accepted);
    }

    #[test]
    fn test_record_poll_split_vote_no_change() {
        let (genesis, mut sm) = setup(Parameters::new(2, 2, 2, 1));
        let first = TestBlock::child_of(&genesis);
        let second = TestBlock::child_of(&genesis);
        add(&mut sm, &first);
        add(&mut sm, &second);

        let votes = Bag::of([first.id(), second.id()]);
        sm.record_poll(&votes).unwrap();
        assert_eq!(sm.preference(), first.id());
        assert_eq!(sm.num_processing(), 2);

        sm.record_poll(&votes).unwrap();
        assert_eq!(sm.preference(), first.id());
        assert_eq!(sm.num_processing(), 2);
    }

    #[test]
    fn test_record_poll_when_finalized() {
        let (genesis, mut sm) = setup(params(1, 1, 1));

        sm.record_poll(&Bag::of([genesis.id()])).unwrap();
        assert_eq!(sm.num_processing(), 0);
        assert_eq!(sm.preference(), genesis.id());
    }

    #[test]
    fn test_record_poll_invalid_votes() {
        let (genesis, mut sm) = setup(Parameters::new(2, 2, 2, 1));
        let block = TestBlock::child_of(&genesis);
        add(&mut sm, &block);

        let valid = Bag::of([block.id()]);
        sm.record_poll(&valid).unwrap();
        sm.record_poll(&Bag::of([generate_id(), generate_id()])).unwrap();
        sm.record_poll(&valid).unwrap();

        assert_eq!(sm.num_processing(), 1);
        assert!(sm.is_preferred(&block.id()));
        assert_eq!(block.status(), Status::Processing);
    }

    #[test]
    fn test_record_poll_reject_transitively() {
        let (genesis, mut sm) = setup(params(1, 1, 1));
        let block0 = TestBlock::child_of(&genesis);
        let block1 = TestBlock::child_of(&genesis);
        let block2 = TestBlock::child_of(&block1);
        add(&mut sm, &block0);
        add(&mut sm, &block1);
        add(&mut sm, &block2);

        //   G
        //  / \
        // 0   1
        //     |
        //     2
        sm.record_poll(&Bag::of([block0.id()])).unwrap();

        assert_eq!(sm.num_processing(), 0);
        assert_eq!(sm.preference(), block0.id());
        assert_eq!(block0.status(), Status::Accepted);
        assert_eq!(block1.status(), Status::Rejected);
        assert_eq!(block2.status(), Status::Rejected);
        assert!(!sm.processing(&block2.id()));
        assert!(sm.decided(&block2));
    }

    #[test]
    fn test_record_poll_transitively_resets_confidence() {
        let (genesis, mut sm) = setup(params(1, 1, 2));
        let block0 = TestBlock::child_of(&genesis);
        let block1 = TestBlock::child_of(&genesis);
        let block2 = TestBlock::child_of(&block1);
        let block3 = TestBlock::child_of(&block1);
        for block in [&block0, &block1, &block2, &block3] {
            add(&mut sm, block);
        }

        //   G
        //  / \
        // 0   1
        //    / \
        //   2   3
        let votes_for_2 = Bag::of([block2.id()]);
        sm.record_poll(&votes_for_2).unwrap();
        assert_eq!(sm.num_processing(), 4);
        assert_eq!(sm.preference(), block2.id());

        sm.record_poll(&Bag::new()).unwrap();
        assert_eq!(sm.num_processing(), 4);
        assert_eq!(sm.preference(), block2.id());

        sm.record_poll(&votes_for_2).unwrap();
        assert_eq!(sm.num_processing(), 4);
        assert_eq!(sm.preference(), block2.id());

        let votes_for_3 = Bag::of([block3.id()]);
        sm.record_poll(&votes_for_3).unwrap();
        assert_eq!(sm.num_processing(), 2);

        sm.record_poll(&votes_for_3).unwrap();
        assert_eq!(sm.num_processing(), 0);
        assert_eq!(sm.preference(), block3.id());
        assert_eq!(block0.status(), Status::Rejected);
        assert_eq!(block1.status(), Status::Accepted);
        assert_eq!(block2.status(), Status::Rejected);
        assert_eq!(block3.status(), Status::Accepted);
    }

    #[test]
    fn test_record_poll_transitive_voting() {
        let (genesis, mut sm) = setup(params(3, 3, 1));
        let block0 = TestBlock::child_of(&genesis);
        let block1 = TestBlock::child_of(&block0);
        let block2 = TestBlock::child_of(&block1);
        let block3 = TestBlock::child_of(&block0);
        let block4 = TestBlock::child_of(&block3);
        for block in [&block0, &block1, &block2, &block3, &block4] {
            add(&mut sm, block);
        }

        //   G
        //   |
        //   0
        //  / \
        // 1   3
        // |   |
        // 2   4
        let votes = Bag::of([block0.id(), block2.id(), block4.id()]);
        sm.record_poll(&votes).unwrap();
        assert_eq!(sm.num_processing(), 4);
        assert_eq!(block0.status(), Status::Accepted);
        assert_eq!(sm.last_accepted(), (block0.id(), 1));

        let votes_for_2 = Bag::of([block2.id(), block2.id(), block2.id()]);
        sm.record_poll(&votes_for_2).unwrap();
        assert_eq!(sm.num_processing(), 0);
        assert_eq!(sm.preference(), block2.id());
        assert_eq!(block1.status(), Status::Accepted);
        assert_eq!(block2.status(), Status::Accepted);
        assert_eq!(block3.status(), Status::Rejected);
        assert_eq!(block4.status(), Status::Rejected);
    }

    #[test]
    fn test_record_poll_vote_for_ancestor_of_voted_block() {
        let (genesis, mut sm) = setup(Parameters::new(3, 2, 2, 1));
        let chain = TestBlock::chain(&genesis, 3);
        for block in &chain {
            add(&mut sm, block);
        }

        // The vote for chain[1] is also counted through chain[2]'s vote, and
        // must not walk chain[1]'s ancestors a second time.
        let mut votes = Bag::new();
        votes.add_count(chain[1].id(), 1);
        votes.add_count(chain[2].id(), 2);
        sm.record_poll(&votes).unwrap();

        assert!(chain.iter().all(|block| block.status() == Status::Accepted));
        assert_eq!(sm.num_processing(), 0);
        assert_eq!(sm.last_accepted(), (chain[2].id(), 3));
    }

    #[test]
    fn test_record_poll_vote_for_descendant_of_voted_block() {
        let (genesis, mut sm) = setup(Parameters::new(3, 2, 2, 1));
        let chain = TestBlock::chain(&genesis, 3);
        for block in &chain {
            add(&mut sm, block);
        }

        let mut votes = Bag::new();
        votes.add_count(chain[2].id(), 2);
        votes.add_count(chain[1].id(), 1);
        sm.record_poll(&votes).unwrap();

        assert!(chain.iter().all(|block| block.status() == Status::Accepted));
        assert_eq!(sm.num_processing(), 0);
    }

    /// Builds fresh blocks for `shape` under `genesis`, applies one poll with
    /// the votes inserted in the given order and returns the block statuses.
    fn decide(
        params: &Parameters,
        genesis: Id,
        shape: &[(Id, Id, u64)],
        votes: &[Id],
    ) -> Vec<Status> {
        let mut sm =
            Topological::new(Arc::new(SnowballFactory), params.clone(), genesis, 0).unwrap();
        let blocks: Vec<TestBlock> = shape
            .iter()
            .map(|&(id, parent, height)| TestBlock::new(id, parent, height))
            .collect();
        for block in &blocks {
            add(&mut sm, block);
        }

        sm.record_poll(&Bag::of(votes.iter().copied())).unwrap();
        blocks.iter().map(Block::status).collect()
    }

    #[test]
    fn test_record_poll_shared_parent_independent_of_vote_order() {
        //   G
        //   |
        //   p
        //  / \
        // x   w
        //     |
        //     z
        let genesis = generate_id();
        let (p, x, w, z) = (generate_id(), generate_id(), generate_id(), generate_id());
        let shape = [(p, genesis, 1), (x, p, 2), (w, p, 2), (z, w, 3)];
        let params = Parameters::new(2, 2, 2, 1);

        let forward = decide(&params, genesis, &shape, &[x, z]);
        let backward = decide(&params, genesis, &shape, &[z, x]);
        assert_eq!(forward, backward);
        assert_eq!(forward[0], Status::Accepted);
        assert_eq!(forward[1..], [Status::Processing; 3]);
    }

    #[test]
    fn test_record_poll_vote_order_does_not_change_decisions() {
        //   G
        //   |
        //   a
        //  / \
        // b   d
        // |
        // c
        let genesis = generate_id();
        let (a, b, c, d) = (generate_id(), generate_id(), generate_id(), generate_id());
        let shape = [(a, genesis, 1), (b, a, 2), (c, b, 3), (d, a, 2)];
        let params = Parameters::new(4, 2, 2, 1);

        let votes = [a, b, c, d];
        let expected = decide(&params, genesis, &shape, &votes);
        assert_eq!(expected[0], Status::Accepted);

        // Every rotation, forwards and backwards.
        for shift in 0..votes.len() {
            let mut order = votes;
            order.rotate_left(shift);
            assert_eq!(decide(&params, genesis, &shape, &order), expected);
            order.reverse();
            assert_eq!(decide(&params, genesis, &shape, &order), expected);
        }
    }

    #[test]
    fn test_record_poll_diverged_voting_with_no_conflicting_bit() {
        fn id_with_first_byte(byte: u8) -> Id {
            let mut bytes = [0u8; 32];
            bytes[0] = byte;
            Id::from_bytes(bytes)
        }

        let (genesis, mut sm) = setup(params(1, 1, 2));
        let block0 = TestBlock::new(id_with_first_byte(0x06), genesis.id(), 1);
        let block1 = TestBlock::new(id_with_first_byte(0x08), genesis.id(), 1);
        let block2 = TestBlock::new(id_with_first_byte(0x01), genesis.id(), 1);
        let block3 = TestBlock::child_of(&block2);
        add(&mut sm, &block0);
        add(&mut sm, &block1);

        sm.record_poll(&Bag::of([block0.id()])).unwrap();

        // block2 conflicts with block0 on the first bit, which block0 has
        // already started to win.
        add(&mut sm, &block2);
        add(&mut sm, &block3);
        assert_eq!(sm.preference(), block0.id());

        //       G
        //     /   \
        //    *     |
        //   / \    |
        //  0   1   2
        //          |
        //          3
        // The vote for block3 reaches block2 without deciding anything.
        sm.record_poll(&Bag::of([block3.id()])).unwrap();
        assert_eq!(sm.num_processing(), 4);
        for block in [&block0, &block1, &block2, &block3] {
            assert_eq!(block.status(), Status::Processing);
        }
    }

    #[test]
    fn test_record_poll_with_default_parameters() {
        let params = Parameters::default();
        let (genesis, mut sm) = setup(params.clone());
        let block1 = TestBlock::child_of(&genesis);
        let block2 = TestBlock::child_of(&genesis);
        add(&mut sm, &block1);
        add(&mut sm, &block2);

        let mut votes = Bag::new();
        votes.add_count(block1.id(), params.alpha_confidence);
        for _ in 0..params.beta {
            assert_eq!(sm.num_processing(), 2);
            sm.record_poll(&votes).unwrap();
        }
        assert_eq!(sm.num_processing(), 0);
        assert_eq!(block1.status(), Status::Accepted);
        assert_eq!(block2.status(), Status::Rejected);
    }

    #[test]
    fn test_last_accepted() {
        let (genesis, mut sm) = setup(params(1, 1, 2));
        let block0 = TestBlock::child_of(&genesis);
        let block1 = TestBlock::child_of(&block0);
        let block2 = TestBlock::child_of(&block1);
        let block1_conflict = TestBlock::child_of(&block0);

        assert_eq!(sm.last_accepted(), (genesis.id(), 0));
        for block in [&block0, &block1, &block1_conflict, &block2] {
            add(&mut sm, block);
        }
        assert_eq!(sm.last_accepted(), (genesis.id(), 0));

        sm.record_poll(&Bag::of([block0.id()])).unwrap();
        assert_eq!(sm.last_accepted(), (genesis.id(), 0));

        sm.record_poll(&Bag::of([block1.id()])).unwrap();
        assert_eq!(sm.last_accepted(), (block0.id(), 1));

        sm.record_poll(&Bag::of([block1.id()])).unwrap();
        assert_eq!(sm.last_accepted(), (block1.id(), 2));
        assert_eq!(block1_conflict.status(), Status::Rejected);

        sm.record_poll(&Bag::of([block2.id()])).unwrap();
        assert_eq!(sm.last_accepted(), (block1.id(), 2));

        sm.record_poll(&Bag::of([block2.id()])).unwrap();
        assert_eq!(sm.last_accepted(), (block2.id(), 3));
    }

    #[test]
    fn test_record_poll_change_preferred_chain() {
        let (genesis, mut sm) = setup(params(1, 1, 10));
        let a1 = TestBlock::child_of(&genesis);
        let b1 = TestBlock::child_of(&genesis);
        let a2 = TestBlock::child_of(&a1);
        let b2 = TestBlock::child_of(&b1);
        for block in [&a1, &b1, &a2, &b2] {
            add(&mut sm, block);
        }

        //   G
        //  / \
        // a1  b1
        // |   |
        // a2  b2
        assert_eq!(sm.preference(), a2.id());
        assert!(sm.is_preferred(&a1.id()));
        assert!(sm.is_preferred(&a2.id()));
        assert!(!sm.is_preferred(&b1.id()));
        assert!(!sm.is_preferred(&b2.id()));
        assert_eq!(sm.preference_at_height(1), Some(a1.id()));
        assert_eq!(sm.preference_at_height(2), Some(a2.id()));

        sm.record_poll(&Bag::of([b2.id()])).unwrap();
        assert_eq!(sm.preference(), b2.id());
        assert!(!sm.is_preferred(&a1.id()));
        assert!(!sm.is_preferred(&a2.id()));
        assert!(sm.is_preferred(&b1.id()));
        assert!(sm.is_preferred(&b2.id()));
        assert_eq!(sm.preference_at_height(1), Some(b1.id()));
        assert_eq!(sm.preference_at_height(2), Some(b2.id()));

        // a1 has to overtake the strength b1 already gathered.
        let a1_votes = Bag::of([a1.id()]);
        sm.record_poll(&a1_votes).unwrap();
        assert_eq!(sm.preference(), b2.id());

        sm.record_poll(&a1_votes).unwrap();
        assert_eq!(sm.preference(), a2.id());
        assert!(sm.is_preferred(&a1.id()));
        assert!(sm.is_preferred(&a2.id()));
        assert!(!sm.is_preferred(&b1.id()));
        assert!(!sm.is_preferred(&b2.id()));
        assert_eq!(sm.preference_at_height(1), Some(a1.id()));
        assert_eq!(sm.preference_at_height(2), Some(a2.id()));
    }

    #[test]
    fn test_record_poll_accepts_chain() {
        let (genesis, mut sm) = setup(params(1, 1, 2));
        let chain = TestBlock::chain(&genesis, 3);
        for block in &chain {
            add(&mut sm, block);
        }
        assert_eq!(sm.preference(), chain[2].id());
        assert_eq!(sm.preference_at_height(3), Some(chain[2].id()));

        // A vote for the tail counts for every ancestor.
        let votes = Bag::of([chain[2].id()]);
        sm.record_poll(&votes).unwrap();
        assert_eq!(sm.num_processing(), 3);
        assert!(chain.iter().all(|block| block.status() == Status::Processing));

        // Each acceptance makes the next block a child of the last accepted
        // block, so the whole chain is decided by one poll.
        sm.record_poll(&votes).unwrap();
        assert_eq!(sm.num_processing(), 0);
        assert!(chain.iter().all(|block| block.status() == Status::Accepted));
        assert_eq!(sm.last_accepted(), (chain[2].id(), 3));
        assert_eq!(sm.preference(), chain[2].id());
        assert_eq!(sm.preference_at_height(3), Some(chain[2].id()));
    }

    #[test]
    fn test_record_poll_with_snowflake_factory() {
        let genesis = TestBlock::genesis();
        let mut sm =
            Topological::new(Arc::new(SnowflakeFactory), params(1, 1, 2), genesis.id(), 0)
                .unwrap();
        let first = TestBlock::child_of(&genesis);
        let second = TestBlock::child_of(&genesis);
        add(&mut sm, &first);
        add(&mut sm, &second);

        // Without accumulated strength a single vote flips the preference.
        sm.record_poll(&Bag::of([second.id()])).unwrap();
        assert_eq!(sm.preference(), second.id());
        sm.record_poll(&Bag::of([first.id()])).unwrap();
        assert_eq!(sm.preference(), first.id());

        sm.record_poll(&Bag::of([first.id()])).unwrap();
        assert_eq!(first.status(), Status::Accepted);
        assert_eq!(second.status(), Status::Rejected);
    }

    #[test]
    fn test_error_on_accept() {
        let (genesis, mut sm) = setup(params(1, 1, 1));
        let block = TestBlock::child_of(&genesis).with_accept_error("disk full");
        add(&mut sm, &block);

        let err = sm.record_poll(&Bag::of([block.id()])).unwrap_err();
        assert!(matches!(err, ConsensusError::AcceptFailed { id, .. } if id == block.id()));
    }

    #[test]
    fn test_error_on_reject_sibling() {
        let (genesis, mut sm) = setup(params(1, 1, 1));
        let block0 = TestBlock::child_of(&genesis);
        let block1 = TestBlock::child_of(&genesis).with_reject_error("disk full");
        add(&mut sm, &block0);
        add(&mut sm, &block1);

        let err = sm.record_poll(&Bag::of([block0.id()])).unwrap_err();
        assert!(matches!(err, ConsensusError::RejectFailed { id, .. } if id == block1.id()));
        assert_eq!(block0.status(), Status::Accepted);
    }

    #[test]
    fn test_error_on_transitive_rejection() {
        let (genesis, mut sm) = setup(params(1, 1, 1));
        let block0 = TestBlock::child_of(&genesis);
        let block1 = TestBlock::child_of(&genesis);
        let block2 = TestBlock::child_of(&block1).with_reject_error("disk full");
        add(&mut sm, &block0);
        add(&mut sm, &block1);
        add(&mut sm, &block2);

        let err = sm.record_poll(&Bag::of([block0.id()])).unwrap_err();
        assert!(matches!(err, ConsensusError::RejectFailed { id, .. } if id == block2.id()));
        assert_eq!(block1.status(), Status::Rejected);
    }

    #[test]
    fn test_add_block_below_unknown_root() {
        let genesis = TestBlock::genesis();
        let mut sm =
            Topological::new(Arc::new(SnowballFactory), params(1, 1, 1), generate_id(), 0)
                .unwrap();

        assert_eq!(
            sm.add(genesis.clone()),
            Err(ConsensusError::ParentNotFound(genesis.parent()))
        );
        assert_eq!(sm.num_processing(), 0);
    }

    #[test]
    fn test_metrics() {
        let (genesis, mut sm) = setup(params(1, 1, 1));
        let block0 = TestBlock::child_of(&genesis);
        let block1 = TestBlock::child_of(&genesis);
        let block2 = TestBlock::child_of(&block1);
        for block in [&block0, &block1, &block2] {
            add(&mut sm, block);
        }
        assert_eq!(*sm.metrics(), Metrics::default());

        sm.record_poll(&Bag::of([block0.id()])).unwrap();
        sm.record_poll(&Bag::new()).unwrap();

        assert_eq!(
            *sm.metrics(),
            Metrics {
                blocks_accepted: 1,
                blocks_rejected: 2,
                polls_successful: 1,
                polls_failed: 1,
            }
        );
    }
}
