//! An in-memory network of consensus instances.
//!
//! Every node is a local [`Consensus`] instance over the same set of colors.
//! A round picks one still-running node, samples `k` nodes (possibly
//! including itself) and feeds their preferences to it as a poll. Seeding the
//! random source makes runs reproducible.

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use snow_ids::Id;
use snow_utils::Bag;

use super::{Consensus, Factory, Flat, Tree};
use crate::Parameters;

/// The consensus instance each simulated node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusKind {
    #[default]
    Tree,
    Flat,
}

impl ConsensusKind {
    #[must_use]
    pub fn build(self, factory: Arc<dyn Factory>, params: Parameters, choice: Id) -> Box<dyn Consensus> {
        match self {
            Self::Tree => Box::new(Tree::new(factory, params, choice)),
            Self::Flat => Box::new(Flat::new(factory.as_ref(), params, choice)),
        }
    }
}

impl fmt::Display for ConsensusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tree => f.write_str("tree"),
            Self::Flat => f.write_str("flat"),
        }
    }
}

/// A simulated network of consensus nodes.
pub struct Network {
    params: Parameters,
    factory: Arc<dyn Factory>,
    colors: Vec<Id>,
    rng: StdRng,
    nodes: Vec<Box<dyn Consensus>>,
    /// Indices into `nodes` of the nodes that have not finalized.
    running: Vec<usize>,
}

impl Network {
    /// Creates an empty network over `num_colors` deterministic colors.
    #[must_use]
    pub fn new(factory: Arc<dyn Factory>, params: Parameters, num_colors: usize, seed: u64) -> Self {
        let colors = (0..num_colors as u64).map(|i| Id::EMPTY.prefix(&[i])).collect();
        Self {
            params,
            factory,
            colors,
            rng: StdRng::seed_from_u64(seed),
            nodes: Vec::new(),
            running: Vec::new(),
        }
    }

    #[must_use]
    pub fn colors(&self) -> &[Id] {
        &self.colors
    }

    #[must_use]
    pub fn nodes(&self) -> &[Box<dyn Consensus>] {
        &self.nodes
    }

    #[must_use]
    pub fn num_running(&self) -> usize {
        self.running.len()
    }

    /// Adds a node that knows every color, added in a random order. The first
    /// color drawn is its initial preference. Returns `None` if the network
    /// has no colors.
    pub fn add_node(&mut self, kind: ConsensusKind) -> Option<&dyn Consensus> {
        let order = index::sample(&mut self.rng, self.colors.len(), self.colors.len()).into_vec();
        let (&first, rest) = order.split_first()?;
        self.add_node_specific_color(kind, first, rest)
    }

    /// Adds a node preferring color `initial_preference` that also knows the
    /// colors in `options`, added in the given order. Returns `None`, adding
    /// nothing, if any index is out of range.
    pub fn add_node_specific_color(
        &mut self,
        kind: ConsensusKind,
        initial_preference: usize,
        options: &[usize],
    ) -> Option<&dyn Consensus> {
        let initial = *self.colors.get(initial_preference)?;
        let options = options
            .iter()
            .map(|&option| self.colors.get(option).copied())
            .collect::<Option<Vec<Id>>>()?;

        let mut consensus = kind.build(Arc::clone(&self.factory), self.params.clone(), initial);
        for option in options {
            consensus.add(option);
        }

        if !consensus.finalized() {
            self.running.push(self.nodes.len());
        }
        self.nodes.push(consensus);
        self.nodes.last().map(|node| &**node)
    }

    /// Returns true once every node has finalized.
    #[must_use]
    pub fn finalized(&self) -> bool {
        self.running.is_empty()
    }

    /// Runs one poll for a random running node.
    pub fn round(&mut self) {
        if self.running.is_empty() {
            return;
        }

        let running_index = self.rng.gen_range(0..self.running.len());
        let node_index = self.running[running_index];

        let sample_size = self.params.k.min(self.nodes.len());
        let votes: Bag<Id> = index::sample(&mut self.rng, self.nodes.len(), sample_size)
            .into_iter()
            .map(|peer| self.nodes[peer].preference())
            .collect();

        let node = &mut self.nodes[node_index];
        node.record_poll(&votes);
        if node.finalized() {
            self.running.swap_remove(running_index);
        }
    }

    /// Returns true if every node prefers the same color.
    #[must_use]
    pub fn agreement(&self) -> bool {
        let Some(first) = self.nodes.first() else {
            return true;
        };
        let preference = first.preference();
        self.nodes.iter().all(|node| node.preference() == preference)
    }

    /// Returns true if two finalized nodes finalized on different colors.
    #[must_use]
    pub fn disagreement(&self) -> bool {
        let mut decided = self
            .nodes
            .iter()
            .filter(|node| node.finalized())
            .map(|node| node.preference());
        match decided.next() {
            Some(first) => decided.any(|preference| preference != first),
            None => false,
        }
    }

    /// Number of nodes preferring each color.
    #[must_use]
    pub fn preferences(&self) -> Bag<Id> {
        self.nodes.iter().map(|node| node.preference()).collect()
    }
}
