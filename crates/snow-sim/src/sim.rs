//! Drives a simulated network to completion.

use std::fmt;

use snow_consensus::snowball::network::Network;
use snow_ids::Id;
use snow_utils::Bag;
use tracing::{debug, info, warn};

use crate::config::SimConfig;

/// Rounds between progress reports.
const PROGRESS_INTERVAL: usize = 100_000;

/// Outcome of a simulation.
#[derive(Debug, Clone)]
pub struct Report {
    pub rounds: usize,
    pub finalized: bool,
    pub agreement: bool,
    pub disagreement: bool,
    pub preferences: Bag<Id>,
}

impl Report {
    /// Returns true if every node finalized on the same color.
    pub fn success(&self) -> bool {
        self.finalized && self.agreement && !self.disagreement
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rounds:       {}", self.rounds)?;
        writeln!(f, "finalized:    {}", self.finalized)?;
        writeln!(f, "agreement:    {}", self.agreement)?;
        writeln!(f, "disagreement: {}", self.disagreement)?;
        write!(f, "{}", self.preferences)
    }
}

/// Builds the network described by `config` and runs rounds until every
/// node finalized or the round cap is hit.
pub fn run(config: &SimConfig) -> Report {
    let factory = config.factory.into_factory();
    let mut network = Network::new(
        factory,
        config.parameters.clone(),
        config.network.colors,
        config.network.seed,
    );
    for _ in 0..config.network.nodes {
        network.add_node(config.consensus);
    }

    info!(
        factory = %config.factory,
        consensus = %config.consensus,
        nodes = config.network.nodes,
        colors = config.network.colors,
        seed = config.network.seed,
        "starting simulation"
    );

    let mut rounds = 0;
    while !network.finalized() && rounds < config.network.max_rounds {
        network.round();
        rounds += 1;

        if rounds % PROGRESS_INTERVAL == 0 {
            debug!(rounds, running = network.num_running(), "simulation progress");
        }
    }

    let report = Report {
        rounds,
        finalized: network.finalized(),
        agreement: network.agreement(),
        disagreement: network.disagreement(),
        preferences: network.preferences(),
    };

    if report.finalized {
        info!(rounds, agreement = report.agreement, "simulation finalized");
    } else {
        warn!(
            rounds,
            running = network.num_running(),
            "simulation stopped before every node finalized"
        );
    }
    if report.disagreement {
        warn!("nodes finalized on different colors");
    }

    report
}
