//! Simulation parameters.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tandem_consensus::{ConsensusConfig, DEFAULT_PROPOSAL_COOLDOWN, DEFAULT_TIMEOUT_TICKS};
use tandem_grid::{Grid, Team};
use tandem_transport::{DelayRange, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY};

use crate::{Error, Result};

/// Ticks a helper waits at the resource for its partner before giving up.
pub const DEFAULT_RENDEZVOUS_WAIT_LIMIT: u32 = 30;

/// Configuration for the simulation.
///
/// Every field has a default; a JSON file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Grid columns
    pub width: i64,
    /// Grid rows
    pub height: i64,
    /// Agents spawned per team in a random world
    pub agents_per_team: u32,
    /// Chance that a non-deposit cell starts with a resource pile
    pub resource_probability: f64,
    /// Largest starting pile
    pub max_resource: u32,
    /// Ticks `run` executes
    pub ticks: u64,
    /// Seed every random source is derived from
    pub seed: u64,
    /// Shortest message delay, in ticks
    pub min_delay: u64,
    /// Longest message delay, in ticks
    pub max_delay: u64,
    /// Ticks a consensus role may last without resolving
    pub consensus_timeout: u64,
    /// Minimum ticks between two proposals from one agent
    pub proposal_cooldown: u64,
    /// Ticks a helper waits for its partner at the resource
    pub rendezvous_wait_limit: u32,
    /// Order teams decide and act in within a tick
    pub team_order: Vec<Team>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            width: 20,
            height: 20,
            agents_per_team: 10,
            resource_probability: 0.1,
            max_resource: 3,
            ticks: 5000,
            seed: 42,
            min_delay: DEFAULT_MIN_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            consensus_timeout: DEFAULT_TIMEOUT_TICKS,
            proposal_cooldown: DEFAULT_PROPOSAL_COOLDOWN,
            rendezvous_wait_limit: DEFAULT_RENDEZVOUS_WAIT_LIMIT,
            team_order: vec![Team::Blue, Team::Red],
        }
    }
}

impl SimulationConfig {
    /// Load from a JSON file, filling unspecified fields with defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_size(mut self, width: i64, height: i64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_agents_per_team(mut self, agents: u32) -> Self {
        self.agents_per_team = agents;
        self
    }

    #[must_use]
    pub fn with_resources(mut self, probability: f64, max_resource: u32) -> Self {
        self.resource_probability = probability;
        self.max_resource = max_resource;
        self
    }

    #[must_use]
    pub fn with_ticks(mut self, ticks: u64) -> Self {
        self.ticks = ticks;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, min: u64, max: u64) -> Self {
        self.min_delay = min;
        self.max_delay = max;
        self
    }

    #[must_use]
    pub fn with_consensus_timeout(mut self, ticks: u64) -> Self {
        self.consensus_timeout = ticks;
        self
    }

    #[must_use]
    pub fn with_proposal_cooldown(mut self, ticks: u64) -> Self {
        self.proposal_cooldown = ticks;
        self
    }

    #[must_use]
    pub fn with_rendezvous_wait_limit(mut self, ticks: u32) -> Self {
        self.rendezvous_wait_limit = ticks;
        self
    }

    #[must_use]
    pub fn with_team_order(mut self, order: Vec<Team>) -> Self {
        self.team_order = order;
        self
    }

    /// Check the parameters describe a runnable world.
    pub fn validate(&self) -> Result<()> {
        let cells = Grid::area(self.width, self.height)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if cells < Team::ALL.len() {
            return Err(Error::InvalidConfig(
                "grid too small for one deposit per team".into(),
            ));
        }
        if self.agents_per_team as usize > cells {
            return Err(Error::InvalidConfig(format!(
                "{} agents per team do not fit on {} cells",
                self.agents_per_team, cells
            )));
        }
        if !(0.0..=1.0).contains(&self.resource_probability) {
            return Err(Error::InvalidConfig(format!(
                "resource probability {} outside [0, 1]",
                self.resource_probability
            )));
        }
        self.delay()?;
        let mut order = self.team_order.clone();
        order.sort();
        if order != Team::ALL {
            return Err(Error::InvalidConfig(format!(
                "team order must name every team once, got {:?}",
                self.team_order
            )));
        }
        Ok(())
    }

    /// Delay range for team transports.
    pub fn delay(&self) -> Result<DelayRange> {
        Ok(DelayRange::new(self.min_delay, self.max_delay)?)
    }

    /// Consensus parameters shared by every agent.
    pub fn consensus(&self) -> ConsensusConfig {
        ConsensusConfig::default()
            .with_timeout_ticks(self.consensus_timeout)
            .with_proposal_cooldown(self.proposal_cooldown)
    }
}
