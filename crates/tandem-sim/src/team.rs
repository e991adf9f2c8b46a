//! A team: its agents, its transport, and its tally.

use std::collections::BTreeMap;

use tandem_consensus::{Message, TaskRole};
use tandem_grid::{AgentId, GridCoord, Team};
use tandem_transport::Transport;

use crate::agent::Agent;
use crate::events::TeamSnapshot;

#[derive(Debug)]
pub struct TeamState {
    team: Team,
    home: GridCoord,
    score: u64,
    pub(crate) agents: BTreeMap<AgentId, Agent>,
    pub(crate) transport: Transport<Message>,
}

impl TeamState {
    pub(crate) fn new(
        team: Team,
        home: GridCoord,
        agents: BTreeMap<AgentId, Agent>,
        transport: Transport<Message>,
    ) -> Self {
        Self {
            team,
            home,
            score: 0,
            agents,
            transport,
        }
    }

    pub fn team(&self) -> Team {
        self.team
    }

    /// Deposit box coordinate.
    pub fn home(&self) -> GridCoord {
        self.home
    }

    /// Units delivered so far.
    pub fn score(&self) -> u64 {
        self.score
    }

    pub(crate) fn record_score(&mut self) -> u64 {
        self.score += 1;
        self.score
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    /// Agents in id order.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn transport(&self) -> &Transport<Message> {
        &self.transport
    }

    /// Carrying pairs, lower id first.
    pub fn carrying_pairs(&self) -> Vec<(AgentId, AgentId)> {
        self.agents
            .values()
            .filter(|a| a.is_carrying())
            .filter_map(|a| a.partner().filter(|p| *p > a.id()).map(|p| (a.id(), p)))
            .collect()
    }

    /// Whether every carrier's partner is carrying and points back, and
    /// nobody else has a partner.
    pub fn pairs_consistent(&self) -> bool {
        self.agents.values().all(|a| match (a.is_carrying(), a.partner()) {
            (false, None) => true,
            (true, Some(p)) => self
                .agents
                .get(&p)
                .is_some_and(|b| b.is_carrying() && b.partner() == Some(a.id())),
            _ => false,
        })
    }

    pub fn snapshot(&self) -> TeamSnapshot {
        TeamSnapshot {
            team: self.team,
            score: self.score,
            helpers: self
                .agents
                .values()
                .filter(|a| a.task().role == TaskRole::Helper)
                .count(),
            carrying_pairs: self.carrying_pairs(),
        }
    }
}
