//! Protocol milestones recorded on the simulation timeline.

use serde::{Deserialize, Serialize};
use tandem_consensus::PaxosRole;
use tandem_grid::{AgentId, GridCoord, Team};

/// Why a helper gave up on its rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbandonReason {
    /// The resource was gone when the helper arrived
    ResourceVanished,
    /// The partner did not show up, or never aligned, in time
    PartnerUnavailable,
}

impl std::fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceVanished => write!(f, "resource vanished"),
            Self::PartnerUnavailable => write!(f, "partner unavailable"),
        }
    }
}

/// Events that occur during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SimEvent {
    /// An agent broadcast `Prepare` for a resource
    ProposalStarted {
        team: Team,
        agent: AgentId,
        number: u64,
        resource: GridCoord,
        partner: AgentId,
        tick: u64,
    },

    /// A consensus role expired without resolving
    ConsensusTimedOut {
        team: Team,
        agent: AgentId,
        role: PaxosRole,
        tick: u64,
    },

    /// A proposer collected a quorum and broadcast `Accept`
    ValueAccepted {
        team: Team,
        proposer: AgentId,
        number: u64,
        resource: GridCoord,
        pair: (AgentId, AgentId),
        tick: u64,
    },

    /// An agent named in an accepted value took on the helper task
    HelperAssigned {
        team: Team,
        agent: AgentId,
        partner: AgentId,
        goal: GridCoord,
        tick: u64,
    },

    /// A helper dropped its task
    RendezvousAbandoned {
        team: Team,
        agent: AgentId,
        goal: GridCoord,
        reason: AbandonReason,
        tick: u64,
    },

    /// Two partners lifted a unit together
    PickedUp {
        team: Team,
        pair: (AgentId, AgentId),
        at: GridCoord,
        tick: u64,
    },

    /// Carrying partners separated; the unit went back on the grid
    Fumbled {
        team: Team,
        pair: (AgentId, AgentId),
        restored_at: GridCoord,
        tick: u64,
    },

    /// A unit reached the team's deposit box
    Deposited {
        team: Team,
        pair: (AgentId, AgentId),
        score: u64,
        tick: u64,
    },
}

impl SimEvent {
    /// Get the tick this event occurred in.
    pub fn tick(&self) -> u64 {
        match self {
            Self::ProposalStarted { tick, .. }
            | Self::ConsensusTimedOut { tick, .. }
            | Self::ValueAccepted { tick, .. }
            | Self::HelperAssigned { tick, .. }
            | Self::RendezvousAbandoned { tick, .. }
            | Self::PickedUp { tick, .. }
            | Self::Fumbled { tick, .. }
            | Self::Deposited { tick, .. } => *tick,
        }
    }

    /// Team the event belongs to.
    pub fn team(&self) -> Team {
        match self {
            Self::ProposalStarted { team, .. }
            | Self::ConsensusTimedOut { team, .. }
            | Self::ValueAccepted { team, .. }
            | Self::HelperAssigned { team, .. }
            | Self::RendezvousAbandoned { team, .. }
            | Self::PickedUp { team, .. }
            | Self::Fumbled { team, .. }
            | Self::Deposited { team, .. } => *team,
        }
    }
}

/// Per-team summary at one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    pub team: Team,
    pub score: u64,
    pub helpers: usize,
    pub carrying_pairs: Vec<(AgentId, AgentId)>,
}

/// Snapshot of the world at a specific tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub tick: u64,
    pub teams: Vec<TeamSnapshot>,
    pub resources_remaining: u64,
    pub event_count: usize,
}
