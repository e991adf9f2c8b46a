//! Tandem Consensus
//!
//! Agents on a team agree on *which two of them* go after *which resource*
//! with a single-decree Paxos round, run over a delayed, deduplicating
//! transport.
//!
//! # Round
//!
//! 1. **Prepare**: an idle agent that spots a resource picks a partner and
//!    broadcasts `Prepare(n, self)` with `n` above anything it has seen.
//! 2. **Promise**: each acceptor answers the best prepare of the tick if it
//!    outranks its current promise (see [`Ballot`]).
//! 3. **Accept**: with promises from a strict majority of the live team (its
//!    own included) the proposer broadcasts `Accept(n, value)`.
//! 4. **Learn**: acceptors holding a promise for `n` record the value; the
//!    two agents it names take on the task.
//!
//! Rounds that stall are abandoned after a fixed number of ticks. There is
//! no retry inside the engine; a fresh proposal starts a fresh round.

mod ballot;
mod engine;
mod message;
mod quorum;

pub use ballot::{select_best, Ballot};
pub use engine::{
    Consensus, ConsensusConfig, Outbound, PaxosRole, Step, DEFAULT_PROPOSAL_COOLDOWN,
    DEFAULT_TIMEOUT_TICKS,
};
pub use message::{Message, PairingValue, StatusReport, TaskRole};
pub use quorum::{has_quorum, promises_needed, quorum_size};

use tandem_grid::AgentId;

/// Engine misuse. Protocol-level surprises (stale or outranked messages) are
/// not errors; the engine ignores them.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("cannot propose while {role}")]
    NotIdle { role: PaxosRole },

    #[error("agent {0} cannot pair with itself")]
    SelfPairing(AgentId),

    #[error("proposal cooldown has {remaining} ticks left")]
    Cooldown { remaining: u64 },
}
