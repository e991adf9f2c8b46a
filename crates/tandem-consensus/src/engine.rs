//! Per-agent consensus state machine.
//!
//! ```text
//!            propose                 quorum / timeout
//!   Idle ───────────────▶ Proposer ───────────────────▶ Idle
//!    │                       │
//!    │ admissible Prepare    │ Prepare with a higher number
//!    ▼                       ▼
//!   Acceptor ◀──────────────-┘
//!    │
//!    │ matching Accept / timeout
//!    ▼
//!   Idle
//! ```
//!
//! The engine is pure bookkeeping: it never touches the transport. `handle`
//! and `propose` return the messages to send and the caller routes them.

use std::collections::BTreeSet;

use tandem_grid::{AgentId, GridCoord};
use tracing::{debug, trace};

use crate::{
    has_quorum, promises_needed, select_best, Ballot, ConsensusError, Message, PairingValue,
};

/// Ticks a non-idle role may last without resolving.
pub const DEFAULT_TIMEOUT_TICKS: u64 = 10;

/// Minimum ticks between two proposals from the same agent.
pub const DEFAULT_PROPOSAL_COOLDOWN: u64 = 5;

/// Consensus configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusConfig {
    /// A role older than this many ticks is abandoned
    pub timeout_ticks: u64,
    /// Ticks that must pass after a proposal before the next one
    pub proposal_cooldown: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            timeout_ticks: DEFAULT_TIMEOUT_TICKS,
            proposal_cooldown: DEFAULT_PROPOSAL_COOLDOWN,
        }
    }
}

impl ConsensusConfig {
    #[must_use]
    pub fn with_timeout_ticks(mut self, ticks: u64) -> Self {
        self.timeout_ticks = ticks;
        self
    }

    #[must_use]
    pub fn with_proposal_cooldown(mut self, ticks: u64) -> Self {
        self.proposal_cooldown = ticks;
        self
    }
}

/// Consensus role of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PaxosRole {
    #[default]
    Idle,
    Proposer,
    Acceptor,
}

impl std::fmt::Display for PaxosRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Proposer => write!(f, "proposer"),
            Self::Acceptor => write!(f, "acceptor"),
        }
    }
}

/// A message the engine wants sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbound {
    /// To a single teammate
    To(AgentId, Message),
    /// To every teammate except the sender
    Broadcast(Message),
}

/// Result of processing one tick's inbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    pub outbound: Vec<Outbound>,
    /// Value this agent's own round reached quorum on
    pub decided: Option<PairingValue>,
    /// Value learned from an `Accept`
    pub learned: Option<PairingValue>,
    /// Decided or learned value that names this agent
    pub assigned: Option<PairingValue>,
    /// The role in progress expired this tick
    pub timed_out: bool,
    /// Messages ignored as stale or inadmissible
    pub ignored: usize,
}

/// Consensus state of a single agent.
#[derive(Debug, Clone)]
pub struct Consensus {
    id: AgentId,
    config: ConsensusConfig,
    role: PaxosRole,
    proposal_number: u64,
    promised: Ballot,
    accepted: Option<(u64, PairingValue)>,
    proposal: Option<PairingValue>,
    promises: BTreeSet<AgentId>,
    role_ticks: u64,
    last_proposal_at: Option<u64>,
}

impl Consensus {
    pub fn new(id: AgentId, config: ConsensusConfig) -> Self {
        Self {
            id,
            config,
            role: PaxosRole::Idle,
            proposal_number: 0,
            promised: Ballot::INITIAL,
            accepted: None,
            proposal: None,
            promises: BTreeSet::new(),
            role_ticks: 0,
            last_proposal_at: None,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn role(&self) -> PaxosRole {
        self.role
    }

    /// Number of the latest round this agent started.
    pub fn proposal_number(&self) -> u64 {
        self.proposal_number
    }

    pub fn promised(&self) -> Ballot {
        self.promised
    }

    /// Value of the round in progress, while proposing.
    pub fn current_proposal(&self) -> Option<PairingValue> {
        match self.role {
            PaxosRole::Proposer => self.proposal,
            _ => None,
        }
    }

    /// Distinct promises collected for the current round, own included.
    pub fn promise_count(&self) -> usize {
        self.promises.len()
    }

    /// Ticks left before another proposal is allowed.
    pub fn cooldown_remaining(&self, now: u64) -> u64 {
        self.last_proposal_at
            .map_or(0, |at| {
                at.saturating_add(self.config.proposal_cooldown)
                    .saturating_sub(now)
            })
    }

    pub fn can_propose(&self, now: u64) -> bool {
        self.role == PaxosRole::Idle && self.cooldown_remaining(now) == 0
    }

    /// Start a round for `resource` paired with `partner`.
    ///
    /// The new number exceeds both this agent's previous number and anything
    /// it has promised. The proposer's implicit promise is recorded at once.
    pub fn propose(
        &mut self,
        resource: GridCoord,
        partner: AgentId,
        now: u64,
    ) -> Result<Vec<Outbound>, ConsensusError> {
        if self.role != PaxosRole::Idle {
            return Err(ConsensusError::NotIdle { role: self.role });
        }
        if partner == self.id {
            return Err(ConsensusError::SelfPairing(self.id));
        }
        let remaining = self.cooldown_remaining(now);
        if remaining > 0 {
            return Err(ConsensusError::Cooldown { remaining });
        }

        let number = self.proposal_number.max(self.promised.number) + 1;
        let value = PairingValue::new(resource, self.id, partner);
        self.proposal_number = number;
        self.proposal = Some(value);
        self.promised = Ballot::new(number, self.id);
        self.promises.clear();
        self.promises.insert(self.id);
        self.last_proposal_at = Some(now);
        self.enter(PaxosRole::Proposer);

        debug!(agent = %self.id, number, %value, tick = now, "proposing");
        Ok(vec![Outbound::Broadcast(Message::Prepare {
            number,
            proposer: self.id,
        })])
    }

    /// Process one tick's inbox against a team of `live` members.
    ///
    /// Order: `Accept`, then `Prepare`, then `Promise`, then the timeout
    /// check. `Status` messages are not the engine's concern and are skipped.
    pub fn handle(&mut self, inbox: &[Message], live: usize) -> Step {
        let mut step = Step::default();

        for message in inbox {
            if let Message::Accept { number, value } = message {
                self.on_accept(*number, *value, &mut step);
            }
        }

        let prepares = inbox.iter().filter_map(|message| match message {
            Message::Prepare { number, proposer } => Some(Ballot::new(*number, *proposer)),
            _ => None,
        });
        if let Some(best) = select_best(prepares) {
            self.on_prepare(best, &mut step);
        }

        for message in inbox {
            if let Message::Promise { number, from } = message {
                self.on_promise(*number, *from, &mut step);
            }
        }
        self.check_quorum(live, &mut step);

        self.tick_role(&mut step);
        step
    }

    /// Abandon whatever round is in progress. Promises made stay binding.
    pub fn reset(&mut self) {
        if self.role != PaxosRole::Idle {
            debug!(agent = %self.id, role = %self.role, "consensus reset");
        }
        self.promises.clear();
        self.proposal = None;
        self.enter(PaxosRole::Idle);
    }

    fn enter(&mut self, role: PaxosRole) {
        self.role = role;
        self.role_ticks = 0;
    }

    fn on_accept(&mut self, number: u64, value: PairingValue, step: &mut Step) {
        if self.role == PaxosRole::Proposer || number != self.promised.number {
            trace!(agent = %self.id, number, promised = %self.promised, "ignoring accept");
            step.ignored += 1;
            return;
        }
        if self.accepted.is_some_and(|(n, _)| n == number) {
            step.ignored += 1;
            return;
        }

        self.accepted = Some((number, value));
        self.enter(PaxosRole::Idle);
        step.learned = Some(value);
        if value.includes(self.id) {
            step.assigned = Some(value);
        }
        debug!(agent = %self.id, number, %value, "learned value");
    }

    fn on_prepare(&mut self, best: Ballot, step: &mut Step) {
        if self.role == PaxosRole::Proposer {
            if best.number <= self.proposal_number {
                trace!(agent = %self.id, ballot = %best, own = self.proposal_number, "ignoring prepare");
                step.ignored += 1;
                return;
            }
            debug!(agent = %self.id, ballot = %best, own = self.proposal_number, "round superseded");
            self.promises.clear();
            self.proposal = None;
        }
        if !self.promised.admits(&best) {
            trace!(agent = %self.id, ballot = %best, promised = %self.promised, "inadmissible prepare");
            step.ignored += 1;
            return;
        }

        self.promised = best;
        self.enter(PaxosRole::Acceptor);
        step.outbound.push(Outbound::To(
            best.proposer,
            Message::Promise {
                number: best.number,
                from: self.id,
            },
        ));
        trace!(agent = %self.id, ballot = %best, "promised");
    }

    fn on_promise(&mut self, number: u64, from: AgentId, step: &mut Step) {
        if self.role != PaxosRole::Proposer || number != self.proposal_number {
            trace!(agent = %self.id, number, %from, "stale promise");
            step.ignored += 1;
            return;
        }
        self.promises.insert(from);
    }

    fn check_quorum(&mut self, live: usize, step: &mut Step) {
        if self.role != PaxosRole::Proposer {
            return;
        }
        if !has_quorum(self.promises.len(), live) {
            trace!(
                agent = %self.id,
                number = self.proposal_number,
                needed = promises_needed(self.promises.len(), live),
                "awaiting promises"
            );
            return;
        }
        let number = self.proposal_number;
        let Some(value) = self.proposal.take() else {
            self.reset();
            return;
        };

        debug!(agent = %self.id, number, promises = self.promises.len(), live, %value, "quorum reached");
        step.outbound
            .push(Outbound::Broadcast(Message::Accept { number, value }));
        self.accepted = Some((number, value));
        step.decided = Some(value);
        if value.includes(self.id) {
            step.assigned = Some(value);
        }
        self.promises.clear();
        self.enter(PaxosRole::Idle);
    }

    fn tick_role(&mut self, step: &mut Step) {
        if self.role == PaxosRole::Idle {
            return;
        }
        self.role_ticks += 1;
        if self.role_ticks > self.config.timeout_ticks {
            debug!(agent = %self.id, role = %self.role, ticks = self.role_ticks, "role timed out");
            step.timed_out = true;
            self.promises.clear();
            self.proposal = None;
            self.enter(PaxosRole::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOAL: GridCoord = GridCoord { x: 3, y: 3 };

    fn agent(id: u32) -> Consensus {
        Consensus::new(AgentId(id), ConsensusConfig::default())
    }

    fn prepare_of(out: &[Outbound]) -> Message {
        match out {
            [Outbound::Broadcast(m @ Message::Prepare { .. })] => *m,
            other => panic!("expected a single prepare broadcast, got {:?}", other),
        }
    }

    fn promise_of(step: &Step) -> (AgentId, Message) {
        match step.outbound.as_slice() {
            [Outbound::To(to, m @ Message::Promise { .. })] => (*to, *m),
            other => panic!("expected a single promise, got {:?}", other),
        }
    }

    #[test]
    fn four_agent_round_assigns_both_helpers() {
        let (mut a, mut b, mut c, mut d) = (agent(0), agent(1), agent(2), agent(3));
        let prepare = prepare_of(&a.propose(GOAL, AgentId(1), 0).unwrap());
        assert_eq!(a.role(), PaxosRole::Proposer);
        assert_eq!(a.promise_count(), 1);

        // B's promise is delayed; C and D answer first
        let _ = b.handle(&[prepare], 4);
        let (to_c, promise_c) = promise_of(&c.handle(&[prepare], 4));
        let (to_d, promise_d) = promise_of(&d.handle(&[prepare], 4));
        assert_eq!((to_c, to_d), (AgentId(0), AgentId(0)));

        let step = a.handle(&[promise_c, promise_d], 4);
        let value = PairingValue::new(GOAL, AgentId(0), AgentId(1));
        assert_eq!(step.decided, Some(value));
        assert_eq!(step.assigned, Some(value));
        assert_eq!(a.role(), PaxosRole::Idle);
        assert_eq!(a.promise_count(), 0);
        let accept = match step.outbound.as_slice() {
            [Outbound::Broadcast(m @ Message::Accept { .. })] => *m,
            other => panic!("expected accept broadcast, got {:?}", other),
        };

        let step = b.handle(&[accept], 4);
        assert_eq!(step.assigned, Some(value));
        assert_eq!(b.role(), PaxosRole::Idle);

        let step = c.handle(&[accept], 4);
        assert_eq!(step.learned, Some(value));
        assert_eq!(step.assigned, None);
    }

    #[test]
    fn half_the_team_is_not_a_quorum() {
        let mut a = agent(0);
        let _ = a.propose(GOAL, AgentId(1), 0).unwrap();
        let step = a.handle(&[Message::Promise { number: 1, from: AgentId(2) }], 4);
        assert_eq!(step.decided, None);
        assert_eq!(a.role(), PaxosRole::Proposer);
        assert_eq!(a.promise_count(), 2);
    }

    #[test]
    fn duplicate_promises_count_once() {
        let mut a = agent(0);
        let _ = a.propose(GOAL, AgentId(1), 0).unwrap();
        let promise = Message::Promise { number: 1, from: AgentId(2) };
        let step = a.handle(&[promise, promise], 4);
        assert_eq!(step.decided, None);
        assert_eq!(a.promise_count(), 2);
    }

    #[test]
    fn equal_numbers_promise_lower_proposer() {
        let mut acceptor = agent(5);
        let inbox = [
            Message::Prepare { number: 1, proposer: AgentId(3) },
            Message::Prepare { number: 1, proposer: AgentId(2) },
        ];
        let (to, promise) = promise_of(&acceptor.handle(&inbox, 6));
        assert_eq!(to, AgentId(2));
        assert_eq!(promise, Message::Promise { number: 1, from: AgentId(5) });
        assert_eq!(acceptor.promised(), Ballot::new(1, AgentId(2)));
    }

    #[test]
    fn acceptor_rejects_outranked_prepare() {
        let mut acceptor = agent(5);
        let _ = acceptor.handle(&[Message::Prepare { number: 2, proposer: AgentId(1) }], 6);
        let step = acceptor.handle(&[Message::Prepare { number: 2, proposer: AgentId(3) }], 6);
        assert!(step.outbound.is_empty());
        assert_eq!(step.ignored, 1);
        let step = acceptor.handle(&[Message::Prepare { number: 3, proposer: AgentId(3) }], 6);
        assert_eq!(promise_of(&step).0, AgentId(3));
    }

    #[test]
    fn proposer_ignores_prepares_not_above_its_own() {
        let mut a = agent(2);
        let _ = a.propose(GOAL, AgentId(3), 0).unwrap();
        let step = a.handle(&[Message::Prepare { number: 1, proposer: AgentId(0) }], 4);
        assert!(step.outbound.is_empty());
        assert_eq!(a.role(), PaxosRole::Proposer);

        let step = a.handle(&[Message::Prepare { number: 2, proposer: AgentId(3) }], 4);
        assert_eq!(promise_of(&step).0, AgentId(3));
        assert_eq!(a.role(), PaxosRole::Acceptor);
        assert_eq!(a.promise_count(), 0);
    }

    #[test]
    fn proposal_numbers_outgrow_promises() {
        let mut a = agent(0);
        let _ = a.handle(&[Message::Prepare { number: 7, proposer: AgentId(1) }], 3);
        a.reset();
        let prepare = prepare_of(&a.propose(GOAL, AgentId(1), 0).unwrap());
        assert_eq!(prepare, Message::Prepare { number: 8, proposer: AgentId(0) });
    }

    #[test]
    fn unanswered_round_times_out_after_eleven_ticks() {
        let mut a = agent(0);
        let _ = a.propose(GOAL, AgentId(1), 0).unwrap();
        for tick in 1..=10 {
            let step = a.handle(&[], 4);
            assert!(!step.timed_out, "timed out early at tick {}", tick);
            assert_eq!(a.role(), PaxosRole::Proposer);
        }
        let step = a.handle(&[], 4);
        assert!(step.timed_out);
        assert_eq!(a.role(), PaxosRole::Idle);
        assert_eq!(a.promise_count(), 0);
    }

    #[test]
    fn late_promise_after_timeout_is_stale() {
        let mut a = agent(0);
        let _ = a.propose(GOAL, AgentId(1), 0).unwrap();
        for _ in 0..11 {
            let _ = a.handle(&[], 4);
        }
        let step = a.handle(
            &[
                Message::Promise { number: 1, from: AgentId(1) },
                Message::Promise { number: 1, from: AgentId(2) },
            ],
            4,
        );
        assert_eq!(step.decided, None);
        assert_eq!(step.ignored, 2);
    }

    #[test]
    fn accept_for_other_number_is_ignored() {
        let mut b = agent(1);
        let _ = b.handle(&[Message::Prepare { number: 2, proposer: AgentId(0) }], 4);
        let value = PairingValue::new(GOAL, AgentId(0), AgentId(1));
        let step = b.handle(&[Message::Accept { number: 1, value }], 4);
        assert_eq!(step.learned, None);
        assert_eq!(b.role(), PaxosRole::Acceptor);
    }

    #[test]
    fn proposing_requires_idle_and_cooldown() {
        let mut a = agent(0);
        assert!(matches!(
            a.propose(GOAL, AgentId(0), 0),
            Err(ConsensusError::SelfPairing(AgentId(0)))
        ));
        let _ = a.propose(GOAL, AgentId(1), 10).unwrap();
        assert!(matches!(
            a.propose(GOAL, AgentId(1), 11),
            Err(ConsensusError::NotIdle { role: PaxosRole::Proposer })
        ));
        a.reset();
        assert!(!a.can_propose(12));
        assert!(matches!(
            a.propose(GOAL, AgentId(1), 12),
            Err(ConsensusError::Cooldown { remaining: 3 })
        ));
        assert!(a.can_propose(15));
    }

    #[test]
    fn unbounded_cooldown_saturates() {
        let config = ConsensusConfig::default().with_proposal_cooldown(u64::MAX);
        let mut a = Consensus::new(AgentId(0), config);
        let _ = a.propose(GOAL, AgentId(1), 5).unwrap();
        a.reset();
        assert_eq!(a.cooldown_remaining(6), u64::MAX - 6);
        assert!(!a.can_propose(u64::MAX - 1));
        assert!(a.can_propose(u64::MAX));
    }

    #[test]
    fn finished_rounds_keep_no_proposal() {
        let mut a = agent(0);
        let _ = a.propose(GOAL, AgentId(1), 0).unwrap();
        assert_eq!(
            a.current_proposal(),
            Some(PairingValue::new(GOAL, AgentId(0), AgentId(1)))
        );
        let _ = a.handle(&[Message::Promise { number: 1, from: AgentId(1) }], 2);
        assert_eq!(a.role(), PaxosRole::Idle);
        assert_eq!(a.proposal, None);

        let _ = a.propose(GOAL, AgentId(1), 10).unwrap();
        for _ in 0..11 {
            let _ = a.handle(&[], 4);
        }
        assert_eq!(a.proposal, None);

        let _ = a.propose(GOAL, AgentId(1), 20).unwrap();
        let _ = a.handle(&[Message::Prepare { number: 9, proposer: AgentId(3) }], 4);
        assert_eq!(a.role(), PaxosRole::Acceptor);
        assert_eq!(a.proposal, None);
        assert_eq!(a.current_proposal(), None);
    }
}
