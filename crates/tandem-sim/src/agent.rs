//! Agent state and per-tick decisions.

use std::collections::BTreeMap;

use rand::{seq::SliceRandom, Rng};
use tandem_consensus::{
    Consensus, ConsensusConfig, Message, Outbound, PairingValue, StatusReport, Step, TaskRole,
};
use tandem_grid::{Action, AgentId, AgentPose, Direction, Grid, GridCoord, Team};
use tracing::{debug, warn};

use crate::events::AbandonReason;
use crate::rendezvous::{self, Observation, Plan};
use crate::Result;

/// Chance an exploring agent steps forward instead of turning.
const FORWARD_PROBABILITY: f64 = 0.75;

/// Helpers already headed for a resource before it stops attracting proposals.
const MAX_HELPERS_PER_RESOURCE: usize = 2;

/// The task an agent is pursuing, separate from its consensus role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskState {
    pub role: TaskRole,
    pub goal: Option<GridCoord>,
    /// Agent expected at the goal
    pub partner: Option<AgentId>,
    /// Ticks spent at the goal without picking up
    pub wait_ticks: u32,
}

impl TaskState {
    pub fn is_idle(&self) -> bool {
        self.role == TaskRole::None
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// What an agent does this tick, plus anything it started along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    /// Round opened this tick: proposal number and value
    pub proposed: Option<(u64, PairingValue)>,
    pub outbound: Vec<Outbound>,
    /// Goal and reason of a task dropped this tick
    pub abandoned: Option<(GridCoord, AbandonReason)>,
}

impl Decision {
    fn wait() -> Self {
        Self {
            action: Action::Wait,
            proposed: None,
            outbound: Vec::new(),
            abandoned: None,
        }
    }
}

/// One agent: its body on the grid, its task, and its consensus engine.
///
/// Everything an agent knows about teammates comes from `Status` messages
/// in its roster; it never reads another agent directly.
#[derive(Debug, Clone)]
pub struct Agent {
    pose: AgentPose,
    home: GridCoord,
    carrying: bool,
    partner: Option<AgentId>,
    task: TaskState,
    consensus: Consensus,
    roster: BTreeMap<AgentId, StatusReport>,
    tick_start: GridCoord,
}

impl Agent {
    pub fn new(pose: AgentPose, home: GridCoord, config: ConsensusConfig) -> Self {
        Self {
            home,
            carrying: false,
            partner: None,
            task: TaskState::default(),
            consensus: Consensus::new(pose.id, config),
            roster: BTreeMap::new(),
            tick_start: pose.position,
            pose,
        }
    }

    pub fn id(&self) -> AgentId {
        self.pose.id
    }

    pub fn team(&self) -> Team {
        self.pose.team
    }

    pub fn pose(&self) -> &AgentPose {
        &self.pose
    }

    pub(crate) fn pose_mut(&mut self) -> &mut AgentPose {
        &mut self.pose
    }

    pub fn position(&self) -> GridCoord {
        self.pose.position
    }

    pub fn facing(&self) -> Direction {
        self.pose.facing
    }

    /// The team's deposit box.
    pub fn home(&self) -> GridCoord {
        self.home
    }

    pub fn is_carrying(&self) -> bool {
        self.carrying
    }

    /// Carrying partner; set exactly while carrying.
    pub fn partner(&self) -> Option<AgentId> {
        self.partner
    }

    pub fn task(&self) -> &TaskState {
        &self.task
    }

    pub fn consensus(&self) -> &Consensus {
        &self.consensus
    }

    /// Latest status heard from each teammate.
    pub fn roster(&self) -> &BTreeMap<AgentId, StatusReport> {
        &self.roster
    }

    /// Position when the current tick began.
    pub fn tick_start(&self) -> GridCoord {
        self.tick_start
    }

    pub(crate) fn begin_tick(&mut self) {
        self.tick_start = self.pose.position;
    }

    /// Public state to broadcast.
    pub fn status(&self, now: u64) -> StatusReport {
        StatusReport {
            sender: self.id(),
            position: self.pose.position,
            carrying: self.carrying,
            role: self.task.role,
            goal: self.task.goal,
            sent_at: now,
        }
    }

    /// Record a teammate's status unless a newer one is already known.
    pub fn absorb_status(&mut self, report: StatusReport) {
        if report.sender == self.id() {
            return;
        }
        match self.roster.get(&report.sender) {
            Some(known) if known.sent_at >= report.sent_at => {}
            _ => {
                self.roster.insert(report.sender, report);
            }
        }
    }

    /// Feed one tick's inbox through the roster and the consensus engine.
    pub fn handle_inbox(&mut self, inbox: &[Message], live: usize) -> Step {
        for message in inbox {
            if let Message::Status(report) = message {
                self.absorb_status(*report);
            }
        }
        self.consensus.handle(inbox, live)
    }

    /// Take on the helper task for `value`.
    ///
    /// Returns `false`, leaving the agent untouched, if it is not named in
    /// the value or is already busy.
    pub fn assign(&mut self, value: PairingValue) -> bool {
        let Some(partner) = value.partner_of(self.id()) else {
            return false;
        };
        if !self.task.is_idle() || self.carrying {
            return false;
        }
        self.task = TaskState {
            role: TaskRole::Helper,
            goal: Some(value.resource),
            partner: Some(partner),
            wait_ticks: 0,
        };
        true
    }

    /// Drop the current task and any consensus round in progress.
    pub fn abandon(&mut self) {
        self.task.clear();
        self.consensus.reset();
    }

    pub(crate) fn pick_up(&mut self, partner: AgentId) {
        self.carrying = true;
        self.partner = Some(partner);
        self.task = TaskState {
            role: TaskRole::Carrier,
            goal: Some(self.home),
            partner: Some(partner),
            wait_ticks: 0,
        };
    }

    pub(crate) fn drop_load(&mut self) {
        self.carrying = false;
        self.partner = None;
        self.task.clear();
    }

    /// Decide this tick's action against the current world.
    pub fn decide<R: Rng>(
        &mut self,
        grid: &Grid,
        rng: &mut R,
        now: u64,
        wait_limit: u32,
    ) -> Result<Decision> {
        let observation = Observation::gather(grid, &self.pose)?;
        let mut decision = Decision::wait();

        if self.carrying {
            decision.action = rendezvous::carry(&self.pose, self.home);
            return Ok(decision);
        }

        if self.task.role == TaskRole::Helper {
            let plan = rendezvous::meet(
                &self.pose,
                self.home,
                &mut self.task,
                observation.own_cell(),
                wait_limit,
            );
            match plan {
                Plan::Act(action) => {
                    decision.action = action;
                    return Ok(decision);
                }
                Plan::Abandon(reason) => {
                    let goal = self.task.goal.unwrap_or(self.pose.position);
                    warn!(
                        team = %self.team(),
                        agent = %self.id(),
                        %goal,
                        %reason,
                        tick = now,
                        "abandoning rendezvous"
                    );
                    self.abandon();
                    decision.abandoned = Some((goal, reason));
                }
            }
        }

        if self.consensus.can_propose(now) {
            if let (Some(resource), Some(partner)) =
                (self.choose_resource(&observation), self.choose_partner())
            {
                decision.outbound = self.consensus.propose(resource, partner, now)?;
                decision.proposed = Some((
                    self.consensus.proposal_number(),
                    PairingValue::new(resource, self.id(), partner),
                ));
                return Ok(decision);
            }
        }

        decision.action = explore(&self.pose, grid, rng);
        Ok(decision)
    }

    /// Helpers known to be headed for `coord`.
    fn helpers_targeting(&self, coord: GridCoord) -> usize {
        self.roster
            .values()
            .filter(|s| s.role == TaskRole::Helper && s.goal == Some(coord))
            .count()
    }

    /// Nearest visible resource that is not already fully claimed.
    fn choose_resource(&self, observation: &Observation<'_>) -> Option<GridCoord> {
        observation
            .cells()
            .filter(|(coord, cell)| {
                cell.resource() >= 1
                    && cell.deposit().is_none()
                    && self.helpers_targeting(*coord) < MAX_HELPERS_PER_RESOURCE
            })
            .map(|(coord, _)| coord)
            .min_by_key(|coord| (coord.manhattan(&self.pose.position), *coord))
    }

    /// Nearest teammate free to help, lower id on ties.
    fn choose_partner(&self) -> Option<AgentId> {
        let here = self.pose.position;
        let partner = self
            .roster
            .values()
            .filter(|s| s.sender != self.id() && s.is_available())
            .min_by_key(|s| (s.position.manhattan(&here), s.sender))
            .map(|s| s.sender);
        if partner.is_none() {
            debug!(agent = %self.id(), "no partner available");
        }
        partner
    }
}

/// Wander: usually forward, otherwise (or at the edge) turn somewhere new.
fn explore<R: Rng>(pose: &AgentPose, grid: &Grid, rng: &mut R) -> Action {
    if rng.gen_bool(FORWARD_PROBABILITY) && grid.contains(pose.position.step(pose.facing)) {
        return Action::Move;
    }
    let others: Vec<Direction> = Direction::ALL
        .into_iter()
        .filter(|d| *d != pose.facing)
        .collect();
    others.choose(rng).copied().map_or(Action::Wait, Action::Turn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn agent_at(id: u32, x: i64, y: i64, facing: Direction) -> Agent {
        let pose = AgentPose {
            team: Team::Red,
            id: AgentId(id),
            position: GridCoord::new(x, y),
            facing,
        };
        Agent::new(pose, GridCoord::new(9, 9), ConsensusConfig::default())
    }

    fn status(id: u32, x: i64, y: i64, sent_at: u64) -> StatusReport {
        StatusReport {
            sender: AgentId(id),
            position: GridCoord::new(x, y),
            carrying: false,
            role: TaskRole::None,
            goal: None,
            sent_at,
        }
    }

    fn world(agent: &Agent) -> Grid {
        let mut grid = Grid::new(10, 10).unwrap();
        grid.set_deposit(agent.home(), Team::Red).unwrap();
        grid.place(agent.pose()).unwrap();
        grid
    }

    #[test]
    fn newer_status_wins() {
        let mut agent = agent_at(0, 0, 0, Direction::Up);
        agent.absorb_status(status(1, 5, 5, 4));
        agent.absorb_status(status(1, 2, 2, 3));
        assert_eq!(agent.roster()[&AgentId(1)].position, GridCoord::new(5, 5));
        agent.absorb_status(status(1, 6, 6, 7));
        assert_eq!(agent.roster()[&AgentId(1)].position, GridCoord::new(6, 6));
        agent.absorb_status(status(0, 1, 1, 9));
        assert!(!agent.roster().contains_key(&AgentId(0)));
    }

    #[test]
    fn partner_is_nearest_then_lowest_id() {
        let mut agent = agent_at(0, 0, 0, Direction::Up);
        agent.absorb_status(status(3, 2, 0, 1));
        agent.absorb_status(status(2, 0, 2, 1));
        agent.absorb_status(status(1, 4, 4, 1));
        assert_eq!(agent.choose_partner(), Some(AgentId(2)));

        let mut busy = status(2, 0, 2, 2);
        busy.role = TaskRole::Helper;
        agent.absorb_status(busy);
        assert_eq!(agent.choose_partner(), Some(AgentId(3)));
    }

    #[test]
    fn idle_agent_proposes_for_visible_resource() {
        let mut agent = agent_at(0, 3, 1, Direction::Up);
        agent.absorb_status(status(1, 0, 0, 0));
        let mut grid = world(&agent);
        grid.add_resource(GridCoord::new(3, 3), 1).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        let decision = agent.decide(&grid, &mut rng, 1, 30).unwrap();
        assert_eq!(decision.action, Action::Wait);
        let (number, value) = decision.proposed.unwrap();
        assert_eq!(number, 1);
        assert_eq!(value, PairingValue::new(GridCoord::new(3, 3), AgentId(0), AgentId(1)));
        assert_eq!(decision.outbound.len(), 1);
    }

    #[test]
    fn fully_claimed_resource_is_skipped() {
        let mut agent = agent_at(0, 3, 1, Direction::Up);
        agent.absorb_status(status(1, 0, 0, 0));
        for id in [2, 3] {
            let mut helper = status(id, 3, 3, 0);
            helper.role = TaskRole::Helper;
            helper.goal = Some(GridCoord::new(3, 3));
            agent.absorb_status(helper);
        }
        let mut grid = world(&agent);
        grid.add_resource(GridCoord::new(3, 3), 1).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        let decision = agent.decide(&grid, &mut rng, 1, 30).unwrap();
        assert!(decision.proposed.is_none());
    }

    #[test]
    fn explorer_turns_at_the_edge() {
        let agent = agent_at(0, 0, 9, Direction::Up);
        let grid = world(&agent);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            match explore(agent.pose(), &grid, &mut rng) {
                Action::Turn(d) => assert_ne!(d, Direction::Up),
                other => panic!("expected a turn, got {:?}", other),
            }
        }
    }

    #[test]
    fn busy_agent_ignores_assignment() {
        let mut agent = agent_at(0, 0, 0, Direction::Up);
        let first = PairingValue::new(GridCoord::new(1, 1), AgentId(0), AgentId(1));
        let second = PairingValue::new(GridCoord::new(2, 2), AgentId(0), AgentId(2));
        let stranger = PairingValue::new(GridCoord::new(2, 2), AgentId(3), AgentId(2));

        assert!(!agent.assign(stranger));
        assert!(agent.assign(first));
        assert!(!agent.assign(second));
        assert_eq!(agent.task().goal, Some(GridCoord::new(1, 1)));
        assert_eq!(agent.task().partner, Some(AgentId(1)));
    }

    #[test]
    fn vanished_resource_falls_back_to_idle() {
        let mut agent = agent_at(0, 4, 4, Direction::Up);
        agent.assign(PairingValue::new(GridCoord::new(4, 4), AgentId(0), AgentId(1)));
        let grid = world(&agent);
        let mut rng = StdRng::seed_from_u64(0);

        let decision = agent.decide(&grid, &mut rng, 1, 30).unwrap();
        assert_eq!(
            decision.abandoned,
            Some((GridCoord::new(4, 4), AbandonReason::ResourceVanished))
        );
        assert!(agent.task().is_idle());
        assert_ne!(decision.action, Action::PickUp);
    }
}
