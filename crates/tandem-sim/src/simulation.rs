//! The tick loop, with event recording.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use tandem_consensus::{Message, Outbound};
use tandem_grid::{Action, AgentId, AgentPose, Direction, Grid, GridCoord, Team};
use tandem_transport::{Transport, TransportConfig};
use tracing::{debug, info, trace};

use crate::agent::Agent;
use crate::config::SimulationConfig;
use crate::events::{SimEvent, SimSnapshot};
use crate::ledger;
use crate::team::TeamState;
use crate::{Error, Result};

/// Random streams derived from the configured seed.
const WORLD_STREAM: u64 = 0;
const EXPLORE_STREAM: u64 = 1;
const TRANSPORT_STREAM: u64 = 2;

/// An agent to place in an explicit world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpawn {
    pub team: Team,
    pub id: AgentId,
    pub position: GridCoord,
    pub facing: Direction,
}

/// Explicit world contents, used instead of random generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldLayout {
    pub deposits: Vec<(Team, GridCoord)>,
    pub resources: Vec<(GridCoord, u32)>,
    pub agents: Vec<AgentSpawn>,
}

/// What happened in one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Messages placed into inboxes at the start of the tick
    pub delivered: usize,
    pub events: Vec<SimEvent>,
}

/// Runs both teams tick by tick and records events.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    grid: Grid,
    teams: BTreeMap<Team, TeamState>,
    rng: StdRng,
    tick: u64,
    events: Vec<SimEvent>,
}

impl Simulation {
    /// Create a simulation over a randomly generated world.
    ///
    /// Deposits land on distinct random cells, resource piles are scattered
    /// over the rest, and agents spawn at random cells facing random ways.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(WORLD_STREAM));
        let mut grid = Grid::new(config.width, config.height)?;

        let mut deposits = BTreeMap::new();
        for team in Team::ALL {
            let coord = loop {
                let candidate = grid.random_coord(&mut rng);
                if !deposits.values().any(|c| *c == candidate) {
                    break candidate;
                }
            };
            grid.set_deposit(coord, team)?;
            deposits.insert(team, coord);
        }
        grid.scatter_resources(config.resource_probability, config.max_resource, &mut rng);

        let mut spawns = Vec::new();
        for team in Team::ALL {
            for id in 0..config.agents_per_team {
                spawns.push(AgentSpawn {
                    team,
                    id: AgentId(id),
                    position: grid.random_coord(&mut rng),
                    facing: *Direction::ALL.choose(&mut rng).unwrap_or(&Direction::Up),
                });
            }
        }

        Self::assemble(config, grid, deposits, spawns)
    }

    /// Create a simulation over an explicit world.
    pub fn from_layout(config: SimulationConfig, layout: WorldLayout) -> Result<Self> {
        config.validate()?;
        let mut grid = Grid::new(config.width, config.height)?;

        let mut deposits = BTreeMap::new();
        for (team, coord) in layout.deposits {
            if deposits.insert(team, coord).is_some() {
                return Err(Error::InvalidConfig(format!("{} has two deposits", team)));
            }
            grid.set_deposit(coord, team)?;
        }
        for (coord, amount) in layout.resources {
            grid.add_resource(coord, amount)?;
        }

        Self::assemble(config, grid, deposits, layout.agents)
    }

    fn assemble(
        config: SimulationConfig,
        mut grid: Grid,
        deposits: BTreeMap<Team, GridCoord>,
        spawns: Vec<AgentSpawn>,
    ) -> Result<Self> {
        let delay = config.delay()?;
        let consensus = config.consensus();

        let mut teams = BTreeMap::new();
        for (index, team) in Team::ALL.into_iter().enumerate() {
            let home = *deposits
                .get(&team)
                .ok_or_else(|| Error::InvalidConfig(format!("{} has no deposit", team)))?;

            let mut agents = BTreeMap::new();
            for spawn in spawns.iter().filter(|s| s.team == team) {
                let pose = AgentPose {
                    team,
                    id: spawn.id,
                    position: spawn.position,
                    facing: spawn.facing,
                };
                grid.place(&pose)?;
                if agents
                    .insert(spawn.id, Agent::new(pose, home, consensus))
                    .is_some()
                {
                    return Err(Error::InvalidConfig(format!(
                        "{} agent {} spawned twice",
                        team, spawn.id
                    )));
                }
            }

            let transport = Transport::new(
                agents.keys().copied(),
                TransportConfig::default()
                    .with_delay(delay)
                    .with_seed(config.seed.wrapping_add(TRANSPORT_STREAM + index as u64)),
            );
            debug!(%team, %home, agents = agents.len(), "team ready");
            teams.insert(team, TeamState::new(team, home, agents, transport));
        }

        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(EXPLORE_STREAM)),
            config,
            grid,
            teams,
            tick: 0,
            events: Vec::new(),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Next tick to run.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Every event recorded so far, in order.
    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn team(&self, team: Team) -> Option<&TeamState> {
        self.teams.get(&team)
    }

    pub fn agent(&self, team: Team, id: AgentId) -> Option<&Agent> {
        self.teams.get(&team).and_then(|t| t.agent(id))
    }

    pub fn score(&self, team: Team) -> u64 {
        self.teams.get(&team).map_or(0, TeamState::score)
    }

    /// Whether carrying partners reference each other on every team.
    pub fn pairs_consistent(&self) -> bool {
        self.teams.values().all(TeamState::pairs_consistent)
    }

    /// Get a snapshot at the current tick.
    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot {
            tick: self.tick,
            teams: self.teams.values().map(TeamState::snapshot).collect(),
            resources_remaining: self.grid.resources_remaining(),
            event_count: self.events.len(),
        }
    }

    /// Run one tick.
    pub fn step(&mut self) -> Result<TickReport> {
        let now = self.tick;
        let first_event = self.events.len();
        let order = self.config.team_order.clone();

        let mut delivered = 0;
        for state in self.teams.values_mut() {
            delivered += state.transport.deliver(now);
            for agent in state.agents.values_mut() {
                agent.begin_tick();
            }
        }

        for team in &order {
            self.process_inboxes(*team, now)?;
        }

        let mut pickers = BTreeSet::new();
        for team in &order {
            self.decide_and_act(*team, now, &mut pickers)?;
        }

        let settled = ledger::settle(&mut self.teams, &order, &pickers, &mut self.grid, now)?;
        self.events.extend(settled);

        for team in &order {
            if let Some(state) = self.teams.get_mut(team) {
                for (id, agent) in &state.agents {
                    state
                        .transport
                        .broadcast(*id, Message::Status(agent.status(now)))?;
                }
                state.transport.flush(now);
            }
        }

        self.tick += 1;
        Ok(TickReport {
            tick: now,
            delivered,
            events: self.events[first_event..].to_vec(),
        })
    }

    /// Run the configured number of ticks.
    pub fn run(&mut self) -> Result<SimSnapshot> {
        info!(
            ticks = self.config.ticks,
            seed = self.config.seed,
            width = self.config.width,
            height = self.config.height,
            "starting run"
        );
        for _ in 0..self.config.ticks {
            self.step()?;
        }
        let snapshot = self.snapshot();
        for team in &snapshot.teams {
            info!(team = %team.team, score = team.score, "final score");
        }
        info!(
            resources_remaining = snapshot.resources_remaining,
            events = snapshot.event_count,
            "run complete"
        );
        Ok(snapshot)
    }

    /// Write the event timeline as pretty JSON.
    pub fn write_events(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.events)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn process_inboxes(&mut self, team: Team, now: u64) -> Result<()> {
        let Some(state) = self.teams.get_mut(&team) else {
            return Ok(());
        };
        let live = state.transport.live_count();
        let ids: Vec<AgentId> = state.agents.keys().copied().collect();

        for id in ids {
            let inbox = state.transport.take_inbox(id)?;
            let Some(agent) = state.agents.get_mut(&id) else {
                continue;
            };
            let role = agent.consensus().role();
            let step = agent.handle_inbox(&inbox, live);

            if step.timed_out {
                self.events.push(SimEvent::ConsensusTimedOut {
                    team,
                    agent: id,
                    role,
                    tick: now,
                });
            }
            if let Some(value) = step.decided {
                self.events.push(SimEvent::ValueAccepted {
                    team,
                    proposer: id,
                    number: agent.consensus().proposal_number(),
                    resource: value.resource,
                    pair: value.pair(),
                    tick: now,
                });
            }
            if let Some(value) = step.assigned {
                if agent.assign(value) {
                    let partner = value.partner_of(id).unwrap_or(id);
                    debug!(%team, agent = %id, %partner, goal = %value.resource, tick = now, "helper assigned");
                    self.events.push(SimEvent::HelperAssigned {
                        team,
                        agent: id,
                        partner,
                        goal: value.resource,
                        tick: now,
                    });
                } else {
                    debug!(%team, agent = %id, %value, "busy, ignoring assignment");
                }
            }

            for out in step.outbound {
                route(&mut state.transport, id, out)?;
            }
        }
        Ok(())
    }

    fn decide_and_act(
        &mut self,
        team: Team,
        now: u64,
        pickers: &mut BTreeSet<(Team, AgentId)>,
    ) -> Result<()> {
        let Some(state) = self.teams.get_mut(&team) else {
            return Ok(());
        };

        // Every decision sees the world as it was before this team moved
        let mut decisions = Vec::with_capacity(state.agents.len());
        for (id, agent) in state.agents.iter_mut() {
            let decision = agent.decide(
                &self.grid,
                &mut self.rng,
                now,
                self.config.rendezvous_wait_limit,
            )?;
            decisions.push((*id, decision));
        }

        for (id, decision) in decisions {
            if let Some((number, value)) = decision.proposed {
                self.events.push(SimEvent::ProposalStarted {
                    team,
                    agent: id,
                    number,
                    resource: value.resource,
                    partner: value.partner_of(id).unwrap_or(id),
                    tick: now,
                });
            }
            if let Some((goal, reason)) = decision.abandoned {
                self.events.push(SimEvent::RendezvousAbandoned {
                    team,
                    agent: id,
                    goal,
                    reason,
                    tick: now,
                });
            }
            for out in decision.outbound {
                route(&mut state.transport, id, out)?;
            }

            let Some(agent) = state.agents.get_mut(&id) else {
                continue;
            };
            self.grid.apply_action(agent.pose_mut(), decision.action)?;
            if decision.action == Action::PickUp {
                pickers.insert((team, id));
            }
        }
        Ok(())
    }
}

fn route(transport: &mut Transport<Message>, from: AgentId, out: Outbound) -> Result<()> {
    match out {
        Outbound::To(to, message) => {
            if !transport.send(to, message)? {
                trace!(%from, %to, kind = message.kind(), "send collapsed");
            }
        }
        Outbound::Broadcast(message) => {
            let queued = transport.broadcast(from, message)?;
            trace!(%from, kind = message.kind(), queued, "broadcast");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_world_is_reproducible() {
        let config = SimulationConfig::default().with_ticks(50).with_seed(11);
        let mut a = Simulation::new(config.clone()).unwrap();
        let mut b = Simulation::new(config).unwrap();
        a.run().unwrap();
        b.run().unwrap();
        assert_eq!(a.events(), b.events());
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn random_world_has_every_agent_and_deposit() {
        let sim = Simulation::new(SimulationConfig::default().with_agents_per_team(4)).unwrap();
        for team in Team::ALL {
            let state = sim.team(team).unwrap();
            assert_eq!(state.agents().count(), 4);
            assert_eq!(sim.grid().cell_at(state.home()).unwrap().deposit(), Some(team));
        }
        let red = sim.team(Team::Red).unwrap().home();
        let blue = sim.team(Team::Blue).unwrap().home();
        assert_ne!(red, blue);
    }

    #[test]
    fn layout_requires_a_deposit_per_team() {
        let layout = WorldLayout {
            deposits: vec![(Team::Red, GridCoord::new(0, 0))],
            ..WorldLayout::default()
        };
        let result = Simulation::from_layout(SimulationConfig::default(), layout);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn layout_rejects_duplicate_agents() {
        let spawn = AgentSpawn {
            team: Team::Red,
            id: AgentId(0),
            position: GridCoord::new(1, 1),
            facing: Direction::Up,
        };
        let layout = WorldLayout {
            deposits: vec![(Team::Red, GridCoord::new(0, 0)), (Team::Blue, GridCoord::new(5, 5))],
            resources: vec![],
            agents: vec![spawn, spawn],
        };
        assert!(Simulation::from_layout(SimulationConfig::default(), layout).is_err());
    }

    #[test]
    fn statuses_reach_teammates() {
        let config = SimulationConfig::default()
            .with_size(6, 6)
            .with_delay(1, 1)
            .with_resources(0.0, 0);
        let layout = WorldLayout {
            deposits: vec![(Team::Red, GridCoord::new(0, 0)), (Team::Blue, GridCoord::new(5, 5))],
            resources: vec![],
            agents: (0..3)
                .map(|id| AgentSpawn {
                    team: Team::Red,
                    id: AgentId(id),
                    position: GridCoord::new(id as i64 + 1, 2),
                    facing: Direction::Up,
                })
                .collect(),
        };
        let mut sim = Simulation::from_layout(config, layout).unwrap();
        sim.step().unwrap();
        let report = sim.step().unwrap();
        assert_eq!(report.delivered, 6);
        let roster = sim.agent(Team::Red, AgentId(0)).unwrap().roster();
        assert_eq!(roster.len(), 2);
        assert!(roster.values().all(|s| s.sent_at == 0));
    }

    #[test]
    fn tick_counter_advances() {
        let mut sim = Simulation::new(SimulationConfig::default().with_agents_per_team(2)).unwrap();
        assert_eq!(sim.step().unwrap().tick, 0);
        assert_eq!(sim.step().unwrap().tick, 1);
        assert_eq!(sim.tick(), 2);
    }
}
