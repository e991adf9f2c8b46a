//! End-of-tick settlement: joint pickups, fumbles, deposits.
//!
//! This is the only place resource counts, deposit tallies and scores
//! change. The three passes run in a fixed order, so a pair that picks up
//! this tick is checked for a fumble in the same tick.

use std::collections::{BTreeMap, BTreeSet};

use tandem_consensus::TaskRole;
use tandem_grid::{AgentId, Grid, GridCoord, GridError, Team};
use tracing::{debug, info, warn};

use crate::events::SimEvent;
use crate::team::TeamState;
use crate::Result;

/// Settle one tick.
///
/// `pickers` holds every agent that emitted `PickUp` this tick.
pub fn settle(
    teams: &mut BTreeMap<Team, TeamState>,
    order: &[Team],
    pickers: &BTreeSet<(Team, AgentId)>,
    grid: &mut Grid,
    tick: u64,
) -> Result<Vec<SimEvent>> {
    let mut events = Vec::new();
    settle_pickups(teams, order, pickers, grid, tick, &mut events)?;
    for team in order {
        if let Some(state) = teams.get_mut(team) {
            settle_fumbles(state, grid, tick, &mut events)?;
            settle_deposits(state, grid, tick, &mut events)?;
        }
    }
    Ok(events)
}

/// Pair up mutually-expected helpers who both asked to pick up on the same
/// cell. Cells go in coordinate order, teams in `order`, pairs by lower id;
/// each pair needs its own unit.
fn settle_pickups(
    teams: &mut BTreeMap<Team, TeamState>,
    order: &[Team],
    pickers: &BTreeSet<(Team, AgentId)>,
    grid: &mut Grid,
    tick: u64,
    events: &mut Vec<SimEvent>,
) -> Result<()> {
    let mut by_cell: BTreeMap<GridCoord, Vec<(Team, AgentId, AgentId)>> = BTreeMap::new();
    for team in order {
        let Some(state) = teams.get(team) else {
            continue;
        };
        let ready = move |id: AgentId| {
            state.agent(id).filter(|a| {
                pickers.contains(&(*team, id))
                    && !a.is_carrying()
                    && a.task().role == TaskRole::Helper
            })
        };
        for agent in state.agents() {
            let Some(a) = ready(agent.id()) else {
                continue;
            };
            let Some(b) = a.task().partner.filter(|p| *p > a.id()).and_then(ready) else {
                continue;
            };
            if b.task().partner == Some(a.id()) && b.position() == a.position() {
                by_cell
                    .entry(a.position())
                    .or_default()
                    .push((*team, a.id(), b.id()));
            }
        }
    }

    for (cell, pairs) in by_cell {
        for (team, a, b) in pairs {
            if !grid.take_resource(cell)? {
                debug!(%team, %a, %b, %cell, tick, "pickup found no unit left");
                continue;
            }
            let Some(state) = teams.get_mut(&team) else {
                continue;
            };
            for (id, partner) in [(a, b), (b, a)] {
                if let Some(agent) = state.agents.get_mut(&id) {
                    agent.pick_up(partner);
                }
            }
            info!(%team, %a, %b, %cell, tick, "picked up");
            events.push(SimEvent::PickedUp {
                team,
                pair: (a, b),
                at: cell,
                tick,
            });
        }
    }
    Ok(())
}

/// Split carrying pairs that ended the tick on different cells. The unit
/// goes back where the pair stood when the tick began, or to the nearest open
/// cell when that is a deposit box.
fn settle_fumbles(
    state: &mut TeamState,
    grid: &mut Grid,
    tick: u64,
    events: &mut Vec<SimEvent>,
) -> Result<()> {
    let mut fumbles = Vec::new();
    for (a, b) in state.carrying_pairs() {
        let (Some(first), Some(second)) = (state.agent(a), state.agent(b)) else {
            continue;
        };
        if first.position() != second.position() {
            fumbles.push((a, b, first.tick_start()));
        }
    }

    let team = state.team();
    for (a, b, left_at) in fumbles {
        let restored_at = match grid.cell_at(left_at)?.deposit() {
            None => left_at,
            Some(owner) => {
                let open = grid
                    .nearest_open_cell(left_at)
                    .ok_or(GridError::DepositCell { coord: left_at, team: owner })?;
                debug!(%team, %owner, from = %left_at, to = %open, "fumble on a deposit box");
                open
            }
        };
        grid.add_resource(restored_at, 1)?;
        for id in [a, b] {
            if let Some(agent) = state.agents.get_mut(&id) {
                agent.drop_load();
            }
        }
        warn!(%team, %a, %b, %restored_at, tick, "fumbled");
        events.push(SimEvent::Fumbled {
            team,
            pair: (a, b),
            restored_at,
            tick,
        });
    }
    Ok(())
}

/// Score carrying pairs that are both standing on the deposit box.
fn settle_deposits(
    state: &mut TeamState,
    grid: &mut Grid,
    tick: u64,
    events: &mut Vec<SimEvent>,
) -> Result<()> {
    let home = state.home();
    let arrived: Vec<(AgentId, AgentId)> = state
        .carrying_pairs()
        .into_iter()
        .filter(|(a, b)| {
            [a, b]
                .iter()
                .all(|id| state.agent(**id).is_some_and(|agent| agent.position() == home))
        })
        .collect();

    let team = state.team();
    for (a, b) in arrived {
        grid.record_deposit(home)?;
        for id in [a, b] {
            if let Some(agent) = state.agents.get_mut(&id) {
                agent.drop_load();
            }
        }
        let score = state.record_score();
        info!(%team, %a, %b, score, tick, "deposited");
        events.push(SimEvent::Deposited {
            team,
            pair: (a, b),
            score,
            tick,
        });
    }
    Ok(())
}
