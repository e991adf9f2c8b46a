//! Getting two helpers onto the same cell, facing home, at the same time.
//!
//! A helper walks to its goal greedily along the dominant axis. Once there
//! it checks its own cell: the resource must still be present and the
//! partner must be standing on it. Both then turn toward the deposit box
//! and emit `PickUp` in the same tick. Anything that keeps this from
//! happening counts against the wait limit.

use tandem_grid::{Action, AgentPose, Cell, Direction, Grid, GridCoord, GridError};

use crate::agent::TaskState;
use crate::events::AbandonReason;

/// The cells an agent can currently see.
#[derive(Debug, Clone)]
pub struct Observation<'a> {
    own: &'a Cell,
    visible: Vec<(GridCoord, &'a Cell)>,
}

impl<'a> Observation<'a> {
    pub fn gather(grid: &'a Grid, pose: &AgentPose) -> Result<Self, GridError> {
        let own = grid.cell_at(pose.position)?;
        let visible = grid
            .observe(pose.position, pose.facing)
            .into_iter()
            .map(|coord| grid.cell_at(coord).map(|cell| (coord, cell)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { own, visible })
    }

    /// The cell the agent stands on.
    pub fn own_cell(&self) -> &'a Cell {
        self.own
    }

    /// Visible cells, own cell first.
    pub fn cells(&self) -> impl Iterator<Item = (GridCoord, &'a Cell)> + '_ {
        self.visible.iter().copied()
    }
}

/// Outcome of a helper's planning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Act(Action),
    Abandon(AbandonReason),
}

/// One greedy step toward `goal`: face the dominant axis, then move.
pub fn step_toward(pose: &AgentPose, goal: GridCoord) -> Action {
    match Direction::toward(pose.position, goal) {
        None => Action::Wait,
        Some(direction) if direction != pose.facing => Action::Turn(direction),
        Some(_) => Action::Move,
    }
}

/// A carrier heads home; at home it keeps asking to deposit.
pub fn carry(pose: &AgentPose, home: GridCoord) -> Action {
    if pose.position == home {
        Action::PickUp
    } else {
        step_toward(pose, home)
    }
}

/// Plan a helper's tick.
pub fn meet(
    pose: &AgentPose,
    home: GridCoord,
    task: &mut TaskState,
    here: &Cell,
    wait_limit: u32,
) -> Plan {
    let Some(goal) = task.goal else {
        return Plan::Abandon(AbandonReason::ResourceVanished);
    };
    if pose.position != goal {
        return Plan::Act(step_toward(pose, goal));
    }
    if here.resource() == 0 {
        return Plan::Abandon(AbandonReason::ResourceVanished);
    }

    let partner = task.partner.and_then(|id| here.occupant(pose.team, id));
    let home_direction = Direction::toward(pose.position, home);
    let faces_home = |facing: Direction| home_direction.map_or(true, |d| d == facing);

    match partner {
        Some(p) if faces_home(pose.facing) && faces_home(p.facing) => Plan::Act(Action::PickUp),
        present => {
            task.wait_ticks = task.wait_ticks.saturating_add(1);
            if task.wait_ticks > wait_limit {
                return Plan::Abandon(AbandonReason::PartnerUnavailable);
            }
            match (present, home_direction) {
                (Some(_), Some(d)) if pose.facing != d => Plan::Act(Action::Turn(d)),
                _ => Plan::Act(Action::Wait),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_consensus::TaskRole;
    use tandem_grid::{AgentId, Team};

    const GOAL: GridCoord = GridCoord { x: 3, y: 3 };
    const HOME: GridCoord = GridCoord { x: 3, y: 6 };

    fn pose(id: u32, position: GridCoord, facing: Direction) -> AgentPose {
        AgentPose {
            team: Team::Red,
            id: AgentId(id),
            position,
            facing,
        }
    }

    fn helper(partner: u32) -> TaskState {
        TaskState {
            role: TaskRole::Helper,
            goal: Some(GOAL),
            partner: Some(AgentId(partner)),
            wait_ticks: 0,
        }
    }

    fn grid_with(poses: &[AgentPose], resource: u32) -> Grid {
        let mut grid = Grid::new(10, 10).unwrap();
        grid.add_resource(GOAL, resource).unwrap();
        for p in poses {
            grid.place(p).unwrap();
        }
        grid
    }

    #[test]
    fn greedy_steps_prefer_x_on_ties() {
        let p = pose(0, GridCoord::new(0, 0), Direction::Up);
        assert_eq!(step_toward(&p, GridCoord::new(2, 2)), Action::Turn(Direction::Right));
        let p = pose(0, GridCoord::new(0, 0), Direction::Right);
        assert_eq!(step_toward(&p, GridCoord::new(2, 2)), Action::Move);
        assert_eq!(step_toward(&p, GridCoord::new(0, 0)), Action::Wait);
        let p = pose(0, GridCoord::new(0, 0), Direction::Right);
        assert_eq!(step_toward(&p, GridCoord::new(1, 4)), Action::Turn(Direction::Up));
    }

    #[test]
    fn absent_partner_is_abandoned_after_the_limit() {
        let me = pose(0, GOAL, Direction::Up);
        let grid = grid_with(&[me], 1);
        let here = grid.cell_at(GOAL).unwrap();
        let mut task = helper(1);

        for _ in 0..30 {
            assert_eq!(meet(&me, HOME, &mut task, here, 30), Plan::Act(Action::Wait));
        }
        assert_eq!(task.wait_ticks, 30);
        assert_eq!(
            meet(&me, HOME, &mut task, here, 30),
            Plan::Abandon(AbandonReason::PartnerUnavailable)
        );
    }

    #[test]
    fn aligned_pair_picks_up() {
        let me = pose(0, GOAL, Direction::Up);
        let partner = pose(1, GOAL, Direction::Up);
        let grid = grid_with(&[me, partner], 1);
        let mut task = helper(1);
        assert_eq!(
            meet(&me, HOME, &mut task, grid.cell_at(GOAL).unwrap(), 30),
            Plan::Act(Action::PickUp)
        );
        assert_eq!(task.wait_ticks, 0);
    }

    #[test]
    fn misaligned_pair_turns_then_waits() {
        let me = pose(0, GOAL, Direction::Left);
        let partner = pose(1, GOAL, Direction::Down);
        let grid = grid_with(&[me, partner], 1);
        let here = grid.cell_at(GOAL).unwrap();
        let mut task = helper(1);
        assert_eq!(
            meet(&me, HOME, &mut task, here, 30),
            Plan::Act(Action::Turn(Direction::Up))
        );

        let me = pose(0, GOAL, Direction::Up);
        assert_eq!(meet(&me, HOME, &mut task, here, 30), Plan::Act(Action::Wait));
        assert_eq!(task.wait_ticks, 2);
    }

    #[test]
    fn empty_goal_is_abandoned() {
        let me = pose(0, GOAL, Direction::Up);
        let grid = grid_with(&[me], 0);
        let mut task = helper(1);
        assert_eq!(
            meet(&me, HOME, &mut task, grid.cell_at(GOAL).unwrap(), 30),
            Plan::Abandon(AbandonReason::ResourceVanished)
        );
    }

    #[test]
    fn carrier_deposits_at_home() {
        let p = pose(0, HOME, Direction::Up);
        assert_eq!(carry(&p, HOME), Action::PickUp);
        let p = pose(0, GOAL, Direction::Up);
        assert_eq!(carry(&p, HOME), Action::Move);
    }

    #[test]
    fn observation_starts_with_own_cell() {
        let me = pose(0, GOAL, Direction::Up);
        let grid = grid_with(&[me], 2);
        let observation = Observation::gather(&grid, &me).unwrap();
        let first = observation.cells().next().unwrap();
        assert_eq!(first.0, GOAL);
        assert_eq!(observation.own_cell().resource(), 2);
        assert_eq!(observation.cells().count(), tandem_grid::VIEW_CELLS);
    }
}
