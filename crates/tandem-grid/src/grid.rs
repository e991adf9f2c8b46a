//! The bounded grid: cells, occupancy and action application.
//!
//! The grid is the only shared mutable state of the world. Agents never touch
//! it directly: they read it through [`Grid::observe`] and [`Grid::cell_at`],
//! and change it only through [`Grid::apply_action`]. Resource counts and
//! deposit tallies are changed by the end-of-tick ledger pass.

use rand::Rng;
use thiserror::Error;

use crate::{AgentId, Direction, GridCoord, Team, MAX_CELLS};

/// Grid errors. All of them indicate a broken world invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    /// A coordinate outside the grid was queried or written.
    #[error("coordinate {coord} is outside the {width}x{height} grid")]
    OutOfBounds {
        coord: GridCoord,
        width: i64,
        height: i64,
    },

    /// Grid dimensions must be positive and the area at most [`MAX_CELLS`].
    #[error("invalid grid dimensions {width}x{height}")]
    InvalidDimensions { width: i64, height: i64 },

    /// Deposit boxes never hold resources.
    #[error("{coord} holds the {team} deposit box")]
    DepositCell { coord: GridCoord, team: Team },

    /// The agent is not registered on the cell it claims to occupy.
    #[error("{team} agent {id} is not placed at {coord}")]
    NotPlaced {
        team: Team,
        id: AgentId,
        coord: GridCoord,
    },
}

/// An action an agent asks the world to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Action {
    /// Step forward one cell, clamped at the boundary
    Move,
    /// Face a new direction without moving
    Turn(Direction),
    /// Pick up (or, at the deposit, drop off) a resource together with a partner
    PickUp,
    /// Do nothing this tick
    Wait,
}

/// Where an agent is and which way it faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentPose {
    pub team: Team,
    pub id: AgentId,
    pub position: GridCoord,
    pub facing: Direction,
}

/// Public view of an agent standing on a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Occupant {
    pub team: Team,
    pub id: AgentId,
    pub facing: Direction,
}

/// Contents of a single cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    resource: u32,
    deposit: Option<Team>,
    deposited: u32,
    occupants: Vec<Occupant>,
}

impl Cell {
    /// Resource units lying on this cell.
    pub fn resource(&self) -> u32 {
        self.resource
    }

    /// Owning team if this cell is a deposit box.
    pub fn deposit(&self) -> Option<Team> {
        self.deposit
    }

    /// Units dropped off at this deposit box so far.
    pub fn deposited(&self) -> u32 {
        self.deposited
    }

    /// Agents standing on this cell, in arrival order.
    pub fn occupants(&self) -> &[Occupant] {
        &self.occupants
    }

    /// Find a specific agent on this cell.
    pub fn occupant(&self, team: Team, id: AgentId) -> Option<&Occupant> {
        self.occupants.iter().find(|o| o.team == team && o.id == id)
    }
}

/// A `width` × `height` rectangle of cells.
#[derive(Debug, Clone)]
pub struct Grid {
    width: i64,
    height: i64,
    cells: Vec<Cell>,
}

impl Grid {
    /// Create an empty grid.
    pub fn new(width: i64, height: i64) -> Result<Self, GridError> {
        let area = Self::area(width, height)?;
        Ok(Self {
            width,
            height,
            cells: vec![Cell::default(); area],
        })
    }

    /// Number of cells a `width` × `height` grid holds, if it can be built.
    pub fn area(width: i64, height: i64) -> Result<usize, GridError> {
        if width <= 0 || height <= 0 {
            return Err(GridError::InvalidDimensions { width, height });
        }
        width
            .checked_mul(height)
            .and_then(|cells| usize::try_from(cells).ok())
            .filter(|cells| *cells <= MAX_CELLS)
            .ok_or(GridError::InvalidDimensions { width, height })
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    /// Whether `coord` lies on the grid.
    pub fn contains(&self, coord: GridCoord) -> bool {
        (0..self.width).contains(&coord.x) && (0..self.height).contains(&coord.y)
    }

    fn index(&self, coord: GridCoord) -> Result<usize, GridError> {
        if !self.contains(coord) {
            return Err(GridError::OutOfBounds {
                coord,
                width: self.width,
                height: self.height,
            });
        }
        Ok((coord.y * self.width + coord.x) as usize)
    }

    /// Read a cell.
    pub fn cell_at(&self, coord: GridCoord) -> Result<&Cell, GridError> {
        let i = self.index(coord)?;
        Ok(&self.cells[i])
    }

    fn cell_mut(&mut self, coord: GridCoord) -> Result<&mut Cell, GridError> {
        let i = self.index(coord)?;
        Ok(&mut self.cells[i])
    }

    /// Coordinates visible from `position` when facing `facing`.
    ///
    /// The agent's own cell comes first; cone cells off the grid are dropped.
    pub fn observe(&self, position: GridCoord, facing: Direction) -> Vec<GridCoord> {
        facing
            .view_offsets()
            .into_iter()
            .map(|offset| position + offset)
            .filter(|&c| self.contains(c))
            .collect()
    }

    /// Every cell coordinate, in row order.
    pub fn coords(&self) -> impl Iterator<Item = GridCoord> + '_ {
        (0..self.height).flat_map(move |y| (0..self.width).map(move |x| GridCoord::new(x, y)))
    }

    /// Register an agent on the cell it stands on.
    pub fn place(&mut self, pose: &AgentPose) -> Result<(), GridError> {
        let cell = self.cell_mut(pose.position)?;
        cell.occupants.push(Occupant {
            team: pose.team,
            id: pose.id,
            facing: pose.facing,
        });
        Ok(())
    }

    /// Perform an action and update `pose` accordingly.
    ///
    /// Moving into the boundary leaves the agent where it is. `PickUp` and
    /// `Wait` do not touch the grid; pickups are settled by the ledger.
    pub fn apply_action(&mut self, pose: &mut AgentPose, action: Action) -> Result<(), GridError> {
        match action {
            Action::Move => {
                let target = pose.position.step(pose.facing);
                if !self.contains(target) {
                    return Ok(());
                }
                let occupant = self.take_occupant(pose)?;
                self.cell_mut(target)?.occupants.push(occupant);
                pose.position = target;
            }
            Action::Turn(direction) => {
                let (team, id, coord) = (pose.team, pose.id, pose.position);
                let cell = self.cell_mut(coord)?;
                let occupant = cell
                    .occupants
                    .iter_mut()
                    .find(|o| o.team == team && o.id == id)
                    .ok_or(GridError::NotPlaced { team, id, coord })?;
                occupant.facing = direction;
                pose.facing = direction;
            }
            Action::PickUp | Action::Wait => {}
        }
        Ok(())
    }

    fn take_occupant(&mut self, pose: &AgentPose) -> Result<Occupant, GridError> {
        let (team, id, coord) = (pose.team, pose.id, pose.position);
        let cell = self.cell_mut(coord)?;
        let i = cell
            .occupants
            .iter()
            .position(|o| o.team == team && o.id == id)
            .ok_or(GridError::NotPlaced { team, id, coord })?;
        Ok(cell.occupants.remove(i))
    }

    /// Mark a cell as a team's deposit box.
    pub fn set_deposit(&mut self, coord: GridCoord, team: Team) -> Result<(), GridError> {
        let cell = self.cell_mut(coord)?;
        cell.deposit = Some(team);
        cell.resource = 0;
        Ok(())
    }

    /// Add resource units to a cell that is not a deposit box.
    pub fn add_resource(&mut self, coord: GridCoord, amount: u32) -> Result<(), GridError> {
        let cell = self.cell_mut(coord)?;
        if let Some(team) = cell.deposit {
            return Err(GridError::DepositCell { coord, team });
        }
        cell.resource = cell.resource.saturating_add(amount);
        Ok(())
    }

    /// Closest cell to `coord` that can hold resources. Ties go to the lower
    /// coordinate.
    pub fn nearest_open_cell(&self, coord: GridCoord) -> Option<GridCoord> {
        self.coords()
            .zip(&self.cells)
            .filter(|(_, cell)| cell.deposit.is_none())
            .map(|(c, _)| c)
            .min_by_key(|c| (c.manhattan(&coord), *c))
    }

    /// Remove one resource unit. Returns `false` if the cell was empty.
    pub fn take_resource(&mut self, coord: GridCoord) -> Result<bool, GridError> {
        let cell = self.cell_mut(coord)?;
        if cell.resource == 0 {
            return Ok(false);
        }
        cell.resource -= 1;
        Ok(true)
    }

    /// Count one delivered unit at a deposit box.
    pub fn record_deposit(&mut self, coord: GridCoord) -> Result<(), GridError> {
        let cell = self.cell_mut(coord)?;
        cell.deposited += 1;
        Ok(())
    }

    /// Total resource units still lying on the grid.
    pub fn resources_remaining(&self) -> u64 {
        self.cells.iter().map(|c| u64::from(c.resource)).sum()
    }

    /// Uniformly random coordinate on the grid.
    pub fn random_coord<R: Rng>(&self, rng: &mut R) -> GridCoord {
        GridCoord::new(rng.gen_range(0..self.width), rng.gen_range(0..self.height))
    }

    /// Scatter resource piles over every non-deposit cell.
    ///
    /// Each cell receives a pile with `probability`; the pile size is uniform
    /// in `1..=max_amount`.
    pub fn scatter_resources<R: Rng>(&mut self, probability: f64, max_amount: u32, rng: &mut R) {
        if max_amount == 0 {
            return;
        }
        for cell in self.cells.iter_mut().filter(|c| c.deposit.is_none()) {
            if rng.gen_bool(probability.clamp(0.0, 1.0)) {
                cell.resource = rng.gen_range(1..=max_amount);
            }
        }
    }
}
