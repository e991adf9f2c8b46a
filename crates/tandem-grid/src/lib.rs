//! Tandem Grid World
//!
//! The bounded rectangular world the Tandem agents live in.
//!
//! # Model
//!
//! - Cells hold resource piles, at most one team deposit box, and the agents
//!   currently standing on them.
//! - Agents face one of four directions and see their own cell plus a cone
//!   two rows deep in front of them.
//! - Moving into the boundary is a no-op rather than an error; querying a
//!   coordinate off the grid is an error, since it means a caller lost track
//!   of the world.
//!
//! The grid knows nothing about consensus or pairing. It is the collaborator
//! the protocol crates observe and act upon.

mod coord;
mod direction;
mod grid;
mod ident;

pub use coord::GridCoord;
pub use direction::Direction;
pub use grid::{Action, AgentPose, Cell, Grid, GridError, Occupant};
pub use ident::{AgentId, Team};

/// Rows of the view cone in front of an agent.
pub const VIEW_DEPTH: i64 = 2;

/// Largest grid, in cells, a world may allocate.
pub const MAX_CELLS: usize = 1 << 24;

/// Cells in a full view cone, own cell included.
pub const VIEW_CELLS: usize = 9;

// Own cell + (2d + 1) cells per row d of the cone
const _: () = assert!(1 + 3 + 5 == VIEW_CELLS && VIEW_DEPTH == 2);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_cone_size() {
        for dir in Direction::ALL {
            assert_eq!(dir.view_offsets().len(), VIEW_CELLS);
        }
    }
}
