//! Facing directions and the forward view cone.
//!
//! An agent sees its own cell plus a cone two rows deep in front of it:
//!
//! ```text
//!   . x x x x x .     depth 2: lateral -2..=2
//!   . . x x x . .     depth 1: lateral -1..=1
//!   . . . A . . .     own cell
//! ```
//!
//! The cone is rotated with the facing direction, so the offsets are the same
//! for every agent up to rotation.

use crate::{GridCoord, VIEW_CELLS, VIEW_DEPTH};

/// One of the four axis-aligned facings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Towards larger `y`
    Up,
    /// Towards smaller `y`
    Down,
    /// Towards smaller `x`
    Left,
    /// Towards larger `x`
    Right,
}

impl Direction {
    /// All four facings, in a fixed order.
    pub const ALL: [Self; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    /// Offset of a single forward step.
    pub const fn delta(self) -> GridCoord {
        match self {
            Self::Up => GridCoord::new(0, 1),
            Self::Down => GridCoord::new(0, -1),
            Self::Left => GridCoord::new(-1, 0),
            Self::Right => GridCoord::new(1, 0),
        }
    }

    /// Offset pointing to the agent's right-hand side.
    pub const fn lateral(self) -> GridCoord {
        match self {
            Self::Up => GridCoord::new(1, 0),
            Self::Down => GridCoord::new(-1, 0),
            Self::Left => GridCoord::new(0, 1),
            Self::Right => GridCoord::new(0, -1),
        }
    }

    /// Greedy Manhattan heading from `from` to `to`.
    ///
    /// Picks the axis with the larger remaining distance; an equal split goes
    /// to the x axis. Returns `None` when the two cells coincide.
    pub fn toward(from: GridCoord, to: GridCoord) -> Option<Self> {
        let d = to - from;
        if d.x == 0 && d.y == 0 {
            return None;
        }
        if d.x.abs() >= d.y.abs() {
            Some(if d.x > 0 { Self::Right } else { Self::Left })
        } else {
            Some(if d.y > 0 { Self::Up } else { Self::Down })
        }
    }

    /// View cone offsets relative to an agent facing this way.
    ///
    /// The first entry is always the agent's own cell.
    pub fn view_offsets(self) -> [GridCoord; VIEW_CELLS] {
        let forward = self.delta();
        let side = self.lateral();
        let mut offsets = [GridCoord::ORIGIN; VIEW_CELLS];
        let mut i = 1;
        for depth in 1..=VIEW_DEPTH {
            for lateral in -depth..=depth {
                offsets[i] = GridCoord::new(
                    forward.x * depth + side.x * lateral,
                    forward.y * depth + side.y * lateral,
                );
                i += 1;
            }
        }
        offsets
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}
