//! Cartesian grid coordinates.
//!
//! The world is a bounded rectangle with `x` growing to the right and `y`
//! growing upwards. Coordinates are signed so that offsets (view cones,
//! direction deltas) can be expressed with the same type and clipped against
//! the grid afterwards.

use std::ops::{Add, Neg, Sub};

use crate::Direction;

/// A cell position (or an offset between two positions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridCoord {
    /// Column, 0 at the left edge
    pub x: i64,
    /// Row, 0 at the bottom edge
    pub y: i64,
}

impl GridCoord {
    /// Bottom-left corner.
    pub const ORIGIN: Self = Self { x: 0, y: 0 };

    /// Create a new coordinate.
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Manhattan distance, the number of forward steps between two cells.
    pub fn manhattan(&self, other: &Self) -> u64 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }

    /// The neighboring cell one step in `direction` (unclipped).
    pub fn step(&self, direction: Direction) -> Self {
        *self + direction.delta()
    }
}

impl Add for GridCoord {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub for GridCoord {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Neg for GridCoord {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl std::fmt::Display for GridCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
