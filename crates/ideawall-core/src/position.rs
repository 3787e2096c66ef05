//! Normalized 2-D board positions
//!
//! Positions on the priority surface are normalized to `[0, 1]` on both
//! axes. The constructor is the only way to build one, so a stored position
//! is always finite and in bounds: out-of-range values clamp to the nearest
//! edge and non-finite input (NaN) collapses to the origin on that axis.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the board surface, normalized to the unit square.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPosition")]
pub struct Position {
    x: f64,
    y: f64,
}

/// Unvalidated wire shape; converted through the clamping constructor.
#[derive(Deserialize)]
struct RawPosition {
    x: f64,
    y: f64,
}

impl From<RawPosition> for Position {
    fn from(raw: RawPosition) -> Self {
        Position::new(raw.x, raw.y)
    }
}

fn clamp_axis(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

impl Position {
    /// The center of the board.
    pub const CENTER: Position = Position { x: 0.5, y: 0.5 };

    /// Build a position, clamping both axes into `[0, 1]`.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: clamp_axis(x),
            y: clamp_axis(y),
        }
    }

    /// Horizontal coordinate in `[0, 1]`.
    pub fn x(&self) -> f64 {
        self.x
    }

    /// Vertical coordinate in `[0, 1]`.
    pub fn y(&self) -> f64 {
        self.y
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::CENTER
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}
