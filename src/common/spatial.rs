use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Cell { x, y }
    }

    pub fn manhattan(&self, other: &Cell) -> usize {
        (self.x - other.x).unsigned_abs() as usize + (self.y - other.y).unsigned_abs() as usize
    }

    pub(crate) fn offset(&self, (dx, dy): (i32, i32)) -> Cell {
        Cell::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Cardinal facing. 0° faces +y, 90° faces +x, 180° faces -y, 270° faces -x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Orientation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Orientation {
    pub const ALL: [Orientation; 4] = [
        Orientation::Deg0,
        Orientation::Deg90,
        Orientation::Deg180,
        Orientation::Deg270,
    ];

    pub fn degrees(&self) -> u16 {
        match self {
            Orientation::Deg0 => 0,
            Orientation::Deg90 => 90,
            Orientation::Deg180 => 180,
            Orientation::Deg270 => 270,
        }
    }

    /// +90°.
    pub fn rotate_cw(&self) -> Orientation {
        match self {
            Orientation::Deg0 => Orientation::Deg90,
            Orientation::Deg90 => Orientation::Deg180,
            Orientation::Deg180 => Orientation::Deg270,
            Orientation::Deg270 => Orientation::Deg0,
        }
    }

    /// -90°.
    pub fn rotate_ccw(&self) -> Orientation {
        match self {
            Orientation::Deg0 => Orientation::Deg270,
            Orientation::Deg90 => Orientation::Deg0,
            Orientation::Deg180 => Orientation::Deg90,
            Orientation::Deg270 => Orientation::Deg180,
        }
    }

    pub fn forward_delta(&self) -> (i32, i32) {
        match self {
            Orientation::Deg0 => (0, 1),
            Orientation::Deg90 => (1, 0),
            Orientation::Deg180 => (0, -1),
            Orientation::Deg270 => (-1, 0),
        }
    }
}

impl TryFrom<u16> for Orientation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Orientation::Deg0),
            90 => Ok(Orientation::Deg90),
            180 => Ok(Orientation::Deg180),
            270 => Ok(Orientation::Deg270),
            other => Err(format!("orientation must be 0, 90, 180 or 270, got {other}")),
        }
    }
}

impl From<Orientation> for u16 {
    fn from(orientation: Orientation) -> u16 {
        orientation.degrees()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pose {
    pub cell: Cell,
    pub orientation: Orientation,
}

impl Pose {
    pub const fn new(cell: Cell, orientation: Orientation) -> Self {
        Pose { cell, orientation }
    }
}

/// One unit-cost step of the time-expanded graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stay,
    RotateCw,
    RotateCcw,
    Forward,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Stay,
        Action::RotateCw,
        Action::RotateCcw,
        Action::Forward,
    ];

    pub fn apply(&self, pose: Pose) -> Pose {
        match self {
            Action::Stay => pose,
            Action::RotateCw => Pose::new(pose.cell, pose.orientation.rotate_cw()),
            Action::RotateCcw => Pose::new(pose.cell, pose.orientation.rotate_ccw()),
            Action::Forward => Pose::new(
                pose.cell.offset(pose.orientation.forward_delta()),
                pose.orientation,
            ),
        }
    }
}
