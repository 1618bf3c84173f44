use thiserror::Error;

use crate::common::{AgentId, Cell, TaskId, TimeStep};
use crate::map::Category;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("cell {cell} was never registered in the map")]
    UnknownCell { cell: Cell },

    #[error("cell {cell} lies outside the {width}x{height} grid")]
    OutOfBounds {
        cell: Cell,
        width: i32,
        height: i32,
    },

    #[error("cell {cell} already has category {existing:?}")]
    DuplicateCell { cell: Cell, existing: Category },

    #[error("illegal transition on task {task} by agent {agent}: {reason}")]
    IllegalTransition {
        task: TaskId,
        agent: AgentId,
        reason: &'static str,
    },

    #[error("agent {0} does not exist")]
    UnknownAgent(AgentId),

    #[error("task {0} does not exist")]
    UnknownTask(TaskId),

    #[error("agent {agent} has no pose at timestep {time_step}")]
    MissingPose { agent: AgentId, time_step: TimeStep },

    #[error("fragment starting at {start} cannot extend a trajectory ending at {last}")]
    DiscontiguousTrajectory { start: TimeStep, last: TimeStep },

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),
}
