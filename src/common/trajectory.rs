use super::{Pose, TimeStep};
use crate::error::{Error, Result};

/// Contiguous timestep -> pose mapping. Never empty: it always holds the pose
/// at `origin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trajectory {
    origin: TimeStep,
    poses: Vec<Pose>,
}

impl Trajectory {
    pub fn new(start: Pose) -> Self {
        Self::starting_at(0, start)
    }

    pub fn starting_at(origin: TimeStep, pose: Pose) -> Self {
        Trajectory {
            origin,
            poses: vec![pose],
        }
    }

    #[cfg(test)]
    pub(crate) fn from_poses(origin: TimeStep, poses: Vec<Pose>) -> Option<Self> {
        if poses.is_empty() {
            return None;
        }
        Some(Trajectory { origin, poses })
    }

    /// Appends `pose` at `last_timestep() + 1`.
    pub fn push(&mut self, pose: Pose) {
        self.poses.push(pose);
    }

    pub fn get(&self, time_step: TimeStep) -> Option<&Pose> {
        time_step
            .checked_sub(self.origin)
            .and_then(|index| self.poses.get(index))
    }

    pub fn contains(&self, time_step: TimeStep) -> bool {
        self.get(time_step).is_some()
    }

    pub fn first_timestep(&self) -> TimeStep {
        self.origin
    }

    pub fn last_timestep(&self) -> TimeStep {
        self.origin + self.poses.len() - 1
    }

    pub fn last(&self) -> (TimeStep, Pose) {
        (self.last_timestep(), self.poses[self.poses.len() - 1])
    }

    /// Number of actions between the first and the last pose.
    pub fn actions(&self) -> usize {
        self.poses.len() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = (TimeStep, &Pose)> + '_ {
        self.poses
            .iter()
            .enumerate()
            .map(move |(index, pose)| (self.origin + index, pose))
    }

    /// Merges `fragment` in: every entry at or after the fragment's first
    /// timestep is replaced. Returns the replaced entries.
    pub fn merge(&mut self, fragment: Trajectory) -> Result<Vec<(TimeStep, Pose)>> {
        if fragment.origin < self.origin || fragment.origin > self.last_timestep() + 1 {
            return Err(Error::DiscontiguousTrajectory {
                start: fragment.origin,
                last: self.last_timestep(),
            });
        }

        let split = fragment.origin - self.origin;
        let replaced = self
            .poses
            .split_off(split)
            .into_iter()
            .enumerate()
            .map(|(index, pose)| (fragment.origin + index, pose))
            .collect();
        self.poses.extend(fragment.poses);
        Ok(replaced)
    }

    /// Drops every entry at or after `time_step`, always keeping the origin.
    /// Returns the removed entries.
    pub fn truncate_from(&mut self, time_step: TimeStep) -> Vec<(TimeStep, Pose)> {
        let keep = time_step.saturating_sub(self.origin).max(1);
        if keep >= self.poses.len() {
            return Vec::new();
        }
        self.poses
            .split_off(keep)
            .into_iter()
            .enumerate()
            .map(|(index, pose)| (self.origin + keep + index, pose))
            .collect()
    }
}
