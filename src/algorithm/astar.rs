use super::{construct_path, ReservationTable, Trace};
use crate::common::{Action, AgentId, Cell, Pose, TimeStep, Trajectory};
use crate::map::Map;
use crate::stat::Stats;

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, instrument, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResult {
    /// Fragment from the start timestep (holding the start pose) to the
    /// first arrival at the goal cell.
    Found(Trajectory),
    /// Frontier emptied without reaching the goal.
    Exhausted { expanded: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LowLevelOpenNode {
    pose: Pose,
    f_open_cost: usize,
    g_cost: usize,
    time_step: TimeStep,
}

impl Ord for LowLevelOpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_open_cost
            .cmp(&other.f_open_cost)
            // Higher g cost has higher priority
            .then_with(|| other.g_cost.cmp(&self.g_cost))
            .then_with(|| self.pose.cmp(&other.pose))
    }
}

impl PartialOrd for LowLevelOpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Validity of stepping from `from` (at `time_step - 1`) into `next` (at
/// `time_step`). Reservations of `agent` itself never block.
pub(crate) fn is_valid_successor(
    map: &Map,
    reservations: &ReservationTable,
    agent: AgentId,
    from: Cell,
    next: Pose,
    time_step: TimeStep,
) -> bool {
    map.is_traversable(next.cell)
        && !reservations.is_vertex_conflict(agent, next.cell, time_step)
        && !reservations.is_edge_conflict(agent, from, next.cell, time_step)
}

#[instrument(skip_all, name = "a_star", fields(agent = agent, start = %start.cell, goal = %goal, start_time = start_time), level = "debug")]
pub fn a_star_search(
    map: &Map,
    reservations: &ReservationTable,
    agent: AgentId,
    start: Pose,
    start_time: TimeStep,
    goal: Cell,
    stats: &mut Stats,
) -> SearchResult {
    stats.searches += 1;

    let mut open_list = BTreeSet::new();
    let mut closed_list = HashSet::new();
    let mut trace: Trace = HashMap::new();
    let mut g_cost_map = HashMap::new();
    let mut expanded = 0;

    open_list.insert(LowLevelOpenNode {
        pose: start,
        f_open_cost: start.cell.manhattan(&goal),
        g_cost: 0,
        time_step: start_time,
    });
    g_cost_map.insert(start, 0);

    while let Some(current) = open_list.pop_first() {
        trace!("expand node: {current:?}");
        expanded += 1;
        stats.expanded_nodes += 1;

        closed_list.insert(current.pose);

        if current.pose.cell == goal {
            return SearchResult::Found(construct_path(&trace, current.pose, start_time));
        }

        // Assuming uniform cost, which also indicate the current time.
        let tentative_g_cost = current.g_cost + 1;
        let next_time = current.time_step + 1;

        for action in Action::ALL {
            let next = action.apply(current.pose);
            if closed_list.contains(&next) {
                continue;
            }
            if !is_valid_successor(map, reservations, agent, current.pose.cell, next, next_time) {
                continue;
            }

            let old_g_cost = *g_cost_map.get(&next).unwrap_or(&usize::MAX);
            if tentative_g_cost < old_g_cost {
                let h_open_cost = next.cell.manhattan(&goal);

                // Replace the node already sitting in the open list.
                if old_g_cost != usize::MAX {
                    open_list.remove(&LowLevelOpenNode {
                        pose: next,
                        f_open_cost: old_g_cost + h_open_cost,
                        g_cost: old_g_cost,
                        time_step: start_time + old_g_cost,
                    });
                }

                trace.insert(next, current.pose);
                g_cost_map.insert(next, tentative_g_cost);
                open_list.insert(LowLevelOpenNode {
                    pose: next,
                    f_open_cost: tentative_g_cost + h_open_cost,
                    g_cost: tentative_g_cost,
                    time_step: next_time,
                });
            }
        }
    }

    stats.exhausted_searches += 1;
    debug!("cannot find solution after expanding {expanded} nodes");
    SearchResult::Exhausted { expanded }
}

/// Recovery step for an agent left without a plan: the first valid successor
/// in the order stay, rotate +90°, rotate -90°, forward. Stays put when
/// nothing is valid.
pub fn fallback_step(
    map: &Map,
    reservations: &ReservationTable,
    agent: AgentId,
    pose: Pose,
    time_step: TimeStep,
) -> Pose {
    Action::ALL
        .iter()
        .map(|action| action.apply(pose))
        .find(|next| is_valid_successor(map, reservations, agent, pose.cell, *next, time_step))
        .unwrap_or(pose)
}
