use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub ticks: usize,
    pub searches: usize,
    pub expanded_nodes: usize,
    pub exhausted_searches: usize,
    pub recovery_steps: usize,
    pub preemptions: usize,
    pub delivered_tasks: usize,
    // Sum over delivered tasks of (delivery time - add time).
    pub service_time: usize,
    pub time_us: usize,
}

impl Stats {
    pub fn mean_service_time(&self) -> Option<f64> {
        if self.delivered_tasks == 0 {
            return None;
        }
        Some(self.service_time as f64 / self.delivered_tasks as f64)
    }

    pub fn print(&self) {
        info!(
            "Ticks {:?} Delivered {:?} Mean service time {:?} Time(microseconds) {:?}",
            self.ticks,
            self.delivered_tasks,
            self.mean_service_time(),
            self.time_us
        );
        info!(
            "Searches {:?} Expanded nodes {:?} Exhausted searches {:?} Recovery steps {:?} Preemptions {:?}",
            self.searches,
            self.expanded_nodes,
            self.exhausted_searches,
            self.recovery_steps,
            self.preemptions
        );
    }
}
