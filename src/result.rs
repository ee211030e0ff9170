//! Uniform result record returned by every execution strategy

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::config::SimulationConfig;
use crate::simulation::{LocalContribution, MetricsAggregator, MetricsSummary};

/// Free-form diagnostic values, keyed by name
pub type Diagnostics = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub backend: String,
    pub config: SimulationConfig,

    pub wall_time_seconds: f64,
    pub total_simulated_time: f64,

    pub vehicles_completed: u64,
    pub avg_travel_time: f64,
    pub avg_stops_per_vehicle: f64,
    /// Vehicles per minute of simulated time
    pub throughput_veh_per_min: f64,

    pub extra_stats: Diagnostics,
}

impl ResultRecord {
    pub fn new(
        config: &SimulationConfig,
        wall_time_seconds: f64,
        summary: MetricsSummary,
        extra_stats: Diagnostics,
    ) -> Self {
        Self {
            backend: config.backend.name().to_string(),
            config: config.clone(),
            wall_time_seconds,
            total_simulated_time: config.total_time,
            vehicles_completed: summary.finished_count,
            avg_travel_time: summary.avg_travel_time,
            avg_stops_per_vehicle: summary.avg_stops,
            throughput_veh_per_min: summary.throughput_per_min,
            extra_stats,
        }
    }

    pub fn stat(&self, key: &str) -> Option<&Value> {
        self.extra_stats.get(key)
    }
}

/// Diagnostics every strategy reports about its world(s)
pub fn base_diagnostics(metrics: &MetricsAggregator, active_at_end: usize, ticks: u64) -> Diagnostics {
    diagnostics(
        metrics.total_spawned(),
        active_at_end as u64,
        ticks,
        metrics.travel_time_percentile(0.5),
        metrics.travel_time_percentile(0.95),
    )
}

/// The same diagnostics, over the combined contributions of a worker group
pub fn group_diagnostics(totals: &LocalContribution, ticks: u64) -> Diagnostics {
    diagnostics(
        totals.spawned,
        totals.active_at_end,
        ticks,
        totals.travel_time_percentile(0.5),
        totals.travel_time_percentile(0.95),
    )
}

fn diagnostics(
    spawned: u64,
    active_at_end: u64,
    ticks: u64,
    p50: Option<f64>,
    p95: Option<f64>,
) -> Diagnostics {
    let mut stats = Diagnostics::new();
    stats.insert("spawned".into(), spawned.into());
    stats.insert("active_at_end".into(), active_at_end.into());
    stats.insert("ticks".into(), ticks.into());
    stats.insert("p50_travel_time".into(), p50.into());
    stats.insert("p95_travel_time".into(), p95.into());
    stats
}
