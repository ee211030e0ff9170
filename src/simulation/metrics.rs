//! Running traffic statistics and the values workers reduce across ranks

use ordered_float::OrderedFloat;
use sorted_vec::SortedVec;

use super::types::{Direction, VehicleId};
use super::vehicle::Vehicle;

/// One finished vehicle, in the order it left the map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinishedTrip {
    pub vehicle: VehicleId,
    pub direction: Direction,
    pub travel_time: f64,
    pub stops: u32,
}

/// Aggregate figures for a run
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricsSummary {
    pub finished_count: u64,
    pub avg_travel_time: f64,
    pub avg_stops: f64,
    pub throughput_per_min: f64,
}

impl MetricsSummary {
    /// All-zero when nothing finished; never divides by zero.
    pub fn from_totals(
        finished_count: u64,
        travel_time_sum: f64,
        stops_sum: f64,
        total_sim_time: f64,
    ) -> Self {
        if finished_count == 0 {
            return Self::default();
        }

        let n = finished_count as f64;
        let throughput_per_min = if total_sim_time > 0.0 {
            n / (total_sim_time / 60.0)
        } else {
            0.0
        };

        Self {
            finished_count,
            avg_travel_time: travel_time_sum / n,
            avg_stops: stops_sum / n,
            throughput_per_min,
        }
    }
}

/// A worker's share of the end-of-run collective.
///
/// Counts and sums are combined by addition, wall time by maximum. Travel
/// time samples are concatenated so percentiles can be taken over the group.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalContribution {
    pub finished_count: u64,
    pub travel_time_sum: f64,
    pub stops_sum: f64,
    pub spawned: u64,
    /// Vehicles still on the map when the run ended
    pub active_at_end: u64,
    pub travel_times: Vec<f64>,
    pub wall_time: f64,
}

impl LocalContribution {
    pub fn combine(mut self, other: LocalContribution) -> LocalContribution {
        self.travel_times.extend(other.travel_times);
        LocalContribution {
            finished_count: self.finished_count + other.finished_count,
            travel_time_sum: self.travel_time_sum + other.travel_time_sum,
            stops_sum: self.stops_sum + other.stops_sum,
            spawned: self.spawned + other.spawned,
            active_at_end: self.active_at_end + other.active_at_end,
            travel_times: self.travel_times,
            // the group is only as fast as its slowest worker
            wall_time: self.wall_time.max(other.wall_time),
        }
    }

    pub fn summarize(&self, total_sim_time: f64) -> MetricsSummary {
        MetricsSummary::from_totals(
            self.finished_count,
            self.travel_time_sum,
            self.stops_sum,
            total_sim_time,
        )
    }

    /// Nearest-rank percentile over all carried samples
    pub fn travel_time_percentile(&self, q: f64) -> Option<f64> {
        let mut sorted: Vec<OrderedFloat<f64>> =
            self.travel_times.iter().copied().map(OrderedFloat).collect();
        sorted.sort_unstable();
        nearest_rank(&sorted, q)
    }
}

/// `q` in `[0, 1]`; `sorted` must be ascending
fn nearest_rank(sorted: &[OrderedFloat<f64>], q: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let rank = (q.clamp(0.0, 1.0) * n as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(n - 1);
    Some(sorted[idx].into_inner())
}

/// Accumulates spawns and finished trips for one world
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    total_spawned: u64,
    trips: Vec<FinishedTrip>,
    sorted_travel_times: SortedVec<OrderedFloat<f64>>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            total_spawned: 0,
            trips: Vec::new(),
            sorted_travel_times: SortedVec::new(),
        }
    }

    pub fn record_spawn(&mut self) {
        self.total_spawned += 1;
    }

    /// Records a vehicle that has been marked finished; others are ignored
    pub fn record_finished(&mut self, vehicle: &Vehicle) {
        let Some(travel_time) = vehicle.travel_time() else {
            return;
        };

        self.trips.push(FinishedTrip {
            vehicle: vehicle.id,
            direction: vehicle.direction,
            travel_time,
            stops: vehicle.stops_count,
        });
        self.sorted_travel_times.insert(OrderedFloat(travel_time));
    }

    pub fn total_spawned(&self) -> u64 {
        self.total_spawned
    }

    pub fn finished_count(&self) -> u64 {
        self.trips.len() as u64
    }

    pub fn trips(&self) -> &[FinishedTrip] {
        &self.trips
    }

    pub fn travel_time_sum(&self) -> f64 {
        self.trips.iter().map(|t| t.travel_time).sum()
    }

    pub fn stops_sum(&self) -> f64 {
        self.trips.iter().map(|t| t.stops as f64).sum()
    }

    pub fn summary(&self, total_sim_time: f64) -> MetricsSummary {
        MetricsSummary::from_totals(
            self.finished_count(),
            self.travel_time_sum(),
            self.stops_sum(),
            total_sim_time,
        )
    }

    /// Nearest-rank percentile of travel times, `q` in `[0, 1]`
    pub fn travel_time_percentile(&self, q: f64) -> Option<f64> {
        nearest_rank(self.sorted_travel_times.as_slice(), q)
    }

    pub fn local_contribution(&self, active_at_end: usize, wall_time: f64) -> LocalContribution {
        LocalContribution {
            finished_count: self.finished_count(),
            travel_time_sum: self.travel_time_sum(),
            stops_sum: self.stops_sum(),
            spawned: self.total_spawned,
            active_at_end: active_at_end as u64,
            travel_times: self.trips.iter().map(|t| t.travel_time).collect(),
            wall_time,
        }
    }
}
