//! Bus stops
//!
//! Visible stations have a fixed place on the kerb and a queue of waiting
//! passengers that refills over time. Invisible demand points are bare path
//! positions standing in for passengers hailing a bus in mixed traffic.

use rand::Rng;

use super::path::Lane;
use super::types::{DemandPointId, LaneIndex, Position, StopId};

/// Waiting passengers a station can hold
pub const MAX_WAITING_PASSENGERS: u32 = 20;

/// How often a station gains new passengers
pub const REFILL_INTERVAL_MS: f64 = 1000.0;

/// Upper bound on arrivals per refill
pub const MAX_ARRIVALS_PER_REFILL: u32 = 5;

/// Drawn radius of a station
pub const STOP_RADIUS: f32 = 40.0;

/// Path positions of the corridor's stations
pub const STATION_PATH_POSITIONS: [f32; 4] = [0.15, 0.35, 0.55, 0.75];

/// Demand points are placed inside this span of the lap
const DEMAND_SPAN: (f32, f32) = (0.05, 0.9);

/// A visible station
#[derive(Debug, Clone)]
pub struct BusStop {
    pub id: StopId,
    pub position: Position,
    pub path_position: f32,
    /// Lane the station sits beside
    pub lane: LaneIndex,
    pub radius: f32,
    pub max_waiting: u32,
    waiting: u32,
    last_refill_ms: f64,
}

impl BusStop {
    pub fn new(
        id: StopId,
        lane_index: LaneIndex,
        lane: &Lane,
        path_position: f32,
        waiting: u32,
    ) -> Self {
        Self {
            id,
            position: lane.position_at(path_position),
            path_position,
            lane: lane_index,
            radius: STOP_RADIUS,
            max_waiting: MAX_WAITING_PASSENGERS,
            waiting: waiting.min(MAX_WAITING_PASSENGERS),
            last_refill_ms: 0.0,
        }
    }

    pub fn waiting(&self) -> u32 {
        self.waiting
    }

    pub fn last_refill_ms(&self) -> f64 {
        self.last_refill_ms
    }

    /// Add a random batch of arrivals once per refill interval
    pub fn refill<R: Rng + ?Sized>(&mut self, now_ms: f64, rng: &mut R) {
        if now_ms - self.last_refill_ms < REFILL_INTERVAL_MS {
            return;
        }
        let arrivals = rng.random_range(0..=MAX_ARRIVALS_PER_REFILL);
        self.waiting = (self.waiting + arrivals).min(self.max_waiting);
        self.last_refill_ms = now_ms;
    }

    /// Remove up to `count` waiting passengers; returns how many boarded
    pub fn board(&mut self, count: u32) -> u32 {
        let boarded = count.min(self.waiting);
        self.waiting -= boarded;
        boarded
    }
}

/// An unmarked point where passengers may flag down a bus
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandPoint {
    pub id: DemandPointId,
    pub path_position: f32,
}

impl DemandPoint {
    /// Scatter `count` points along the lap, in path order
    pub fn scatter<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Vec<DemandPoint> {
        let mut positions: Vec<f32> = (0..count)
            .map(|_| rng.random_range(DEMAND_SPAN.0..DEMAND_SPAN.1))
            .collect();
        positions.sort_by(f32::total_cmp);
        positions
            .into_iter()
            .enumerate()
            .map(|(i, path_position)| DemandPoint {
                id: DemandPointId(i),
                path_position,
            })
            .collect()
    }
}

/// Build the corridor's stations beside `lane_index`, each starting with
/// 0-10 waiting passengers
pub fn corridor_stations<R: Rng + ?Sized>(
    lanes: &[Lane],
    lane_index: LaneIndex,
    rng: &mut R,
) -> Vec<BusStop> {
    let Some(lane) = lanes.get(lane_index) else {
        return Vec::new();
    };
    STATION_PATH_POSITIONS
        .iter()
        .enumerate()
        .map(|(i, &path_position)| {
            BusStop::new(StopId(i), lane_index, lane, path_position, rng.random_range(0..=10))
        })
        .collect()
}
