//! Passenger throughput and travel-time aggregation
//!
//! A reducer over tick events. Passengers are only ever counted when a car
//! completes its trip, when a bus drops riders at a stop, or when a bus
//! leaves the corridor with riders still aboard.

use super::types::PASSENGERS_PER_CAR;
use super::world::TickEvent;

/// How often a history point is recorded for charting
pub const HISTORY_INTERVAL_MS: f64 = 10_000.0;

/// Cumulative totals at one point in simulated time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    pub time_ms: f64,
    pub car_passengers: u64,
    pub bus_passengers: u64,
}

impl ThroughputSample {
    pub fn total(&self) -> u64 {
        self.car_passengers + self.bus_passengers
    }
}

#[derive(Debug, Clone)]
pub struct ThroughputTracker {
    cars_completed: u64,
    bus_alighted: u64,
    bus_exit_passengers: u64,
    bus_laps: u64,
    car_travel_ms: Vec<f64>,
    bus_travel_ms: Vec<f64>,
    history: Vec<ThroughputSample>,
    next_sample_ms: f64,
}

impl Default for ThroughputTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputTracker {
    pub fn new() -> Self {
        Self {
            cars_completed: 0,
            bus_alighted: 0,
            bus_exit_passengers: 0,
            bus_laps: 0,
            car_travel_ms: Vec::new(),
            bus_travel_ms: Vec::new(),
            history: Vec::new(),
            next_sample_ms: HISTORY_INTERVAL_MS,
        }
    }

    pub fn record(&mut self, event: &TickEvent) {
        match *event {
            TickEvent::CarCompleted { travel_ms, .. } => {
                self.cars_completed += 1;
                self.car_travel_ms.push(travel_ms);
            }
            TickEvent::DwellCompleted { alighted, .. } => {
                self.bus_alighted += u64::from(alighted);
            }
            TickEvent::LapCompleted { travel_ms, onboard, .. } => {
                self.bus_laps += 1;
                self.bus_exit_passengers += u64::from(onboard);
                self.bus_travel_ms.push(travel_ms);
            }
            _ => {}
        }
    }

    pub fn record_all<'a>(&mut self, events: impl IntoIterator<Item = &'a TickEvent>) {
        for event in events {
            self.record(event);
        }
    }

    /// Append history points for every interval boundary up to `now_ms`
    pub fn sample(&mut self, now_ms: f64) {
        while now_ms >= self.next_sample_ms {
            self.history.push(ThroughputSample {
                time_ms: self.next_sample_ms,
                car_passengers: self.car_passengers(),
                bus_passengers: self.bus_passengers(),
            });
            self.next_sample_ms += HISTORY_INTERVAL_MS;
        }
    }

    pub fn cars_completed(&self) -> u64 {
        self.cars_completed
    }

    pub fn bus_laps(&self) -> u64 {
        self.bus_laps
    }

    pub fn car_passengers(&self) -> u64 {
        self.cars_completed * u64::from(PASSENGERS_PER_CAR)
    }

    /// Riders dropped at stops plus riders aboard at lap exit
    pub fn bus_passengers(&self) -> u64 {
        self.bus_alighted + self.bus_exit_passengers
    }

    pub fn bus_alighted(&self) -> u64 {
        self.bus_alighted
    }

    pub fn total_passengers(&self) -> u64 {
        self.car_passengers() + self.bus_passengers()
    }

    pub fn car_travel_samples(&self) -> &[f64] {
        &self.car_travel_ms
    }

    pub fn bus_travel_samples(&self) -> &[f64] {
        &self.bus_travel_ms
    }

    pub fn average_car_travel_ms(&self) -> Option<f64> {
        average(&self.car_travel_ms)
    }

    pub fn average_bus_travel_ms(&self) -> Option<f64> {
        average(&self.bus_travel_ms)
    }

    pub fn history(&self) -> &[ThroughputSample] {
        &self.history
    }
}

fn average(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}
