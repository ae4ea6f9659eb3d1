//! Scenario configuration
//!
//! The host picks three tiers (scenario, traffic density, bus headway);
//! everything else has a sensible default.

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::ops::RangeInclusive;

use super::types::LaneIndex;

/// The dedicated bus lane in the bus-lane scenario
pub const BUS_LANE: LaneIndex = 0;

/// The only lane passengers may board from in mixed traffic
pub const BOARDING_LANE: LaneIndex = 2;

/// Number of lanes both scenarios need
pub const REQUIRED_LANES: usize = 3;

/// One simulated second stands for one real minute
pub const TIME_COMPRESSION: f32 = 60.0;

/// Road layout under comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Lane 0 is reserved for buses; buses service every station
    #[value(name = "with-bus-lane", alias = "dedicated")]
    WithBusLane,
    /// Buses share all lanes and board from the kerbside lane only
    #[value(name = "without-bus-lane", alias = "mixed")]
    WithoutBusLane,
}

impl Scenario {
    pub fn label(&self) -> &'static str {
        match self {
            Scenario::WithBusLane => "With Bus Lane",
            Scenario::WithoutBusLane => "Without Bus Lane",
        }
    }

    pub fn has_bus_lane(&self) -> bool {
        matches!(self, Scenario::WithBusLane)
    }

    /// Lanes cars may drive in
    pub fn car_lanes(&self) -> RangeInclusive<LaneIndex> {
        match self {
            Scenario::WithBusLane => 1..=2,
            Scenario::WithoutBusLane => 0..=2,
        }
    }

    /// Lane the stations sit beside
    pub fn station_lane(&self) -> LaneIndex {
        match self {
            Scenario::WithBusLane => BUS_LANE,
            Scenario::WithoutBusLane => BOARDING_LANE,
        }
    }
}

/// Traffic density slider
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TrafficDensity {
    Low,
    Medium,
    High,
}

impl TrafficDensity {
    pub fn label(&self) -> &'static str {
        match self {
            TrafficDensity::Low => "Low",
            TrafficDensity::Medium => "Medium",
            TrafficDensity::High => "High",
        }
    }

    pub fn cars_per_minute(&self) -> f32 {
        match self {
            TrafficDensity::Low => 60.0,
            TrafficDensity::Medium => 120.0,
            TrafficDensity::High => 200.0,
        }
    }

    /// Desired-speed range cars are sampled from
    pub fn speed_range(&self) -> (f32, f32) {
        match self {
            TrafficDensity::Low => (2.0, 4.0),
            TrafficDensity::Medium => (1.5, 3.5),
            TrafficDensity::High => (1.0, 3.0),
        }
    }

    /// Time between car spawns in ms
    pub fn spawn_interval_ms(&self) -> f32 {
        60_000.0 / self.cars_per_minute()
    }
}

/// Bus headway slider, in real-world minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BusSchedule {
    #[value(name = "10mins")]
    TenMinutes,
    #[value(name = "20mins")]
    TwentyMinutes,
    #[value(name = "30mins")]
    ThirtyMinutes,
}

impl BusSchedule {
    pub fn label(&self) -> &'static str {
        match self {
            BusSchedule::TenMinutes => "10mins",
            BusSchedule::TwentyMinutes => "20mins",
            BusSchedule::ThirtyMinutes => "30mins",
        }
    }

    pub fn headway_minutes(&self) -> f32 {
        match self {
            BusSchedule::TenMinutes => 10.0,
            BusSchedule::TwentyMinutes => 20.0,
            BusSchedule::ThirtyMinutes => 30.0,
        }
    }

    /// Simulated ms between consecutive bus departures
    pub fn schedule_interval_ms(&self) -> f64 {
        f64::from(self.headway_minutes()) * 60_000.0 / f64::from(TIME_COMPRESSION)
    }

    /// Fleet size: enough departures to cover one real hour, plus one
    pub fn bus_count(&self) -> usize {
        (TIME_COMPRESSION / self.headway_minutes()).ceil() as usize + 1
    }
}

/// Everything the world needs to build itself
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub scenario: Scenario,
    pub density: TrafficDensity,
    pub schedule: BusSchedule,
    /// Seed for reproducible runs; OS entropy when absent
    pub seed: Option<u64>,
    /// Deltas above this are clamped (a backgrounded host can stall)
    pub max_delta_ms: f32,
    /// Lap fraction after which a bus that has not stopped must stop
    pub mandatory_stop_fraction: f32,
    pub bus_capacity: u32,
    pub max_cars: usize,
    pub demand_point_count: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new(Scenario::WithBusLane, TrafficDensity::Low, BusSchedule::TwentyMinutes)
    }
}

impl SimConfig {
    pub fn new(scenario: Scenario, density: TrafficDensity, schedule: BusSchedule) -> Self {
        Self {
            scenario,
            density,
            schedule,
            seed: None,
            max_delta_ms: 100.0,
            mandatory_stop_fraction: 0.7,
            bus_capacity: 90,
            max_cars: 200,
            demand_point_count: 8,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn bus_count(&self) -> usize {
        self.schedule.bus_count()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.max_delta_ms > 0.0) {
            bail!("max_delta_ms must be positive, got {}", self.max_delta_ms);
        }
        if !(self.mandatory_stop_fraction > 0.0 && self.mandatory_stop_fraction < 1.0) {
            bail!(
                "mandatory_stop_fraction must lie in (0, 1), got {}",
                self.mandatory_stop_fraction
            );
        }
        if self.bus_capacity == 0 {
            bail!("bus_capacity must be at least 1");
        }
        if self.max_cars == 0 {
            bail!("max_cars must be at least 1");
        }
        Ok(())
    }
}
