//! Standalone BRT corridor simulation
//!
//! This module contains the per-tick motion and decision engine for cars and
//! buses sharing a three-lane corridor. It has no rendering dependency; a
//! host ticks [`SimWorld`] and draws whatever it reads back.

mod behavior;
mod bus;
mod car;
mod config;
mod lane_change;
mod path;
mod schedule;
mod sensing;
mod stop;
mod throughput;
mod types;
mod world;

// Re-export public types for external use
pub use behavior::{BehaviorParams, DriverBehavior};
pub use bus::{
    bus_speed_for_gap, BusContext, BusEvent, BusState, Dwell, LapState, SimBus, StopPlan,
    StopTarget, BUS_FREE_FLOW_SPEED, BUS_MAX_STEERING, BUS_TRANSITION_MS, HOLD_POSITION,
    LAP_COMPLETE_POSITION,
};
pub use car::{
    free_road_speed, idm_speed, CarUpdateResult, LaneChangeBudget, SimCar, CAR_EXIT_POSITION,
    CAR_MAX_STEERING,
};
pub use config::{
    BusSchedule, Scenario, SimConfig, TrafficDensity, BOARDING_LANE, BUS_LANE, REQUIRED_LANES,
    TIME_COMPRESSION,
};
pub use lane_change::{compute_pose, ease_in_out_cubic, LaneTransition};
pub use path::{corridor_lanes, direction_at, lane_or_first, position_at, Lane};
pub use schedule::{EventQueue, ScheduledAction};
pub use sensing::{AgentSnapshot, Leader, Movable, TrafficAhead, TrafficSnapshot};
pub use stop::{
    corridor_stations, BusStop, DemandPoint, MAX_ARRIVALS_PER_REFILL, MAX_WAITING_PASSENGERS,
    REFILL_INTERVAL_MS, STATION_PATH_POSITIONS,
};
pub use throughput::{ThroughputSample, ThroughputTracker, HISTORY_INTERVAL_MS};
pub use types::{
    forward_gap, signed_gap, AgentId, BusId, CarId, DemandPointId, LaneIndex, Pose, Position,
    StopId, VehicleType, BUS_LENGTH_METERS, CAR_LENGTH_METERS, MIN_STANDSTILL_GAP,
    PASSENGERS_PER_CAR, PROGRESS_PER_SPEED_UNIT, ROAD_LENGTH_METERS, SCALE_FACTOR,
};
pub use world::{SimWorld, TickEvent, TickReport, WorldStats};
