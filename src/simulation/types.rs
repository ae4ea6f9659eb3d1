//! Core types for the traffic simulation
//!
//! Identifiers, geometry primitives, and the constants shared by the car
//! and bus models.

use std::fmt;

/// Index into the lane table. Lane 0 is the kerbside-left lane (the
/// dedicated bus lane when that scenario is active).
pub type LaneIndex = usize;

/// A wrapper type for car IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CarId(pub usize);

/// A wrapper type for bus IDs (sequential, assigned at initialization)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BusId(pub usize);

/// A wrapper type for visible station IDs (index into the stop table)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StopId(pub usize);

/// A wrapper type for invisible demand point IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DemandPointId(pub usize);

/// Any agent that moves along the lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentId {
    Car(CarId),
    Bus(BusId),
}

impl AgentId {
    pub fn is_bus(&self) -> bool {
        matches!(self, AgentId::Bus(_))
    }

    pub fn vehicle_type(&self) -> VehicleType {
        match self {
            AgentId::Car(_) => VehicleType::Car,
            AgentId::Bus(_) => VehicleType::Bus,
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentId::Car(id) => write!(f, "car#{}", id.0),
            AgentId::Bus(id) => write!(f, "bus#{}", id.0),
        }
    }
}

/// Type of vehicle in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleType {
    Car,
    Bus,
}

impl VehicleType {
    /// Real-world length in metres
    pub fn length_meters(&self) -> f32 {
        match self {
            VehicleType::Car => CAR_LENGTH_METERS,
            VehicleType::Bus => BUS_LENGTH_METERS,
        }
    }

    /// Drawn size in canvas pixels as (length, width)
    pub fn canvas_size(&self) -> (f32, f32) {
        let scale = SCALE_FACTOR * VEHICLE_VISIBILITY_FACTOR;
        (self.length_meters() * scale, VEHICLE_WIDTH_METERS * scale)
    }
}

/// A 2D position in world (canvas) space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(&self, other: &Position, t: f32) -> Position {
        Position {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Heading of this vector, treated as a direction
    pub fn heading(&self) -> f32 {
        self.y.atan2(self.x)
    }

    /// Unit normal of this vector, rotated 90 degrees clockwise in canvas
    /// space (y grows downward)
    pub fn unit_normal(&self) -> Position {
        let len = (self.x * self.x + self.y * self.y).sqrt();
        if len > 0.0 {
            Position {
                x: -self.y / len,
                y: self.x / len,
            }
        } else {
            Position::default()
        }
    }
}

/// Rendering pose derived each frame. Not authoritative state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    pub position: Position,
    /// Heading angle in radians
    pub angle: f32,
}

/// Forward distance from `from` to `to` on the closed loop, in [0, 1)
pub fn forward_gap(from: f32, to: f32) -> f32 {
    let mut delta = to - from;
    if delta < 0.0 {
        delta += 1.0;
    }
    delta
}

/// Signed distance from `from` to `to` on the closed loop, in [-0.5, 0.5]
pub fn signed_gap(from: f32, to: f32) -> f32 {
    let mut delta = to - from;
    if delta > 0.5 {
        delta -= 1.0;
    }
    if delta < -0.5 {
        delta += 1.0;
    }
    delta
}

/// Path progress per second for one unit of speed
pub const PROGRESS_PER_SPEED_UNIT: f32 = 0.05;

/// Length of a car in metres
pub const CAR_LENGTH_METERS: f32 = 4.5;

/// Length of a bus in metres
pub const BUS_LENGTH_METERS: f32 = 12.0;

/// Width of either vehicle in metres
pub const VEHICLE_WIDTH_METERS: f32 = 2.5;

/// Corridor length represented by one full lap
pub const ROAD_LENGTH_METERS: f32 = 2600.0;

/// Canvas width the built-in corridor is laid out on
pub const CANVAS_WIDTH: f32 = 5000.0;

/// Vehicles are drawn larger than life so they are visible on the canvas
pub const VEHICLE_VISIBILITY_FACTOR: f32 = 6.0;

/// Canvas pixels per metre
pub const SCALE_FACTOR: f32 = CANVAS_WIDTH / ROAD_LENGTH_METERS;

/// Fixed occupancy assumed for every car when counting throughput
pub const PASSENGERS_PER_CAR: u32 = 3;

/// Smallest path-position gap a vehicle keeps to its leader at standstill
pub const MIN_STANDSTILL_GAP: f32 = 0.005;
