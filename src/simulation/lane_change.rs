//! Lane-change sub-state and rendering pose
//!
//! One convention for every vehicle: a transition exists only while a
//! change is in flight, and its progress climbs from 0.0 (just started) to
//! 1.0 (complete). At completion the transition is dropped, so a vehicle
//! can never run two overlapping changes.

use std::f32::consts::PI;

use super::path::{lane_or_first, Lane};
use super::types::{LaneIndex, Pose};

/// Height of the sideways arc, as a fraction of the lateral distance
const ARC_FACTOR: f32 = 0.2;

/// An in-flight lane change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneTransition {
    pub from: LaneIndex,
    pub to: LaneIndex,
    /// Monotonic in [0, 1]
    pub progress: f32,
    pub duration_ms: f32,
}

impl LaneTransition {
    pub fn start(from: LaneIndex, to: LaneIndex, duration_ms: f32) -> Self {
        Self {
            from,
            to,
            progress: 0.0,
            duration_ms: duration_ms.max(1.0),
        }
    }

    /// Advance by `delta_ms`; returns true once the change is complete
    pub fn advance(&mut self, delta_ms: f32) -> bool {
        self.progress = (self.progress + delta_ms / self.duration_ms).min(1.0);
        self.progress >= 1.0
    }

    pub fn eased(&self) -> f32 {
        ease_in_out_cubic(self.progress)
    }

    /// +1 toward higher lane indices, -1 toward lower
    pub fn direction(&self) -> f32 {
        if self.to > self.from {
            1.0
        } else {
            -1.0
        }
    }
}

pub fn ease_in_out_cubic(t: f32) -> f32 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

fn wrap_angle(mut angle: f32) -> f32 {
    if angle > PI {
        angle -= 2.0 * PI;
    }
    if angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Where to draw a vehicle this frame.
///
/// Outside a transition the vehicle sits on its lane's spline, facing along
/// the tangent. During one it is eased between the source and target lanes
/// at the same path progress, bowed sideways by a sine arc, and given an
/// extra steering angle that peaks mid-change and is zero at both ends.
pub fn compute_pose(
    lanes: &[Lane],
    lane: LaneIndex,
    transition: Option<&LaneTransition>,
    position: f32,
    max_steering: f32,
) -> Pose {
    let Some(current) = lane_or_first(lanes, lane) else {
        return Pose::default();
    };

    let Some(transition) = transition else {
        return Pose {
            position: current.position_at(position),
            angle: current.direction_at(position).heading(),
        };
    };

    let from = lane_or_first(lanes, transition.from).unwrap_or(current);
    let to = lane_or_first(lanes, transition.to).unwrap_or(current);

    let eased = transition.eased();
    let from_pos = from.position_at(position);
    let to_pos = to.position_at(position);
    let from_dir = from.direction_at(position);
    let to_dir = to.direction_at(position);

    let mut pose_position = from_pos.lerp(&to_pos, eased);

    let lateral = from_pos.distance(&to_pos);
    let bulge = (eased * PI).sin() * lateral * ARC_FACTOR;
    let normal = from_dir.unit_normal();
    let toward_target = normal.x * (to_pos.x - from_pos.x) + normal.y * (to_pos.y - from_pos.y);
    let side = if toward_target >= 0.0 { 1.0 } else { -1.0 };
    pose_position.x += normal.x * bulge * side;
    pose_position.y += normal.y * bulge * side;

    let from_angle = from_dir.heading();
    let to_angle = to_dir.heading();
    let steering = (eased * PI).sin() * max_steering * transition.direction();
    let angle = from_angle + wrap_angle(to_angle - from_angle) * eased + steering;

    Pose {
        position: pose_position,
        angle,
    }
}
