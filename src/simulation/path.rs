//! Lane geometry
//!
//! Each lane is a Catmull-Rom spline through an ordered list of control
//! points. Evaluation never fails: a malformed lane yields the default
//! position so a single bad lane can't take down the frame.

use log::warn;

use super::types::{LaneIndex, Position};

/// Half-width of the finite difference used for tangents
const DIRECTION_EPSILON: f32 = 0.001;

/// A named lane through two or more control points
#[derive(Debug, Clone)]
pub struct Lane {
    pub name: String,
    points: Vec<Position>,
}

impl Lane {
    pub fn new(name: impl Into<String>, points: Vec<Position>) -> Self {
        let name = name.into();
        if points.len() < 2 {
            warn!(
                "Lane '{}' has {} control points; it will evaluate to the origin",
                name,
                points.len()
            );
        } else if points.iter().any(|p| !p.is_finite()) {
            warn!("Lane '{}' has non-finite control points", name);
        }
        Self { name, points }
    }

    pub fn points(&self) -> &[Position] {
        &self.points
    }

    /// World position at normalized progress `t`
    pub fn position_at(&self, t: f32) -> Position {
        position_at(&self.points, t)
    }

    /// Unnormalized tangent at normalized progress `t`
    pub fn direction_at(&self, t: f32) -> Position {
        direction_at(&self.points, t)
    }
}

/// Catmull-Rom evaluation over `points` at normalized progress `t`.
///
/// The segment is `floor(t * (N - 1))`; neighbour indices are clamped at the
/// ends, which duplicates the endpoints so the curve passes exactly through
/// the first and last control points.
pub fn position_at(points: &[Position], t: f32) -> Position {
    if points.len() < 2 {
        return Position::default();
    }
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

    let last = points.len() - 1;
    let segment_t = t * last as f32;
    let segment = (segment_t.floor() as usize).min(last);
    let fraction = segment_t - segment as f32;

    let p0 = points[segment.saturating_sub(1)];
    let p1 = points[segment];
    let p2 = points[(segment + 1).min(last)];
    let p3 = points[(segment + 2).min(last)];

    if !(p0.is_finite() && p1.is_finite() && p2.is_finite() && p3.is_finite()) {
        return Position::default();
    }

    catmull_rom(p0, p1, p2, p3, fraction)
}

/// Symmetric finite-difference tangent, with the sample points clamped to
/// the ends of the lane
pub fn direction_at(points: &[Position], t: f32) -> Position {
    let ahead = position_at(points, (t + DIRECTION_EPSILON).min(1.0));
    let behind = position_at(points, (t - DIRECTION_EPSILON).max(0.0));
    Position::new(ahead.x - behind.x, ahead.y - behind.y)
}

fn catmull_rom(p0: Position, p1: Position, p2: Position, p3: Position, t: f32) -> Position {
    let t2 = t * t;
    let t3 = t2 * t;
    let blend = |a: f32, b: f32, c: f32, d: f32| {
        0.5 * ((2.0 * b)
            + (-a + c) * t
            + (2.0 * a - 5.0 * b + 4.0 * c - d) * t2
            + (-a + 3.0 * b - 3.0 * c + d) * t3)
    };
    Position::new(blend(p0.x, p1.x, p2.x, p3.x), blend(p0.y, p1.y, p2.y, p3.y))
}

/// Look up a lane, falling back to lane 0 for an out-of-range index
pub fn lane_or_first(lanes: &[Lane], index: LaneIndex) -> Option<&Lane> {
    lanes.get(index).or_else(|| lanes.first())
}

/// The three-lane corridor the demo runs on (2.6 km laid out across a
/// 5000 px canvas). Lane 0 is the bus lane in the dedicated scenario; lane 2
/// is the kerbside boarding lane in mixed traffic.
pub fn corridor_lanes() -> Vec<Lane> {
    let xs = [20.0, 800.0, 1650.0, 2500.0, 3100.0, 3800.0, 4400.0, 4800.0];
    let rows: [(&str, [f32; 8]); 3] = [
        (
            "busLane",
            [180.0, 150.0, 150.0, 150.0, 140.0, 120.0, 90.0, 70.0],
        ),
        (
            "regularLane1",
            [280.0, 250.0, 270.0, 270.0, 250.0, 230.0, 210.0, 190.0],
        ),
        (
            "regularLane2",
            [350.0, 350.0, 350.0, 350.0, 340.0, 320.0, 290.0, 270.0],
        ),
    ];

    rows.iter()
        .map(|(name, ys)| {
            let points = xs
                .iter()
                .zip(ys.iter())
                .map(|(&x, &y)| Position::new(x, y))
                .collect();
            Lane::new(*name, points)
        })
        .collect()
}
