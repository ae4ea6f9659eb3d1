//! Lane geometry and lane-change pose tests

use brt_sim::simulation::{
    compute_pose, corridor_lanes, direction_at, ease_in_out_cubic, position_at, Lane,
    LaneTransition, Position, CAR_MAX_STEERING,
};

const EPS: f32 = 0.05;

fn close(a: Position, b: Position) -> bool {
    (a.x - b.x).abs() < EPS && (a.y - b.y).abs() < EPS
}

#[test]
fn test_spline_passes_through_endpoints() {
    for lane in corridor_lanes() {
        let points = lane.points();
        let first = points[0];
        let last = points[points.len() - 1];
        assert!(close(lane.position_at(0.0), first), "{} start", lane.name);
        assert!(close(lane.position_at(1.0), last), "{} end", lane.name);
    }
}

#[test]
fn test_spline_passes_through_interior_control_points() {
    let lanes = corridor_lanes();
    let lane = &lanes[1];
    let n = lane.points().len();
    for (i, point) in lane.points().iter().enumerate() {
        let t = i as f32 / (n - 1) as f32;
        assert!(close(lane.position_at(t), *point), "control point {}", i);
    }
}

#[test]
fn test_spline_is_continuous() {
    for lane in corridor_lanes() {
        let mut previous = lane.position_at(0.0);
        let steps = 5000;
        for i in 1..=steps {
            let t = i as f32 / steps as f32;
            let current = lane.position_at(t);
            // Control points are at most ~850px apart; a 1/5000 step can't jump far
            assert!(
                previous.distance(&current) < 5.0,
                "{} jumps at t={}: {:?} -> {:?}",
                lane.name,
                t,
                previous,
                current
            );
            previous = current;
        }
    }
}

#[test]
fn test_progress_is_clamped() {
    let lanes = corridor_lanes();
    let lane = &lanes[0];
    assert!(close(lane.position_at(-0.5), lane.position_at(0.0)));
    assert!(close(lane.position_at(1.5), lane.position_at(1.0)));
    assert!(close(lane.position_at(f32::NAN), lane.position_at(0.0)));
}

#[test]
fn test_malformed_lanes_return_default() {
    assert_eq!(position_at(&[], 0.5), Position::default());
    assert_eq!(position_at(&[Position::new(3.0, 4.0)], 0.5), Position::default());

    let broken = Lane::new(
        "broken",
        vec![Position::new(0.0, 0.0), Position::new(f32::NAN, 1.0), Position::new(10.0, 0.0)],
    );
    let p = broken.position_at(0.25);
    assert!(p.is_finite());

    let single = Lane::new("single", vec![Position::new(1.0, 1.0)]);
    assert_eq!(single.position_at(0.3), Position::default());
    assert_eq!(single.direction_at(0.3), Position::default());
}

#[test]
fn test_direction_follows_travel() {
    let straight = vec![
        Position::new(0.0, 0.0),
        Position::new(100.0, 0.0),
        Position::new(200.0, 0.0),
    ];
    for t in [0.0, 0.25, 0.5, 0.75, 1.0] {
        let d = direction_at(&straight, t);
        assert!(d.x > 0.0, "t={} direction {:?}", t, d);
        assert!(d.y.abs() < EPS);
    }
}

#[test]
fn test_ease_in_out_cubic_shape() {
    assert_eq!(ease_in_out_cubic(0.0), 0.0);
    assert!((ease_in_out_cubic(0.5) - 0.5).abs() < 1e-6);
    assert!((ease_in_out_cubic(1.0) - 1.0).abs() < 1e-6);

    let mut previous = 0.0;
    for i in 1..=100 {
        let v = ease_in_out_cubic(i as f32 / 100.0);
        assert!(v >= previous);
        previous = v;
    }
}

#[test]
fn test_transition_progress_is_monotonic_and_completes() {
    let mut transition = LaneTransition::start(1, 2, 1500.0);
    assert_eq!(transition.progress, 0.0);

    let mut previous = transition.progress;
    let mut completed = false;
    for _ in 0..100 {
        completed = transition.advance(16.0);
        assert!(transition.progress >= previous);
        assert!(transition.progress <= 1.0);
        previous = transition.progress;
        if completed {
            break;
        }
    }
    assert!(completed);
    assert_eq!(transition.progress, 1.0);
}

#[test]
fn test_pose_blends_between_lanes() {
    let lanes = corridor_lanes();
    let t = 0.4;
    let from = lanes[1].position_at(t);
    let to = lanes[2].position_at(t);

    let mut transition = LaneTransition::start(1, 2, 1000.0);
    let start = compute_pose(&lanes, 1, Some(&transition), t, CAR_MAX_STEERING);
    assert!(close(start.position, from));

    transition.advance(500.0);
    let mid = compute_pose(&lanes, 1, Some(&transition), t, CAR_MAX_STEERING);
    let lateral = from.distance(&to);
    // The arc bows the midpoint sideways, but never by more than a fifth
    // of the lateral distance
    let midpoint = from.lerp(&to, 0.5);
    assert!(mid.position.distance(&midpoint) <= lateral * 0.2 + EPS);

    transition.advance(500.0);
    let end = compute_pose(&lanes, 1, Some(&transition), t, CAR_MAX_STEERING);
    assert!(close(end.position, to));

    let settled = compute_pose(&lanes, 2, None, t, CAR_MAX_STEERING);
    assert!(close(settled.position, to));
    assert!((settled.angle - lanes[2].direction_at(t).heading()).abs() < EPS);
}

#[test]
fn test_steering_offset_vanishes_at_both_ends() {
    let lanes = corridor_lanes();
    let t = 0.6;
    let mut transition = LaneTransition::start(2, 1, 2000.0);
    let start = compute_pose(&lanes, 2, Some(&transition), t, CAR_MAX_STEERING);
    assert!((start.angle - lanes[2].direction_at(t).heading()).abs() < EPS);

    transition.advance(1000.0);
    let mid = compute_pose(&lanes, 2, Some(&transition), t, CAR_MAX_STEERING);
    let base = lanes[2].direction_at(t).heading();
    assert!((mid.angle - base).abs() <= CAR_MAX_STEERING + 0.2);

    transition.advance(1000.0);
    let end = compute_pose(&lanes, 2, Some(&transition), t, CAR_MAX_STEERING);
    assert!((end.angle - lanes[1].direction_at(t).heading()).abs() < EPS);
}
