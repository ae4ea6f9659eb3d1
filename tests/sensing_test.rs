//! Traffic sensing tests

use brt_sim::simulation::{AgentId, AgentSnapshot, BusId, CarId, TrafficSnapshot};

fn car(id: usize, lane: usize, position: f32, speed: f32) -> AgentSnapshot {
    AgentSnapshot {
        id: AgentId::Car(CarId(id)),
        lane,
        target_lane: None,
        position,
        speed,
    }
}

#[test]
fn test_sense_ahead_counts_only_within_look_ahead() {
    let a = car(0, 1, 0.1, 2.0);
    let b = car(1, 1, 0.3, 1.0);
    let c = car(2, 1, 0.5, 3.0);
    let snapshot = TrafficSnapshot::from_agents(3, [a, b, c]);

    let ahead = snapshot.sense_ahead(&a, 0.3, 1);
    assert_eq!(ahead.count, 1);
    assert!((ahead.nearest_distance - 0.2).abs() < 1e-5);
    assert!((ahead.avg_speed - 1.0).abs() < 1e-5);
}

#[test]
fn test_sense_ahead_defaults_on_open_road() {
    let a = car(0, 0, 0.4, 2.0);
    let behind = car(1, 0, 0.2, 5.0);
    let other_lane = car(2, 1, 0.45, 1.0);
    let snapshot = TrafficSnapshot::from_agents(3, [a, behind, other_lane]);

    let ahead = snapshot.sense_ahead(&a, 0.25, 0);
    assert_eq!(ahead.count, 0);
    assert_eq!(ahead.nearest_distance, 0.25);
    assert!((ahead.avg_speed - 3.0).abs() < 1e-5);
}

#[test]
fn test_sense_ahead_wraps_around_the_loop() {
    let a = car(0, 2, 0.95, 2.0);
    let b = car(1, 2, 0.05, 1.0);
    let snapshot = TrafficSnapshot::from_agents(3, [a, b]);

    let ahead = snapshot.sense_ahead(&a, 0.2, 2);
    assert_eq!(ahead.count, 1);
    assert!((ahead.nearest_distance - 0.1).abs() < 1e-5);

    let leader = snapshot.leader(&a, 2, 0.2).expect("wrapped leader");
    assert_eq!(leader.id, AgentId::Car(CarId(1)));
}

#[test]
fn test_sense_ahead_queries_another_lane() {
    let a = car(0, 1, 0.1, 2.0);
    let b = car(1, 2, 0.15, 1.5);
    let snapshot = TrafficSnapshot::from_agents(3, [a, b]);

    assert_eq!(snapshot.sense_ahead(&a, 0.3, 1).count, 0);
    let other = snapshot.sense_ahead(&a, 0.3, 2);
    assert_eq!(other.count, 1);
    assert!((other.nearest_distance - 0.05).abs() < 1e-5);
}

#[test]
fn test_merging_vehicle_is_seen_in_both_lanes() {
    let follower_lane1 = car(0, 1, 0.1, 2.0);
    let follower_lane2 = car(1, 2, 0.1, 2.0);
    let mut merging = car(2, 1, 0.2, 1.0);
    merging.target_lane = Some(2);
    let snapshot = TrafficSnapshot::from_agents(3, [follower_lane1, follower_lane2, merging]);

    let in_source = snapshot.leader(&follower_lane1, 1, 0.5).expect("leader in source lane");
    let in_target = snapshot.leader(&follower_lane2, 2, 0.5).expect("leader in target lane");
    assert_eq!(in_source.id, merging.id);
    assert_eq!(in_target.id, merging.id);
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.cars_transitioning(), 1);
}

#[test]
fn test_lane_change_safety_predicate() {
    let me = car(0, 1, 0.5, 2.0);

    // Slow vehicle well ahead, nothing behind: safe
    let snapshot = TrafficSnapshot::from_agents(3, [me, car(1, 2, 0.6, 1.0)]);
    assert!(snapshot.is_lane_change_safe(&me, 2, 0.03, 0.02));

    // Vehicle inside the front distance: unsafe
    let snapshot = TrafficSnapshot::from_agents(3, [me, car(1, 2, 0.52, 3.0)]);
    assert!(!snapshot.is_lane_change_safe(&me, 2, 0.03, 0.02));

    // Faster vehicle close behind: unsafe
    let snapshot = TrafficSnapshot::from_agents(3, [me, car(1, 2, 0.49, 3.0)]);
    assert!(!snapshot.is_lane_change_safe(&me, 2, 0.03, 0.02));

    // Slower vehicle close behind: safe
    let snapshot = TrafficSnapshot::from_agents(3, [me, car(1, 2, 0.49, 1.0)]);
    assert!(snapshot.is_lane_change_safe(&me, 2, 0.03, 0.02));

    // Directly alongside: always unsafe
    let snapshot = TrafficSnapshot::from_agents(3, [me, car(1, 2, 0.501, 0.0)]);
    assert!(!snapshot.is_lane_change_safe(&me, 2, 0.03, 0.02));
}

#[test]
fn test_safety_sees_vehicles_merging_into_target() {
    let me = car(0, 0, 0.5, 2.0);
    let mut merging = car(1, 1, 0.51, 1.0);
    merging.target_lane = Some(2);
    let snapshot = TrafficSnapshot::from_agents(3, [me, merging]);
    assert!(!snapshot.is_lane_change_safe(&me, 2, 0.03, 0.02));
}

#[test]
fn test_transition_nearby_uses_window() {
    let me = car(0, 0, 0.5, 2.0);
    let mut near = car(1, 2, 0.55, 2.0);
    near.target_lane = Some(1);
    let snapshot = TrafficSnapshot::from_agents(3, [me, near]);
    assert!(snapshot.transition_nearby(&me, 0.1));
    assert!(!snapshot.transition_nearby(&me, 0.04));
}

#[test]
fn test_buses_count_as_traffic_but_not_as_cars() {
    let me = car(0, 0, 0.1, 2.0);
    let bus = AgentSnapshot {
        id: AgentId::Bus(BusId(0)),
        lane: 0,
        target_lane: None,
        position: 0.2,
        speed: 2.0,
    };
    let snapshot = TrafficSnapshot::from_agents(3, [me, bus]);
    assert_eq!(snapshot.car_count(), 1);
    let leader = snapshot.leader(&me, 0, 0.5).expect("bus ahead");
    assert!(leader.id.is_bus());
    assert!((leader.gap - 0.1).abs() < 1e-5);
}
