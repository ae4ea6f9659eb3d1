//! Car following and lane-change tests

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use brt_sim::simulation::{
    free_road_speed, idm_speed, AgentId, AgentSnapshot, CarId, CarUpdateResult, DriverBehavior,
    LaneChangeBudget, Movable, SimCar, TrafficSnapshot, CAR_EXIT_POSITION,
};

#[test]
fn test_free_road_accelerates_toward_desired_speed() {
    assert!((free_road_speed(1.0, 3.0, 1000.0) - 1.5).abs() < 1e-5);
    assert_eq!(free_road_speed(2.9, 3.0, 1000.0), 3.0);
    assert!((free_road_speed(4.0, 3.0, 1000.0) - 3.5).abs() < 1e-5);
}

#[test]
fn test_idm_speeds_up_with_a_distant_leader() {
    let next = idm_speed(2.0, 3.0, 0.5, 2.0, 100.0);
    assert!(next > 2.0, "got {}", next);
}

#[test]
fn test_idm_brakes_for_a_close_leader() {
    let next = idm_speed(2.0, 3.0, 0.03, 0.0, 100.0);
    assert!(next < 2.0, "got {}", next);
}

#[test]
fn test_idm_never_goes_negative() {
    for gap in [0.0001, 0.001, 0.01, 0.02] {
        let next = idm_speed(4.0, 4.0, gap, 0.0, 100.0);
        assert!(next >= 0.0);
        assert!(next.is_finite());
    }
}

#[test]
fn test_car_never_passes_a_stopped_leader() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut car = SimCar::new(CarId(0), 1, 3.0, DriverBehavior::Neutral);
    car.position = 0.2;

    let blocker = AgentSnapshot {
        id: AgentId::Car(CarId(1)),
        lane: 1,
        target_lane: None,
        position: 0.3,
        speed: 0.0,
    };

    for _ in 0..600 {
        let snapshot = TrafficSnapshot::from_agents(3, [blocker, car.snapshot()]);
        let mut budget = LaneChangeBudget::new(2, 0);
        let result = car.update(100.0, &snapshot, 1..=1, &mut budget, &mut rng);
        assert_eq!(result, CarUpdateResult::Continue);
        assert!(car.position < blocker.position, "car reached {}", car.position);
        assert!(car.speed >= 0.0);
    }

    assert!(car.speed < 0.1);
    assert!(car.stuck_ms > 0.0);
}

#[test]
fn test_car_completes_at_end_of_corridor() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut car = SimCar::new(CarId(0), 2, 4.0, DriverBehavior::Aggressive);
    car.position = CAR_EXIT_POSITION - 0.01;

    let snapshot = TrafficSnapshot::from_agents(3, [car.snapshot()]);
    let mut budget = LaneChangeBudget::new(1, 0);
    let mut completed = false;
    for _ in 0..20 {
        let result = car.update(100.0, &snapshot, 2..=2, &mut budget, &mut rng);
        if let CarUpdateResult::Completed { travel_ms } = result {
            assert!(travel_ms > 0.0);
            completed = true;
            break;
        }
    }
    assert!(completed);
}

#[test]
fn test_spawned_speed_respects_range_and_profile() {
    let mut rng = StdRng::seed_from_u64(9);
    for i in 0..200 {
        let car = SimCar::spawn(CarId(i), 1, (2.0, 4.0), &mut rng);
        let multiplier = car.behavior.params().speed_multiplier;
        assert!(car.desired_speed >= 2.0 * multiplier - 1e-4);
        assert!(car.desired_speed <= 4.0 * multiplier + 1e-4);
        assert_eq!(car.position, 0.0);
        assert!(car.transition.is_none());
    }
}

#[test]
fn test_budget_caps_simultaneous_changes() {
    let mut budget = LaneChangeBudget::new(40, 1);
    assert_eq!(budget.limit(), 2);
    assert!(budget.try_reserve());
    assert!(!budget.try_reserve());
    budget.force_reserve();
    assert_eq!(budget.in_flight(), 3);

    assert_eq!(LaneChangeBudget::new(0, 0).limit(), 1);
}

/// Random traffic around one car; every discretionary change the car
/// commits to must pass the safety predicate for its profile
#[test]
fn test_lane_change_safety_fuzz() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut accepted = 0;

    for trial in 0..2000 {
        let behavior = DriverBehavior::ALL[trial % 3];
        let lane = rng.random_range(0..3);
        let mut car = SimCar::new(CarId(0), lane, rng.random_range(1.0..4.0), behavior);
        car.position = rng.random_range(0.1..0.8);
        car.speed = rng.random_range(0.0..4.0);
        if rng.random_bool(0.2) {
            car.stuck_ms = rng.random_range(0.0..6000.0);
        }

        let mut agents = vec![car.snapshot()];
        for id in 1..rng.random_range(2..16) {
            let other_lane = rng.random_range(0..3);
            agents.push(AgentSnapshot {
                id: AgentId::Car(CarId(id)),
                lane: other_lane,
                target_lane: None,
                position: rng.random_range(0.0..1.0),
                speed: rng.random_range(0.0..4.0),
            });
        }
        let snapshot = TrafficSnapshot::from_agents(3, agents.iter().copied());
        let me = car.snapshot();
        let mut budget = LaneChangeBudget::new(snapshot.car_count(), 0);

        if let CarUpdateResult::LaneChangeStarted { from, to, emergency } =
            car.update(1000.0, &snapshot, 0..=2, &mut budget, &mut rng)
        {
            assert_eq!(from, lane);
            assert_eq!(from.abs_diff(to), 1);
            if !emergency {
                let params = behavior.params();
                assert!(
                    snapshot.is_lane_change_safe(
                        &me,
                        to,
                        params.front_safe_distance,
                        params.rear_safe_distance
                    ),
                    "unsafe change {} -> {} in trial {}",
                    from,
                    to,
                    trial
                );
                accepted += 1;
            }
        }
    }

    assert!(accepted > 0, "no discretionary change was ever taken");
}

/// A car boxed in on the left lane with a neighbour alongside in the middle
/// lane must not hop over it into the empty far lane
#[test]
fn test_lane_change_never_skips_over_a_lane() {
    let leader = AgentSnapshot {
        id: AgentId::Car(CarId(1)),
        lane: 0,
        target_lane: None,
        position: 0.33,
        speed: 0.0,
    };

    for seed in 0..500 {
        let mut rng = StdRng::seed_from_u64(seed);
        let behavior = DriverBehavior::ALL[seed as usize % 3];
        let mut car = SimCar::new(CarId(0), 0, 3.0, behavior);
        car.position = 0.3;
        car.speed = 2.0;
        let stuck = seed % 2 == 1;
        if stuck {
            car.stuck_ms = 10_000.0;
        }

        let alongside = AgentSnapshot {
            id: AgentId::Car(CarId(2)),
            lane: 1,
            target_lane: None,
            position: if stuck { 0.301 } else { 0.307 },
            speed: 2.0,
        };
        let snapshot = TrafficSnapshot::from_agents(3, [leader, alongside, car.snapshot()]);
        let mut budget = LaneChangeBudget::new(snapshot.car_count(), 0);

        let result = car.update(100.0, &snapshot, 0..=2, &mut budget, &mut rng);
        assert_eq!(result, CarUpdateResult::Continue, "seed {}", seed);
        assert!(car.transition.is_none());
    }
}

#[test]
fn test_no_second_change_while_transitioning() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut car = SimCar::new(CarId(0), 1, 3.0, DriverBehavior::Aggressive);
    car.position = 0.3;
    car.stuck_ms = 10_000.0;

    let mut started = 0;
    for _ in 0..200 {
        let snapshot = TrafficSnapshot::from_agents(3, [car.snapshot()]);
        let mut budget = LaneChangeBudget::new(1, snapshot.cars_transitioning());
        let was_transitioning = car.is_transitioning();
        let result = car.update(16.0, &snapshot, 0..=2, &mut budget, &mut rng);
        if let CarUpdateResult::LaneChangeStarted { .. } = result {
            assert!(!was_transitioning);
            started += 1;
        }
        if let Some(transition) = car.transition {
            assert!(transition.progress >= 0.0 && transition.progress <= 1.0);
        }
        if car.position > 0.9 {
            break;
        }
    }
    assert!(started >= 1);
}
