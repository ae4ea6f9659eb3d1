//! Car motion model
//!
//! Cars follow the vehicle ahead with an IDM-style rule and take
//! discretionary lane changes scored by their driver profile. Every decision
//! reads the tick's [`TrafficSnapshot`]; only the car's own state is written.

use log::debug;
use rand::Rng;
use std::f32::consts::PI;
use std::ops::RangeInclusive;

use super::behavior::DriverBehavior;
use super::lane_change::{compute_pose, LaneTransition};
use super::path::Lane;
use super::sensing::{AgentSnapshot, Leader, Movable, TrafficSnapshot};
use super::types::{AgentId, CarId, LaneIndex, Pose, MIN_STANDSTILL_GAP, PROGRESS_PER_SPEED_UNIT};

/// IDM minimum jam distance
pub const IDM_MIN_GAP: f32 = 2.0;
/// IDM safe time headway
pub const IDM_TIME_HEADWAY: f32 = 1.5;
/// IDM maximum acceleration
pub const IDM_ACCELERATION: f32 = 1.0;
/// IDM comfortable deceleration
pub const IDM_DECELERATION: f32 = 3.0;
/// Acceleration toward desired speed on an open road
pub const FREE_ROAD_ACCELERATION: f32 = 0.5;

/// Largest visual steering offset during a car lane change
pub const CAR_MAX_STEERING: f32 = PI / 8.0;

/// Cars leave the circuit past this path position
pub const CAR_EXIT_POSITION: f32 = 0.98;

/// Leaders further than this don't affect speed
const LEADER_HORIZON: f32 = 0.5;
/// Look-ahead used when scoring lanes
const SCORING_LOOK_AHEAD: f32 = 0.2;
/// Look-ahead used by the emergency escape to find open space
const ESCAPE_LOOK_AHEAD: f32 = 0.3;
/// Nearest vehicle closer than this counts as blocking
const BLOCKED_DISTANCE: f32 = 0.05;
/// Speed under which a car counts as stuck
const STUCK_SPEED: f32 = 0.1;
/// Stuck time after which cooldowns shrink and the escape may fire
const STUCK_ESCAPE_MS: f32 = 2000.0;
/// No lane change while another vehicle this close is mid-change
const LOCAL_EXCLUSION_WINDOW: f32 = 0.1;
/// Wait before retrying after a change was blocked by other changes
const RETRY_MS: f32 = 500.0;
/// Chance a beneficial change is actually taken
const ACCEPTANCE_PROBABILITY: f32 = 0.7;
/// Share of the fleet that may be mid-change at once
const MAX_TRANSITIONING_SHARE: f32 = 0.05;
/// Minimum clearance for an emergency change
const ESCAPE_CLEARANCE: f32 = 0.01;

/// How many cars may start a lane change this tick.
///
/// Counts changes already in flight at the start of the tick plus every
/// change started during it.
#[derive(Debug, Clone, Copy)]
pub struct LaneChangeBudget {
    limit: usize,
    in_flight: usize,
}

impl LaneChangeBudget {
    pub fn new(car_count: usize, in_flight: usize) -> Self {
        let limit = ((car_count as f32 * MAX_TRANSITIONING_SHARE).ceil() as usize).max(1);
        Self { limit, in_flight }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn try_reserve(&mut self) -> bool {
        if self.in_flight < self.limit {
            self.in_flight += 1;
            true
        } else {
            false
        }
    }

    /// Reserve past the limit. Only the emergency escape does this.
    pub fn force_reserve(&mut self) {
        self.in_flight += 1;
    }
}

/// Result of a car update indicating what action should be taken
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CarUpdateResult {
    Continue,
    LaneChangeStarted {
        from: LaneIndex,
        to: LaneIndex,
        emergency: bool,
    },
    /// Car reached the end of the corridor and should be removed
    Completed { travel_ms: f64 },
}

/// IDM speed update against a leader `gap` ahead (in path units)
pub fn idm_speed(
    speed: f32,
    desired_speed: f32,
    gap: f32,
    leader_speed: f32,
    delta_ms: f32,
) -> f32 {
    let s = gap * 100.0;
    let approach = speed * IDM_TIME_HEADWAY
        + speed * (speed - leader_speed) / (2.0 * (IDM_ACCELERATION * IDM_DECELERATION).sqrt());
    let desired_gap = IDM_MIN_GAP + approach.max(0.0);
    let free_term = if desired_speed > 0.0 {
        (speed / desired_speed).powi(4)
    } else {
        1.0
    };
    let accel = IDM_ACCELERATION * (1.0 - free_term - (desired_gap / s).powi(2));
    let next = speed + accel * delta_ms / 1000.0;
    if next.is_nan() {
        0.0
    } else {
        next.max(0.0)
    }
}

/// Linear approach to the desired speed with nobody ahead
pub fn free_road_speed(speed: f32, desired_speed: f32, delta_ms: f32) -> f32 {
    let step = FREE_ROAD_ACCELERATION * delta_ms / 1000.0;
    if speed < desired_speed {
        (speed + step).min(desired_speed)
    } else {
        (speed - step).max(desired_speed)
    }
}

/// Chance of an event with `per_second` rate happening within `delta_ms`
fn per_tick_probability(per_second: f32, delta_ms: f32) -> f32 {
    let p = per_second.clamp(0.0, 1.0);
    1.0 - (1.0 - p).powf(delta_ms / 1000.0)
}

/// Lanes directly beside `lane` that the car may drive in
fn adjacent_lanes(
    lane: LaneIndex,
    allowed_lanes: &RangeInclusive<LaneIndex>,
    lane_count: usize,
) -> impl Iterator<Item = LaneIndex> + '_ {
    allowed_lanes
        .clone()
        .filter(move |l| l.abs_diff(lane) == 1 && *l < lane_count)
}

/// A car on the corridor
#[derive(Debug, Clone)]
pub struct SimCar {
    pub id: CarId,
    pub lane: LaneIndex,
    /// Lane the car spawned in; polite and neutral drivers favour it
    pub preferred_lane: LaneIndex,
    pub position: f32,
    pub speed: f32,
    pub desired_speed: f32,
    pub behavior: DriverBehavior,
    pub transition: Option<LaneTransition>,
    /// Time left before another lane change may be considered
    pub cooldown_ms: f32,
    /// Time spent below walking pace
    pub stuck_ms: f32,
    pub travel_ms: f64,
    pub pose: Pose,
}

impl Movable for SimCar {
    fn agent_id(&self) -> AgentId {
        AgentId::Car(self.id)
    }

    fn lane(&self) -> LaneIndex {
        self.lane
    }

    fn target_lane(&self) -> Option<LaneIndex> {
        self.transition.map(|t| t.to)
    }

    fn path_position(&self) -> f32 {
        self.position
    }

    fn speed(&self) -> f32 {
        self.speed
    }
}

impl SimCar {
    pub fn new(id: CarId, lane: LaneIndex, desired_speed: f32, behavior: DriverBehavior) -> Self {
        Self {
            id,
            lane,
            preferred_lane: lane,
            position: 0.0,
            speed: desired_speed,
            desired_speed,
            behavior,
            transition: None,
            cooldown_ms: 0.0,
            stuck_ms: 0.0,
            travel_ms: 0.0,
            pose: Pose::default(),
        }
    }

    /// Sample a new car: profile from the driver mix, desired speed from
    /// `speed_range` scaled by the profile's multiplier
    pub fn spawn<R: Rng + ?Sized>(
        id: CarId,
        lane: LaneIndex,
        speed_range: (f32, f32),
        rng: &mut R,
    ) -> Self {
        let behavior = DriverBehavior::sample(rng);
        let (lo, hi) = speed_range;
        let base = if hi > lo { rng.random_range(lo..hi) } else { lo };
        Self::new(id, lane, base * behavior.params().speed_multiplier, behavior)
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    /// Update car movement logic.
    ///
    /// Lane-change decisions use the car's start-of-tick state, the same
    /// state every other agent sees in `snapshot`.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        delta_ms: f32,
        snapshot: &TrafficSnapshot,
        allowed_lanes: RangeInclusive<LaneIndex>,
        budget: &mut LaneChangeBudget,
        rng: &mut R,
    ) -> CarUpdateResult {
        let me = self.snapshot();
        self.travel_ms += f64::from(delta_ms);
        self.cooldown_ms = (self.cooldown_ms - delta_ms).max(0.0);

        if let Some(transition) = self.transition.as_mut() {
            if transition.advance(delta_ms) {
                self.lane = transition.to;
                self.transition = None;
            }
        }

        let mut started = None;
        if me.target_lane.is_none() && self.transition.is_none() && self.cooldown_ms <= 0.0 {
            started =
                self.consider_lane_change(&me, delta_ms, snapshot, &allowed_lanes, budget, rng);
            if started.is_none() && self.stuck_ms > STUCK_ESCAPE_MS {
                started = self.emergency_escape(&me, snapshot, &allowed_lanes, budget, rng);
            }
        }

        let leader = self.nearest_leader(&me, snapshot);
        self.speed = match leader {
            Some(leader) => idm_speed(
                self.speed,
                self.desired_speed,
                leader.gap,
                leader.speed,
                delta_ms,
            ),
            None => free_road_speed(self.speed, self.desired_speed, delta_ms),
        };

        let mut advance = self.speed * PROGRESS_PER_SPEED_UNIT * delta_ms / 1000.0;
        if let Some(leader) = leader {
            advance = advance.min((leader.gap - MIN_STANDSTILL_GAP).max(0.0));
        }
        self.position += advance;

        if self.speed < STUCK_SPEED {
            self.stuck_ms += delta_ms;
        } else {
            self.stuck_ms = 0.0;
        }

        if self.position > CAR_EXIT_POSITION {
            return CarUpdateResult::Completed {
                travel_ms: self.travel_ms,
            };
        }

        match started {
            Some((to, emergency)) => CarUpdateResult::LaneChangeStarted {
                from: me.lane,
                to,
                emergency,
            },
            None => CarUpdateResult::Continue,
        }
    }

    /// Nearest leader in the current lane, or in either lane while merging
    fn nearest_leader(&self, me: &AgentSnapshot, snapshot: &TrafficSnapshot) -> Option<Leader> {
        let own = snapshot.leader(me, me.lane, LEADER_HORIZON);
        let target = me
            .target_lane
            .and_then(|lane| snapshot.leader(me, lane, LEADER_HORIZON));
        match (own, target) {
            (Some(a), Some(b)) => Some(if b.gap < a.gap { b } else { a }),
            (a, b) => a.or(b),
        }
    }

    /// Discretionary lane change; returns the target lane if one was started
    fn consider_lane_change<R: Rng + ?Sized>(
        &mut self,
        me: &AgentSnapshot,
        delta_ms: f32,
        snapshot: &TrafficSnapshot,
        allowed_lanes: &RangeInclusive<LaneIndex>,
        budget: &mut LaneChangeBudget,
        rng: &mut R,
    ) -> Option<(LaneIndex, bool)> {
        let params = self.behavior.params();
        let current = snapshot.sense_ahead(me, SCORING_LOOK_AHEAD, me.lane);

        let blocked = current.nearest_distance < BLOCKED_DISTANCE;
        let stuck_boost = (self.stuck_ms / 3000.0).min(1.0) * 0.5;
        let rate = params.lane_change_propensity * if blocked { 1.5 } else { 0.2 } + stuck_boost;
        if rng.random::<f32>() >= per_tick_probability(rate, delta_ms) {
            return None;
        }

        if snapshot.transition_nearby(me, LOCAL_EXCLUSION_WINDOW) {
            self.cooldown_ms = RETRY_MS;
            return None;
        }

        let current_score = self.behavior.lane_score(
            current.count,
            current.avg_speed,
            current.nearest_distance,
            me.lane == self.preferred_lane,
        );
        let stuck_bonus = (self.stuck_ms / 5000.0).min(1.0) * 3.0;

        let mut best: Option<(LaneIndex, f32)> = None;
        for lane in adjacent_lanes(me.lane, allowed_lanes, snapshot.lane_count()) {
            if !snapshot.is_lane_change_safe(
                me,
                lane,
                params.front_safe_distance,
                params.rear_safe_distance,
            ) {
                continue;
            }
            let ahead = snapshot.sense_ahead(me, SCORING_LOOK_AHEAD, lane);
            let score = self.behavior.lane_score(
                ahead.count,
                ahead.avg_speed,
                ahead.nearest_distance,
                lane == self.preferred_lane,
            ) + stuck_bonus;
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((lane, score));
            }
        }

        let (target, score) = best?;
        if score - current_score <= params.improvement_threshold {
            return None;
        }
        if rng.random::<f32>() >= ACCEPTANCE_PROBABILITY {
            return None;
        }
        if !budget.try_reserve() {
            self.cooldown_ms = RETRY_MS;
            return None;
        }

        let mut cooldown = params.cooldown_ms * (1.0 + rng.random::<f32>() * 0.5);
        if self.stuck_ms > STUCK_ESCAPE_MS {
            cooldown *= 0.5;
        }
        self.start_transition(target, params.transition_ms, cooldown);
        debug!(
            "{} ({:?}) changing lane {} -> {} at {:.3}",
            me.id, self.behavior, me.lane, target, me.position
        );
        Some((target, false))
    }

    /// Relaxed change for a car that has been stuck too long: a neighbouring
    /// lane with minimal clearance, preferring the most open space ahead
    fn emergency_escape<R: Rng + ?Sized>(
        &mut self,
        me: &AgentSnapshot,
        snapshot: &TrafficSnapshot,
        allowed_lanes: &RangeInclusive<LaneIndex>,
        budget: &mut LaneChangeBudget,
        rng: &mut R,
    ) -> Option<(LaneIndex, bool)> {
        let mut best: Option<(LaneIndex, f32)> = None;
        for lane in adjacent_lanes(me.lane, allowed_lanes, snapshot.lane_count()) {
            if snapshot.clearance(me, lane) < ESCAPE_CLEARANCE {
                continue;
            }
            let space = snapshot.sense_ahead(me, ESCAPE_LOOK_AHEAD, lane).nearest_distance;
            if best.is_none_or(|(_, s)| space > s) {
                best = Some((lane, space));
            }
        }

        let (target, _) = best?;
        budget.force_reserve();
        let cooldown = 500.0 + rng.random::<f32>() * 300.0;
        self.start_transition(target, self.behavior.params().transition_ms, cooldown);
        debug!(
            "{} stuck for {:.0}ms, emergency lane change {} -> {}",
            me.id, self.stuck_ms, me.lane, target
        );
        Some((target, true))
    }

    fn start_transition(&mut self, target: LaneIndex, duration_ms: f32, cooldown_ms: f32) {
        self.transition = Some(LaneTransition::start(self.lane, target, duration_ms));
        self.cooldown_ms = cooldown_ms;
    }

    /// Recompute the rendering pose from the current state
    pub fn refresh_pose(&mut self, lanes: &[Lane]) {
        self.pose = compute_pose(
            lanes,
            self.lane,
            self.transition.as_ref(),
            self.position,
            CAR_MAX_STEERING,
        );
    }
}
