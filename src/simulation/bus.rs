//! Bus motion and stop model
//!
//! Buses run a small state machine: parked off-circuit until their
//! scheduled departure, moving with simple gap-following, or stopped in a
//! dwell while passengers get off and on. In mixed traffic they may only
//! board from the kerbside lane and must leave and rejoin their own lane to
//! do so.

use log::{debug, info};
use rand::Rng;
use std::collections::HashSet;
use std::f32::consts::PI;

use super::config::{Scenario, BOARDING_LANE};
use super::lane_change::{compute_pose, LaneTransition};
use super::path::{lane_or_first, Lane};
use super::sensing::{AgentSnapshot, Leader, Movable, TrafficSnapshot};
use super::stop::{BusStop, DemandPoint};
use super::types::{
    AgentId, BusId, DemandPointId, LaneIndex, Pose, StopId, VehicleType, MIN_STANDSTILL_GAP,
    PROGRESS_PER_SPEED_UNIT,
};

/// Cruising speed with a clear road ahead
pub const BUS_FREE_FLOW_SPEED: f32 = 2.0;
/// Time to complete a bus lane change
pub const BUS_TRANSITION_MS: f32 = 2000.0;
/// Largest visual steering offset during a bus lane change
pub const BUS_MAX_STEERING: f32 = PI / 12.0;
/// A lap ends past this path position
pub const LAP_COMPLETE_POSITION: f32 = 0.95;
/// Where a bus that still owes a stop waits at the end of its lap
pub const HOLD_POSITION: f32 = 0.999;

/// Leaders further than this don't slow a bus
const LEADER_HORIZON: f32 = 0.15;
/// Closer than this to the leader, the bus stops
const STOP_GAP: f32 = 0.03;
/// Cap on the slowed speed fraction inside the horizon
const MAX_SLOW_FRACTION: f32 = 0.8;
/// A stop this close ahead is served even if the bus wouldn't reach it
const APPROACH_WINDOW: f32 = 0.02;
/// Distance a bus must cover after departing before it can stop again
const DEPARTURE_CLEARANCE: f32 = 0.01;
/// How far past its reach a mixed-traffic bus looks for stop opportunities
const DETECTION_RANGE: f32 = 0.3;
const MANDATORY_DETECTION_RANGE: f32 = 0.4;
const FRONT_SAFE_DISTANCE: f32 = 0.04;
const REAR_SAFE_DISTANCE: f32 = 0.03;
/// Safety margin for a bus that must reach the boarding lane
const RELAXED_SAFE_DISTANCE: f32 = 0.015;
/// Path covered at free flow during one lane change
const LANE_CHANGE_PROGRESS: f32 =
    BUS_FREE_FLOW_SPEED * PROGRESS_PER_SPEED_UNIT * BUS_TRANSITION_MS / 1000.0;
/// Base chance of wanting to serve a station or demand point
const STATION_STOP_CHANCE: f32 = 0.6;
const DEMAND_STOP_CHANCE: f32 = 0.25;
/// Extra stop chance at full load
const LOAD_STOP_WEIGHT: f32 = 0.3;

const STATION_DWELL_BASE_MS: f32 = 200.0;
const STATION_DWELL_PER_PASSENGER_MS: f32 = 100.0;
const FLAG_DWELL_BASE_MS: f32 = 50.0;
const FLAG_DWELL_PER_PASSENGER_MS: f32 = 10.0;

/// Where a bus stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopTarget {
    /// A visible station
    Station(StopId),
    /// An invisible demand point
    Demand(DemandPointId),
    /// An ad-hoc stop made to honour the once-per-lap service guarantee
    Hail,
}

impl StopTarget {
    pub fn is_station(&self) -> bool {
        matches!(self, StopTarget::Station(_))
    }
}

/// One passenger exchange in progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dwell {
    pub target: StopTarget,
    pub lane: LaneIndex,
    pub elapsed_ms: f32,
    pub duration_ms: f32,
    pub to_drop: u32,
    pub to_pick_up: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BusState {
    /// Off the circuit, waiting for a scheduled activation
    Inactive,
    Moving,
    Stopped(Dwell),
}

impl BusState {
    pub fn is_active(&self) -> bool {
        !matches!(self, BusState::Inactive)
    }

    pub fn dwell(&self) -> Option<&Dwell> {
        match self {
            BusState::Stopped(dwell) => Some(dwell),
            _ => None,
        }
    }
}

/// Bookkeeping for the current lap
#[derive(Debug, Clone, Default)]
pub struct LapState {
    pub started_ms: f64,
    pub stops_made: u32,
    /// Stops served this lap; none is served twice
    pub visited: HashSet<StopTarget>,
    /// Opportunities already weighed this lap
    pub considered: HashSet<StopTarget>,
    pub entered_boarding_lane: bool,
    pub served_in_boarding_lane: bool,
    /// The bus must take the next stop opportunity
    pub mandatory: bool,
    pub last_departure: Option<f32>,
}

impl LapState {
    fn new(started_ms: f64) -> Self {
        Self {
            started_ms,
            ..Self::default()
        }
    }

    pub fn has_stopped(&self) -> bool {
        self.stops_made > 0
    }

    pub fn stations_served(&self) -> usize {
        self.visited.iter().filter(|t| t.is_station()).count()
    }

    /// Whether the service guarantee is still unmet
    pub fn owes_service(&self) -> bool {
        !self.has_stopped() || (self.entered_boarding_lane && !self.served_in_boarding_lane)
    }
}

/// A stop a mixed-traffic bus has committed to reach
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopPlan {
    pub target: StopTarget,
    pub path_position: f32,
}

/// What happened to a bus during one update
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    LaneChangeStarted {
        from: LaneIndex,
        to: LaneIndex,
    },
    DwellStarted {
        target: StopTarget,
        lane: LaneIndex,
    },
    DwellCompleted {
        target: StopTarget,
        lane: LaneIndex,
        alighted: u32,
        boarded: u32,
    },
    LapCompleted {
        travel_ms: f64,
        onboard: u32,
        stops_made: u32,
        stations_served: usize,
    },
}

/// Read-only inputs a bus needs for one update
pub struct BusContext<'a> {
    pub scenario: Scenario,
    pub lanes: &'a [Lane],
    pub demand_points: &'a [DemandPoint],
    pub snapshot: &'a TrafficSnapshot,
    pub now_ms: f64,
    pub mandatory_stop_fraction: f32,
}

/// Three-tier gap rule: stop when very close, slow in proportion to the
/// gap when near, free flow otherwise
pub fn bus_speed_for_gap(gap: Option<f32>) -> f32 {
    match gap {
        Some(gap) if gap < STOP_GAP => 0.0,
        Some(gap) if gap < LEADER_HORIZON => {
            BUS_FREE_FLOW_SPEED * (gap * 10.0).min(MAX_SLOW_FRACTION)
        }
        _ => BUS_FREE_FLOW_SPEED,
    }
}

/// Passenger load a bus enters service with
fn sample_load<R: Rng + ?Sized>(capacity: u32, rng: &mut R) -> u32 {
    rng.random_range(70..=90).min(capacity)
}

/// A bus on the corridor
#[derive(Debug, Clone)]
pub struct SimBus {
    pub id: BusId,
    pub lane: LaneIndex,
    /// Lane the bus enters service in
    pub home_lane: LaneIndex,
    pub position: f32,
    pub speed: f32,
    pub capacity: u32,
    passengers: u32,
    pub state: BusState,
    pub transition: Option<LaneTransition>,
    pub lap: LapState,
    seeking: Option<StopPlan>,
    /// Lane to go back to after a stop diversion
    return_lane: Option<LaneIndex>,
    pub laps_completed: u32,
    pub pose: Pose,
}

impl Movable for SimBus {
    fn agent_id(&self) -> AgentId {
        AgentId::Bus(self.id)
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

    fn is_on_circuit(&self) -> bool {
        self.state.is_active()
    }
}

impl SimBus {
    pub fn new<R: Rng + ?Sized>(
        id: BusId,
        home_lane: LaneIndex,
        capacity: u32,
        rng: &mut R,
    ) -> Self {
        Self {
            id,
            lane: home_lane,
            home_lane,
            position: 0.0,
            speed: 0.0,
            capacity,
            passengers: sample_load(capacity, rng),
            state: BusState::Inactive,
            transition: None,
            lap: LapState::default(),
            seeking: None,
            return_lane: None,
            laps_completed: 0,
            pose: Pose::default(),
        }
    }

    pub fn passengers(&self) -> u32 {
        self.passengers
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn seeking(&self) -> Option<&StopPlan> {
        self.seeking.as_ref()
    }

    /// Put the bus on the circuit at the start of its home lane
    pub fn activate(&mut self, now_ms: f64) {
        self.state = BusState::Moving;
        self.lane = self.home_lane;
        self.position = 0.0;
        self.speed = BUS_FREE_FLOW_SPEED;
        self.transition = None;
        self.seeking = None;
        self.return_lane = None;
        self.lap = LapState::new(now_ms);
        debug!(
            "bus#{} entering service in lane {} with {} aboard",
            self.id.0, self.lane, self.passengers
        );
    }

    /// Return to service after a lap with a fresh passenger load
    pub fn reactivate<R: Rng + ?Sized>(&mut self, now_ms: f64, rng: &mut R) {
        self.passengers = sample_load(self.capacity, rng);
        self.activate(now_ms);
    }

    pub fn update<R: Rng + ?Sized>(
        &mut self,
        delta_ms: f32,
        ctx: &BusContext<'_>,
        stops: &mut [BusStop],
        rng: &mut R,
    ) -> Vec<BusEvent> {
        let mut events = Vec::new();
        match self.state {
            BusState::Inactive => return events,
            BusState::Stopped(dwell) => {
                self.speed = 0.0;
                self.update_dwell(dwell, delta_ms, stops, &mut events);
                return events;
            }
            BusState::Moving => {}
        }

        let me = self.snapshot();

        if let Some(transition) = self.transition.as_mut() {
            if transition.advance(delta_ms) {
                self.lane = transition.to;
                self.transition = None;
            }
        }

        let mixed = !ctx.scenario.has_bus_lane();
        if mixed {
            self.plan_mixed(&me, ctx, stops, rng, &mut events);
        }

        let leader = self.nearest_leader(&me, ctx.snapshot);
        self.speed = bus_speed_for_gap(leader.map(|l| l.gap));
        let mut advance = self.speed * PROGRESS_PER_SPEED_UNIT * delta_ms / 1000.0;
        if let Some(leader) = leader {
            advance = advance.min((leader.gap - MIN_STANDSTILL_GAP).max(0.0));
        }

        if let Some((target, stop_position)) = self.next_stop_point(ctx, stops) {
            let distance = stop_position - self.position;
            if distance >= 0.0 && (distance <= APPROACH_WINDOW || distance <= advance) {
                self.position += distance.min(advance);
                self.begin_dwell(target, stops, rng, &mut events);
                return events;
            }
        }

        let start = self.position;
        self.position += advance;

        if self.position >= LAP_COMPLETE_POSITION {
            if mixed && self.lap.owes_service() {
                self.position = self.position.min(HOLD_POSITION);
            } else {
                self.complete_lap(ctx.now_ms, &mut events);
                return events;
            }
        }

        // Held at the end of the lap or boxed in by the leader
        if self.position <= start {
            self.speed = 0.0;
        }

        events
    }

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

    fn in_boarding_lane(&self) -> bool {
        self.lane == BOARDING_LANE && self.transition.is_none()
    }

    fn clear_of_last_departure(&self) -> bool {
        self.lap
            .last_departure
            .is_none_or(|departed| self.position - departed >= DEPARTURE_CLEARANCE)
    }

    /// The stop this bus will serve next, if it is allowed to serve one here
    fn next_stop_point(
        &self,
        ctx: &BusContext<'_>,
        stops: &[BusStop],
    ) -> Option<(StopTarget, f32)> {
        if !self.clear_of_last_departure() {
            return None;
        }

        if !ctx.scenario.has_bus_lane() {
            if !self.in_boarding_lane() {
                return None;
            }
            return self.seeking.map(|plan| (plan.target, plan.path_position));
        }

        let (_, tolerance) = VehicleType::Bus.canvas_size();
        let lane = lane_or_first(ctx.lanes, self.lane)?;
        stops
            .iter()
            .filter(|stop| stop.path_position >= self.position)
            .filter(|stop| !self.lap.visited.contains(&StopTarget::Station(stop.id)))
            .filter(|stop| {
                (lane.position_at(stop.path_position).y - stop.position.y).abs() <= tolerance
            })
            .filter(|stop| self.passengers < self.capacity || stop.waiting() > 0)
            .min_by(|a, b| a.path_position.total_cmp(&b.path_position))
            .map(|stop| (StopTarget::Station(stop.id), stop.path_position))
    }

    /// Stop desire, mandatory-service flags, and the lane moves they cause
    fn plan_mixed<R: Rng + ?Sized>(
        &mut self,
        me: &AgentSnapshot,
        ctx: &BusContext<'_>,
        stops: &[BusStop],
        rng: &mut R,
        events: &mut Vec<BusEvent>,
    ) {
        if self.in_boarding_lane() {
            self.lap.entered_boarding_lane = true;
        }

        let was_mandatory = self.lap.mandatory;
        if !self.lap.has_stopped() && self.position >= ctx.mandatory_stop_fraction {
            self.lap.mandatory = true;
        }
        if self.lap.entered_boarding_lane && !self.lap.served_in_boarding_lane {
            self.lap.mandatory = true;
        }
        if self.lap.mandatory && !was_mandatory {
            debug!("bus#{} must stop at the next opportunity (at {:.3})", self.id.0, self.position);
        }

        if let Some(plan) = self.seeking {
            if self.position > plan.path_position {
                debug!(
                    "bus#{} passed {:?} before reaching the boarding lane, abandoning it",
                    self.id.0, plan.target
                );
                self.seeking = None;
            }
        }

        if self.seeking.is_none() {
            self.seeking = self.choose_opportunity(ctx, stops, rng);
            if self.seeking.is_none() && self.lap.mandatory {
                self.seeking = Some(StopPlan {
                    target: StopTarget::Hail,
                    path_position: HOLD_POSITION,
                });
            }
            if self.seeking.is_some() && self.return_lane.is_none() && !self.in_boarding_lane() {
                self.return_lane = Some(self.lane);
            }
        }

        let in_boarding = self.in_boarding_lane();
        if let Some(plan) = self.seeking.as_mut() {
            if in_boarding && plan.target == StopTarget::Hail {
                plan.path_position = plan.path_position.min(self.position);
            }
        }

        if self.transition.is_some() {
            return;
        }

        if self.seeking.is_some() {
            if self.lane != BOARDING_LANE {
                self.force_toward_boarding_lane(me, ctx.snapshot, events);
            }
        } else if let Some(return_lane) = self.return_lane {
            if self.lane == return_lane {
                self.return_lane = None;
            } else {
                let step = if return_lane < self.lane { self.lane - 1 } else { self.lane + 1 };
                if ctx
                    .snapshot
                    .is_lane_change_safe(me, step, FRONT_SAFE_DISTANCE, REAR_SAFE_DISTANCE)
                {
                    self.start_lane_change(step, events);
                }
            }
        }
    }

    /// Stop opportunities still ahead this lap, nearest first
    fn opportunities<'s>(
        &'s self,
        ctx: &'s BusContext<'_>,
        stops: &'s [BusStop],
    ) -> impl Iterator<Item = (StopTarget, f32, f32)> + 's {
        let stations = stops
            .iter()
            .map(|s| (StopTarget::Station(s.id), s.path_position, STATION_STOP_CHANCE));
        let demand = ctx
            .demand_points
            .iter()
            .map(|d| (StopTarget::Demand(d.id), d.path_position, DEMAND_STOP_CHANCE));
        stations
            .chain(demand)
            .filter(move |(target, position, _)| {
                *position > self.position && !self.lap.visited.contains(target)
            })
    }

    /// Weigh each opportunity in range once; mandatory buses take the first
    fn choose_opportunity<R: Rng + ?Sized>(
        &mut self,
        ctx: &BusContext<'_>,
        stops: &[BusStop],
        rng: &mut R,
    ) -> Option<StopPlan> {
        let mandatory = self.lap.mandatory;

        // Lanes are crossed one at a time, so nearer stops can't be reached
        let lanes_away = if self.in_boarding_lane() {
            0
        } else {
            self.lane.abs_diff(BOARDING_LANE).max(1)
        };
        let reach = lanes_away as f32 * LANE_CHANGE_PROGRESS;
        let range = reach
            + if mandatory {
                MANDATORY_DETECTION_RANGE
            } else {
                DETECTION_RANGE
            };

        let mut candidates: Vec<(StopTarget, f32, f32)> = self
            .opportunities(ctx, stops)
            .filter(|(target, position, _)| {
                let distance = *position - self.position;
                distance >= reach
                    && distance <= range
                    && (mandatory || !self.lap.considered.contains(target))
            })
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

        let load = if self.capacity > 0 {
            self.passengers as f32 / self.capacity as f32
        } else {
            0.0
        };

        for (target, path_position, chance) in candidates {
            self.lap.considered.insert(target);
            let p = if mandatory {
                1.0
            } else {
                chance + LOAD_STOP_WEIGHT * load
            };
            if rng.random::<f32>() < p {
                debug!("bus#{} heading for {:?} at {:.3}", self.id.0, target, path_position);
                return Some(StopPlan { target, path_position });
            }
        }
        None
    }

    /// Move one lane closer to the boarding lane if the neighbouring lane is
    /// clear
    fn force_toward_boarding_lane(
        &mut self,
        me: &AgentSnapshot,
        snapshot: &TrafficSnapshot,
        events: &mut Vec<BusEvent>,
    ) {
        let (front, rear) = if self.lap.mandatory {
            (RELAXED_SAFE_DISTANCE, RELAXED_SAFE_DISTANCE)
        } else {
            (FRONT_SAFE_DISTANCE, REAR_SAFE_DISTANCE)
        };

        let step = if self.lane < BOARDING_LANE {
            self.lane + 1
        } else {
            self.lane - 1
        };
        if snapshot.is_lane_change_safe(me, step, front, rear) {
            self.start_lane_change(step, events);
        }
    }

    fn start_lane_change(&mut self, to: LaneIndex, events: &mut Vec<BusEvent>) {
        let from = self.lane;
        self.transition = Some(LaneTransition::start(from, to, BUS_TRANSITION_MS));
        debug!("bus#{} changing lane {} -> {} at {:.3}", self.id.0, from, to, self.position);
        events.push(BusEvent::LaneChangeStarted { from, to });
    }

    /// Enter a dwell, fixing the exchange from the current load and queue
    fn begin_dwell<R: Rng + ?Sized>(
        &mut self,
        target: StopTarget,
        stops: &[BusStop],
        rng: &mut R,
        events: &mut Vec<BusEvent>,
    ) {
        let onboard = self.passengers;
        let (to_drop, to_pick_up, duration_ms) = match target {
            StopTarget::Station(id) => {
                let waiting = stops.get(id.0).map_or(0, BusStop::waiting);
                let to_drop = onboard.min(rng.random_range(5..=14));
                let room = self.capacity.saturating_sub(onboard - to_drop);
                let to_pick_up = waiting.min(room).min(rng.random_range(5..=20));
                let duration = STATION_DWELL_BASE_MS
                    + STATION_DWELL_PER_PASSENGER_MS * (to_drop + to_pick_up) as f32;
                (to_drop, to_pick_up, duration)
            }
            StopTarget::Demand(_) | StopTarget::Hail => {
                let to_drop = onboard.min(rng.random_range(0..=3));
                let room = self.capacity.saturating_sub(onboard - to_drop);
                let to_pick_up = room.min(rng.random_range(0..=2));
                let duration = FLAG_DWELL_BASE_MS
                    + FLAG_DWELL_PER_PASSENGER_MS * (to_drop + to_pick_up) as f32;
                (to_drop, to_pick_up, duration)
            }
        };

        self.speed = 0.0;
        self.seeking = None;
        self.state = BusState::Stopped(Dwell {
            target,
            lane: self.lane,
            elapsed_ms: 0.0,
            duration_ms,
            to_drop,
            to_pick_up,
        });
        debug!(
            "bus#{} stopping at {:?} in lane {} for {:.0}ms",
            self.id.0, target, self.lane, duration_ms
        );
        events.push(BusEvent::DwellStarted {
            target,
            lane: self.lane,
        });
    }

    fn update_dwell(
        &mut self,
        mut dwell: Dwell,
        delta_ms: f32,
        stops: &mut [BusStop],
        events: &mut Vec<BusEvent>,
    ) {
        dwell.elapsed_ms += delta_ms;
        if dwell.elapsed_ms < dwell.duration_ms {
            self.state = BusState::Stopped(dwell);
            return;
        }

        let alighted = dwell.to_drop.min(self.passengers);
        self.passengers -= alighted;
        let room = self.capacity.saturating_sub(self.passengers);
        let boarded = match dwell.target {
            StopTarget::Station(id) => stops
                .get_mut(id.0)
                .map_or(0, |stop| stop.board(dwell.to_pick_up.min(room))),
            StopTarget::Demand(_) | StopTarget::Hail => dwell.to_pick_up.min(room),
        };
        self.passengers += boarded;

        self.lap.stops_made += 1;
        self.lap.visited.insert(dwell.target);
        self.lap.last_departure = Some(self.position);
        if dwell.lane == BOARDING_LANE {
            self.lap.served_in_boarding_lane = true;
        }
        self.lap.mandatory = false;
        self.state = BusState::Moving;

        debug!(
            "bus#{} leaving {:?}: {} off, {} on, {} aboard",
            self.id.0, dwell.target, alighted, boarded, self.passengers
        );
        events.push(BusEvent::DwellCompleted {
            target: dwell.target,
            lane: dwell.lane,
            alighted,
            boarded,
        });
    }

    fn complete_lap(&mut self, now_ms: f64, events: &mut Vec<BusEvent>) {
        let travel_ms = now_ms - self.lap.started_ms;
        let onboard = self.passengers;
        let stops_made = self.lap.stops_made;
        let stations_served = self.lap.stations_served();

        self.laps_completed += 1;
        self.state = BusState::Inactive;
        self.position = 0.0;
        self.speed = 0.0;
        self.transition = None;
        self.seeking = None;
        self.return_lane = None;

        info!(
            "bus#{} completed lap {} in {:.1}s: {} stops, {} aboard",
            self.id.0,
            self.laps_completed,
            travel_ms / 1000.0,
            stops_made,
            onboard
        );
        events.push(BusEvent::LapCompleted {
            travel_ms,
            onboard,
            stops_made,
            stations_served,
        });
    }

    /// Recompute the rendering pose from the current state
    pub fn refresh_pose(&mut self, lanes: &[Lane]) {
        self.pose = compute_pose(
            lanes,
            self.lane,
            self.transition.as_ref(),
            self.position,
            BUS_MAX_STEERING,
        );
    }
}
