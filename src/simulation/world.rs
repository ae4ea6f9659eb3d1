//! Main simulation world
//!
//! Owns every agent, the lanes, the stops, and the simulation clock. The host
//! calls [`SimWorld::tick`] once per frame and reads agent state back for
//! drawing.

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use super::behavior::DriverBehavior;
use super::bus::{BusContext, BusEvent, BusState, SimBus, StopTarget};
use super::car::{CarUpdateResult, LaneChangeBudget, SimCar};
use super::config::{SimConfig, BUS_LANE, REQUIRED_LANES};
use super::path::{corridor_lanes, Lane};
use super::schedule::{EventQueue, ScheduledAction};
use super::sensing::{Movable, TrafficSnapshot};
use super::stop::{corridor_stations, BusStop, DemandPoint};
use super::throughput::ThroughputTracker;
use super::types::{signed_gap, AgentId, BusId, CarId, LaneIndex};

/// A new car needs this much room at the start of its lane
const ENTRY_CLEARANCE: f32 = 0.02;
/// Share of the fleet cap above which spawns start being skipped
const SOFT_CAR_CAP: f32 = 0.7;
/// Columns in the terminal map
const MAP_WIDTH: usize = 100;

/// Something that happened during a tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickEvent {
    CarSpawned {
        car: CarId,
        lane: LaneIndex,
    },
    CarCompleted {
        car: CarId,
        travel_ms: f64,
    },
    LaneChangeStarted {
        agent: AgentId,
        from: LaneIndex,
        to: LaneIndex,
        emergency: bool,
    },
    BusActivated {
        bus: BusId,
        lane: LaneIndex,
        passengers: u32,
    },
    DwellStarted {
        bus: BusId,
        target: StopTarget,
        lane: LaneIndex,
    },
    DwellCompleted {
        bus: BusId,
        target: StopTarget,
        lane: LaneIndex,
        alighted: u32,
        boarded: u32,
    },
    LapCompleted {
        bus: BusId,
        travel_ms: f64,
        onboard: u32,
        stops_made: u32,
        stations_served: usize,
    },
}

impl TickEvent {
    fn from_bus(bus: BusId, event: BusEvent) -> Self {
        match event {
            BusEvent::LaneChangeStarted { from, to } => TickEvent::LaneChangeStarted {
                agent: AgentId::Bus(bus),
                from,
                to,
                emergency: false,
            },
            BusEvent::DwellStarted { target, lane } => {
                TickEvent::DwellStarted { bus, target, lane }
            }
            BusEvent::DwellCompleted {
                target,
                lane,
                alighted,
                boarded,
            } => TickEvent::DwellCompleted {
                bus,
                target,
                lane,
                alighted,
                boarded,
            },
            BusEvent::LapCompleted {
                travel_ms,
                onboard,
                stops_made,
                stations_served,
            } => TickEvent::LapCompleted {
                bus,
                travel_ms,
                onboard,
                stops_made,
                stations_served,
            },
        }
    }
}

/// Everything one tick produced
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub time_ms: f64,
    /// The delta actually simulated, after clamping
    pub delta_ms: f32,
    pub events: Vec<TickEvent>,
}

/// Aggregate counters for the host summary
#[derive(Debug, Clone, Default)]
pub struct WorldStats {
    pub time_ms: f64,
    pub cars_active: usize,
    pub cars_spawned: usize,
    pub cars_completed: usize,
    pub cars_transitioning: usize,
    pub polite_drivers: usize,
    pub neutral_drivers: usize,
    pub aggressive_drivers: usize,
    pub buses_active: usize,
    pub buses_dwelling: usize,
    pub bus_passengers_aboard: u32,
    pub waiting_passengers: u32,
}

type AlightingListener = Box<dyn FnMut(BusId, u32)>;

/// The main simulation world
pub struct SimWorld {
    config: SimConfig,
    lanes: Vec<Lane>,
    /// Cars on the circuit, in spawn order
    cars: BTreeMap<CarId, SimCar>,
    /// Buses, indexed by id
    buses: Vec<SimBus>,
    stops: Vec<BusStop>,
    demand_points: Vec<DemandPoint>,
    queue: EventQueue,
    throughput: ThroughputTracker,
    rng: StdRng,
    time_ms: f64,
    spawn_accumulator_ms: f32,
    next_car_id: usize,
    cars_spawned: usize,
    cars_completed: usize,
    alighting_listener: Option<AlightingListener>,
    shut_down: bool,
}

impl SimWorld {
    /// Build the world on the built-in three-lane corridor
    pub fn new(config: SimConfig) -> Result<Self> {
        Self::with_lanes(config, corridor_lanes())
    }

    pub fn with_lanes(config: SimConfig, lanes: Vec<Lane>) -> Result<Self> {
        config.validate().context("Invalid simulation config")?;
        if lanes.len() < REQUIRED_LANES {
            bail!(
                "Scenario '{}' needs {} lanes, got {}",
                config.scenario.label(),
                REQUIRED_LANES,
                lanes.len()
            );
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let stops = corridor_stations(&lanes, config.scenario.station_lane(), &mut rng);
        let demand_points = if config.scenario.has_bus_lane() {
            Vec::new()
        } else {
            DemandPoint::scatter(config.demand_point_count, &mut rng)
        };

        let mut buses: Vec<SimBus> = (0..config.bus_count())
            .map(|i| {
                let home_lane = if config.scenario.has_bus_lane() {
                    BUS_LANE
                } else {
                    i % REQUIRED_LANES
                };
                SimBus::new(BusId(i), home_lane, config.bus_capacity, &mut rng)
            })
            .collect();

        // The first bus departs immediately, the rest one headway apart
        let interval = config.schedule.schedule_interval_ms();
        let mut queue = EventQueue::new();
        for bus in buses.iter_mut() {
            if bus.id.0 == 0 {
                bus.activate(0.0);
                bus.refresh_pose(&lanes);
            } else {
                queue.schedule(bus.id.0 as f64 * interval, ScheduledAction::ActivateBus(bus.id));
            }
        }

        info!(
            "Simulation ready: {}, {} traffic, {} headway, {} buses, {} stations, {} demand points",
            config.scenario.label(),
            config.density.label(),
            config.schedule.label(),
            buses.len(),
            stops.len(),
            demand_points.len()
        );

        Ok(Self {
            config,
            lanes,
            cars: BTreeMap::new(),
            buses,
            stops,
            demand_points,
            queue,
            throughput: ThroughputTracker::new(),
            rng,
            time_ms: 0.0,
            spawn_accumulator_ms: 0.0,
            next_car_id: 0,
            cars_spawned: 0,
            cars_completed: 0,
            alighting_listener: None,
            shut_down: false,
        })
    }

    /// Register the callback fired with the number of riders who got off
    /// at every completed dwell
    pub fn set_alighting_listener<F>(&mut self, listener: F)
    where
        F: FnMut(BusId, u32) + 'static,
    {
        self.alighting_listener = Some(Box::new(listener));
    }

    /// Stop the simulation. Pending bus departures are cancelled and later
    /// ticks do nothing.
    pub fn shutdown(&mut self) {
        let cancelled = self.queue.cancel_all();
        self.shut_down = true;
        info!("Simulation stopped, {} scheduled departures cancelled", cancelled);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    pub fn cars(&self) -> impl Iterator<Item = &SimCar> {
        self.cars.values()
    }

    pub fn car(&self, id: CarId) -> Option<&SimCar> {
        self.cars.get(&id)
    }

    pub fn car_count(&self) -> usize {
        self.cars.len()
    }

    pub fn buses(&self) -> &[SimBus] {
        &self.buses
    }

    pub fn stops(&self) -> &[BusStop] {
        &self.stops
    }

    pub fn demand_points(&self) -> &[DemandPoint] {
        &self.demand_points
    }

    pub fn throughput(&self) -> &ThroughputTracker {
        &self.throughput
    }

    pub fn time_ms(&self) -> f64 {
        self.time_ms
    }

    pub fn pending_actions(&self) -> usize {
        self.queue.len()
    }

    /// The view every agent senses against, built from current state
    pub fn snapshot(&self) -> TrafficSnapshot {
        let cars = self.cars.values().map(Movable::snapshot);
        let buses = self
            .buses
            .iter()
            .filter(|bus| bus.is_on_circuit())
            .map(Movable::snapshot);
        TrafficSnapshot::from_agents(self.lanes.len(), cars.chain(buses))
    }

    /// Advance the simulation by `delta_ms`
    pub fn tick(&mut self, delta_ms: f32) -> TickReport {
        if self.shut_down {
            return TickReport {
                time_ms: self.time_ms,
                ..TickReport::default()
            };
        }

        let delta_ms = self.clamp_delta(delta_ms);
        self.time_ms += f64::from(delta_ms);
        let mut events = Vec::new();

        // Scheduled work lands before anything moves
        self.apply_due_actions(&mut events);

        if delta_ms > 0.0 {
            for stop in self.stops.iter_mut() {
                stop.refill(self.time_ms, &mut self.rng);
            }
            self.spawn_cars(delta_ms, &mut events);
            self.update_agents(delta_ms, &mut events);
        }

        self.throughput.record_all(&events);
        self.throughput.sample(self.time_ms);
        if let Some(listener) = self.alighting_listener.as_mut() {
            for event in &events {
                if let TickEvent::DwellCompleted { bus, alighted, .. } = event {
                    listener(*bus, *alighted);
                }
            }
        }

        TickReport {
            time_ms: self.time_ms,
            delta_ms,
            events,
        }
    }

    fn clamp_delta(&self, delta_ms: f32) -> f32 {
        if !delta_ms.is_finite() || delta_ms < 0.0 {
            warn!("Ignoring invalid tick delta {}", delta_ms);
            return 0.0;
        }
        if delta_ms > self.config.max_delta_ms {
            debug!("Clamping tick delta {:.1}ms to {:.1}ms", delta_ms, self.config.max_delta_ms);
            return self.config.max_delta_ms;
        }
        delta_ms
    }

    fn apply_due_actions(&mut self, events: &mut Vec<TickEvent>) {
        for action in self.queue.drain_due(self.time_ms) {
            match self.apply_action(action) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping {:?}: {:#}", action, e),
            }
        }
    }

    fn apply_action(&mut self, action: ScheduledAction) -> Result<TickEvent> {
        let id = action.bus();
        let bus = self
            .buses
            .get_mut(id.0)
            .with_context(|| format!("No bus with id {}", id.0))?;
        if bus.is_active() {
            bail!("bus#{} is already in service", id.0);
        }

        match action {
            ScheduledAction::ActivateBus(_) => bus.activate(self.time_ms),
            ScheduledAction::ReactivateBus(_) => bus.reactivate(self.time_ms, &mut self.rng),
        }
        bus.refresh_pose(&self.lanes);

        Ok(TickEvent::BusActivated {
            bus: id,
            lane: bus.lane,
            passengers: bus.passengers(),
        })
    }

    fn spawn_cars(&mut self, delta_ms: f32, events: &mut Vec<TickEvent>) {
        let interval = self.config.density.spawn_interval_ms();
        self.spawn_accumulator_ms += delta_ms;
        while self.spawn_accumulator_ms >= interval {
            self.spawn_accumulator_ms -= interval;
            if let Some(event) = self.try_spawn_car() {
                events.push(event);
            }
        }
    }

    fn try_spawn_car(&mut self) -> Option<TickEvent> {
        let max_cars = self.config.max_cars;
        let count = self.cars.len();
        if count >= max_cars {
            return None;
        }
        let soft_cap = max_cars as f32 * SOFT_CAR_CAP;
        if count as f32 > soft_cap {
            let skip_chance = (count as f32 - soft_cap) / (max_cars as f32 - soft_cap);
            if self.rng.random::<f32>() < skip_chance {
                return None;
            }
        }

        let mut candidates: Vec<LaneIndex> = self
            .config
            .scenario
            .car_lanes()
            .filter(|lane| *lane < self.lanes.len())
            .collect();
        candidates.shuffle(&mut self.rng);
        let Some(lane) = candidates.into_iter().find(|lane| self.entry_clear(*lane)) else {
            debug!("All entry lanes occupied, skipping a spawn");
            return None;
        };

        let id = CarId(self.next_car_id);
        self.next_car_id += 1;
        let mut car = SimCar::spawn(id, lane, self.config.density.speed_range(), &mut self.rng);
        car.refresh_pose(&self.lanes);
        self.cars.insert(id, car);
        self.cars_spawned += 1;

        Some(TickEvent::CarSpawned { car: id, lane })
    }

    /// Whether the first stretch of `lane` is free for a new car
    fn entry_clear(&self, lane: LaneIndex) -> bool {
        let cars = self.cars.values().map(Movable::snapshot);
        let buses = self
            .buses
            .iter()
            .filter(|bus| bus.is_on_circuit())
            .map(Movable::snapshot);
        !cars.chain(buses).any(|agent| {
            agent.occupies(lane) && signed_gap(0.0, agent.position).abs() < ENTRY_CLEARANCE
        })
    }

    /// Move every agent against one shared snapshot, then retire finished
    /// cars
    fn update_agents(&mut self, delta_ms: f32, events: &mut Vec<TickEvent>) {
        let snapshot = self.snapshot();

        let allowed_lanes = self.config.scenario.car_lanes();
        let mut budget = LaneChangeBudget::new(snapshot.car_count(), snapshot.cars_transitioning());
        let mut finished = Vec::new();
        for car in self.cars.values_mut() {
            let result = car.update(
                delta_ms,
                &snapshot,
                allowed_lanes.clone(),
                &mut budget,
                &mut self.rng,
            );
            match result {
                CarUpdateResult::Continue => {}
                CarUpdateResult::LaneChangeStarted { from, to, emergency } => {
                    events.push(TickEvent::LaneChangeStarted {
                        agent: AgentId::Car(car.id),
                        from,
                        to,
                        emergency,
                    });
                }
                CarUpdateResult::Completed { travel_ms } => finished.push((car.id, travel_ms)),
            }
        }

        let ctx = BusContext {
            scenario: self.config.scenario,
            lanes: &self.lanes,
            demand_points: &self.demand_points,
            snapshot: &snapshot,
            now_ms: self.time_ms,
            mandatory_stop_fraction: self.config.mandatory_stop_fraction,
        };
        let reactivate_at = self.time_ms + self.config.schedule.schedule_interval_ms();
        for bus in self.buses.iter_mut() {
            for event in bus.update(delta_ms, &ctx, &mut self.stops, &mut self.rng) {
                if matches!(event, BusEvent::LapCompleted { .. }) {
                    self.queue
                        .schedule(reactivate_at, ScheduledAction::ReactivateBus(bus.id));
                }
                events.push(TickEvent::from_bus(bus.id, event));
            }
            bus.refresh_pose(&self.lanes);
        }

        for (id, travel_ms) in finished {
            self.cars.remove(&id);
            self.cars_completed += 1;
            events.push(TickEvent::CarCompleted { car: id, travel_ms });
        }
        for car in self.cars.values_mut() {
            car.refresh_pose(&self.lanes);
        }
    }

    pub fn stats(&self) -> WorldStats {
        let mut stats = WorldStats {
            time_ms: self.time_ms,
            cars_active: self.cars.len(),
            cars_spawned: self.cars_spawned,
            cars_completed: self.cars_completed,
            ..WorldStats::default()
        };

        for car in self.cars.values() {
            if car.is_transitioning() {
                stats.cars_transitioning += 1;
            }
            match car.behavior {
                DriverBehavior::Polite => stats.polite_drivers += 1,
                DriverBehavior::Neutral => stats.neutral_drivers += 1,
                DriverBehavior::Aggressive => stats.aggressive_drivers += 1,
            }
        }
        for bus in self.buses.iter().filter(|b| b.is_active()) {
            stats.buses_active += 1;
            stats.bus_passengers_aboard += bus.passengers();
            if matches!(bus.state, BusState::Stopped(_)) {
                stats.buses_dwelling += 1;
            }
        }
        stats.waiting_passengers = self.stops.iter().map(BusStop::waiting).sum();

        stats
    }

    /// Print a summary of the world state
    pub fn print_summary(&self) {
        let stats = self.stats();
        println!("=== BRT Simulation Summary ===");
        println!(
            "Time: {:.1}s  Scenario: {}  Traffic: {}  Headway: {}",
            stats.time_ms / 1000.0,
            self.config.scenario.label(),
            self.config.density.label(),
            self.config.schedule.label()
        );
        println!(
            "Cars: {} active ({} changing lane), {} spawned, {} completed",
            stats.cars_active, stats.cars_transitioning, stats.cars_spawned, stats.cars_completed
        );
        println!(
            "Drivers: {} polite, {} neutral, {} aggressive",
            stats.polite_drivers, stats.neutral_drivers, stats.aggressive_drivers
        );
        println!(
            "Buses: {}/{} active, {} dwelling, {} aboard",
            stats.buses_active,
            self.buses.len(),
            stats.buses_dwelling,
            stats.bus_passengers_aboard
        );
        println!("Waiting at stations: {}", stats.waiting_passengers);
        println!();

        println!("--- Buses ---");
        for bus in &self.buses {
            let state = match bus.state {
                BusState::Inactive => "parked".to_string(),
                BusState::Moving => format!("moving at {:.3}", bus.position),
                BusState::Stopped(dwell) => format!("stopped at {:?}", dwell.target),
            };
            println!(
                "  Bus {}: lane {}, {}, passengers={}/{}, laps={}",
                bus.id.0,
                bus.lane,
                state,
                bus.passengers(),
                bus.capacity,
                bus.laps_completed
            );
        }

        println!("--- Throughput ---");
        println!(
            "  Passengers: cars={} buses={} total={}",
            self.throughput.car_passengers(),
            self.throughput.bus_passengers(),
            self.throughput.total_passengers()
        );
        if let Some(avg) = self.throughput.average_car_travel_ms() {
            println!("  Average car trip: {:.1}s", avg / 1000.0);
        }
        if let Some(avg) = self.throughput.average_bus_travel_ms() {
            println!("  Average bus lap: {:.1}s", avg / 1000.0);
        }
    }

    /// Draw the corridor as a terminal strip, one row per lane
    pub fn draw_map(&self) {
        let column = |position: f32| -> usize {
            let scaled = (position.clamp(0.0, 1.0) * (MAP_WIDTH - 1) as f32).round();
            (scaled as usize).min(MAP_WIDTH - 1)
        };

        let mut stops_row = vec![' '; MAP_WIDTH];
        for point in &self.demand_points {
            stops_row[column(point.path_position)] = '.';
        }
        for stop in &self.stops {
            stops_row[column(stop.path_position)] = 'S';
        }

        let mut grid = vec![vec!['-'; MAP_WIDTH]; self.lanes.len()];
        for car in self.cars.values() {
            if let Some(row) = grid.get_mut(car.lane) {
                row[column(car.position)] = if car.is_transitioning() { '>' } else { 'c' };
            }
        }
        for bus in self.buses.iter().filter(|b| b.is_active()) {
            if let Some(row) = grid.get_mut(bus.lane) {
                row[column(bus.position)] = if bus.state.dwell().is_some() { 'b' } else { 'B' };
            }
        }

        println!("\n=== Corridor Map ===");
        println!(
            "Legend: B=Bus, b=Bus at stop, c=Car, >=Car changing lane, S=Station, .=Demand point"
        );
        println!();
        println!("stops  |{}", stops_row.iter().collect::<String>());
        for (i, row) in grid.iter().enumerate() {
            println!("lane {} |{}", i, row.iter().collect::<String>());
        }
        println!();
    }
}
