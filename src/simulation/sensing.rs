//! Traffic sensing over a per-tick snapshot
//!
//! Every agent reads the snapshot taken at the start of the tick, so the
//! result of an update never depends on which agents happened to move
//! earlier in the same tick.

use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use super::types::{forward_gap, signed_gap, AgentId, LaneIndex, MIN_STANDSTILL_GAP};

/// Read-only view of one agent as seen by the others
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub lane: LaneIndex,
    /// Lane being merged into, if mid-transition
    pub target_lane: Option<LaneIndex>,
    pub position: f32,
    pub speed: f32,
}

impl AgentSnapshot {
    pub fn is_transitioning(&self) -> bool {
        self.target_lane.is_some()
    }

    /// Whether this agent physically occupies `lane`. A merging agent
    /// occupies both its source and target lane.
    pub fn occupies(&self, lane: LaneIndex) -> bool {
        self.lane == lane || self.target_lane == Some(lane)
    }
}

/// Anything that travels the lanes: the shared face of cars and buses
pub trait Movable {
    fn agent_id(&self) -> AgentId;
    fn lane(&self) -> LaneIndex;
    fn target_lane(&self) -> Option<LaneIndex>;
    fn path_position(&self) -> f32;
    fn speed(&self) -> f32;

    /// Off-circuit agents (parked buses) are invisible to sensing
    fn is_on_circuit(&self) -> bool {
        true
    }

    fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.agent_id(),
            lane: self.lane(),
            target_lane: self.target_lane(),
            position: self.path_position(),
            speed: self.speed(),
        }
    }
}

/// Summary of the traffic ahead of an agent in one lane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficAhead {
    pub count: usize,
    pub avg_speed: f32,
    pub nearest_distance: f32,
}

/// The closest agent ahead in a lane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leader {
    pub id: AgentId,
    pub gap: f32,
    pub speed: f32,
}

/// Immutable picture of every on-circuit agent at the start of a tick
#[derive(Debug, Default, Clone)]
pub struct TrafficSnapshot {
    agents: HashMap<AgentId, AgentSnapshot>,
    /// Per lane, agents keyed by path position
    lanes: Vec<BTreeMap<OrderedFloat<f32>, Vec<AgentSnapshot>>>,
}

impl TrafficSnapshot {
    pub fn new(lane_count: usize) -> Self {
        Self {
            agents: HashMap::new(),
            lanes: vec![BTreeMap::new(); lane_count],
        }
    }

    pub fn from_agents(lane_count: usize, agents: impl IntoIterator<Item = AgentSnapshot>) -> Self {
        let mut snapshot = Self::new(lane_count);
        for agent in agents {
            snapshot.insert(agent);
        }
        snapshot
    }

    pub fn insert(&mut self, agent: AgentSnapshot) {
        let key = OrderedFloat(agent.position);
        if let Some(lane) = self.lanes.get_mut(agent.lane) {
            lane.entry(key).or_default().push(agent);
        }
        if let Some(target) = agent.target_lane.filter(|t| *t != agent.lane) {
            if let Some(lane) = self.lanes.get_mut(target) {
                lane.entry(key).or_default().push(agent);
            }
        }
        self.agents.insert(agent.id, agent);
    }

    pub fn get(&self, id: AgentId) -> Option<&AgentSnapshot> {
        self.agents.get(&id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentSnapshot> {
        self.agents.values()
    }

    /// Everyone occupying `lane`, in path-position order
    pub fn occupants(&self, lane: LaneIndex) -> impl Iterator<Item = &AgentSnapshot> {
        self.lanes
            .get(lane)
            .into_iter()
            .flat_map(|map| map.values().flatten())
    }

    /// Agents ahead of `position` in `lane`, nearest first, with their
    /// forward gap. Wraps past the end of the loop.
    fn ahead(
        &self,
        lane: LaneIndex,
        position: f32,
        exclude: AgentId,
    ) -> impl Iterator<Item = (f32, &AgentSnapshot)> {
        let key = OrderedFloat(position);
        let map = self.lanes.get(lane);
        let after = map
            .into_iter()
            .flat_map(move |m| m.range((Bound::Excluded(key), Bound::Unbounded)));
        let wrapped = map
            .into_iter()
            .flat_map(move |m| m.range((Bound::Unbounded, Bound::Included(key))));
        after
            .chain(wrapped)
            .flat_map(|(_, agents)| agents.iter())
            .filter(move |other| other.id != exclude)
            .map(move |other| (forward_gap(position, other.position), other))
            .filter(|(gap, _)| *gap > 0.0)
    }

    /// Count, average speed, and nearest distance of the agents strictly
    /// within `look_ahead` in front of `agent` in `lane`.
    ///
    /// With nobody ahead, `nearest_distance` is the horizon itself and
    /// `avg_speed` is 1.5x the agent's own speed (an open road).
    pub fn sense_ahead(
        &self,
        agent: &AgentSnapshot,
        look_ahead: f32,
        lane: LaneIndex,
    ) -> TrafficAhead {
        let mut count = 0;
        let mut total_speed = 0.0;
        let mut nearest = look_ahead;

        for (gap, other) in self
            .ahead(lane, agent.position, agent.id)
            .take_while(|(gap, _)| *gap < look_ahead)
        {
            count += 1;
            total_speed += other.speed;
            nearest = nearest.min(gap);
        }

        let avg_speed = if count > 0 {
            total_speed / count as f32
        } else {
            agent.speed * 1.5
        };

        TrafficAhead {
            count,
            avg_speed,
            nearest_distance: nearest,
        }
    }

    /// Nearest agent ahead in `lane` within `horizon`
    pub fn leader(&self, agent: &AgentSnapshot, lane: LaneIndex, horizon: f32) -> Option<Leader> {
        self.ahead(lane, agent.position, agent.id)
            .next()
            .filter(|(gap, _)| *gap < horizon)
            .map(|(gap, other)| Leader {
                id: other.id,
                gap,
                speed: other.speed,
            })
    }

    /// Whether `agent` can merge into `target_lane`: nothing within `front`
    /// ahead, no faster vehicle within `rear` behind, and nobody alongside.
    pub fn is_lane_change_safe(
        &self,
        agent: &AgentSnapshot,
        target_lane: LaneIndex,
        front: f32,
        rear: f32,
    ) -> bool {
        self.occupants(target_lane)
            .filter(|other| other.id != agent.id)
            .all(|other| {
                let gap = signed_gap(agent.position, other.position);
                if gap.abs() < MIN_STANDSTILL_GAP {
                    false
                } else if gap > 0.0 {
                    gap >= front
                } else {
                    gap <= -rear || other.speed <= agent.speed
                }
            })
    }

    /// Smallest distance, either direction, to anyone in `lane`
    pub fn clearance(&self, agent: &AgentSnapshot, lane: LaneIndex) -> f32 {
        self.occupants(lane)
            .filter(|other| other.id != agent.id)
            .map(|other| signed_gap(agent.position, other.position).abs())
            .fold(f32::INFINITY, f32::min)
    }

    /// Whether another agent within `window` of `agent` is mid-transition
    pub fn transition_nearby(&self, agent: &AgentSnapshot, window: f32) -> bool {
        self.agents.values().any(|other| {
            other.id != agent.id
                && other.is_transitioning()
                && signed_gap(agent.position, other.position).abs() < window
        })
    }

    /// Number of cars currently mid-transition
    pub fn cars_transitioning(&self) -> usize {
        self.agents
            .values()
            .filter(|a| !a.id.is_bus() && a.is_transitioning())
            .count()
    }

    /// Number of cars on the circuit
    pub fn car_count(&self) -> usize {
        self.agents.values().filter(|a| !a.id.is_bus()).count()
    }
}
