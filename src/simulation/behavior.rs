//! Driver behavior profiles
//!
//! A profile is fixed when a car spawns and decides how the car follows,
//! scores lanes, and how eager it is to change lanes.

use rand::Rng;

/// Driver temperament
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverBehavior {
    Polite,
    Neutral,
    Aggressive,
}

/// Parameters that follow from a [`DriverBehavior`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BehaviorParams {
    /// Chance per second of considering a lane change in free traffic
    pub lane_change_propensity: f32,
    /// Multiplier on the sampled desired speed
    pub speed_multiplier: f32,
    /// Base post-change cooldown in ms
    pub cooldown_ms: f32,
    /// Time to complete a lane change in ms
    pub transition_ms: f32,
    /// Nothing in the target lane may be this close ahead
    pub front_safe_distance: f32,
    /// No faster vehicle may be this close behind in the target lane
    pub rear_safe_distance: f32,
    /// Score margin the best lane needs over the current one
    pub improvement_threshold: f32,
}

impl DriverBehavior {
    pub const ALL: [DriverBehavior; 3] = [
        DriverBehavior::Polite,
        DriverBehavior::Neutral,
        DriverBehavior::Aggressive,
    ];

    pub fn params(&self) -> BehaviorParams {
        match self {
            DriverBehavior::Polite => BehaviorParams {
                lane_change_propensity: 0.05,
                speed_multiplier: 0.85,
                cooldown_ms: 6000.0,
                transition_ms: 1800.0,
                front_safe_distance: 0.05,
                rear_safe_distance: 0.04,
                improvement_threshold: 1.0,
            },
            DriverBehavior::Neutral => BehaviorParams {
                lane_change_propensity: 0.3,
                speed_multiplier: 0.95,
                cooldown_ms: 4000.0,
                transition_ms: 1500.0,
                front_safe_distance: 0.03,
                rear_safe_distance: 0.02,
                improvement_threshold: 0.5,
            },
            DriverBehavior::Aggressive => BehaviorParams {
                lane_change_propensity: 0.6,
                speed_multiplier: 1.1,
                cooldown_ms: 3000.0,
                transition_ms: 1200.0,
                front_safe_distance: 0.02,
                rear_safe_distance: 0.01,
                improvement_threshold: 0.2,
            },
        }
    }

    /// Draw a profile with the 30/50/20 polite/neutral/aggressive mix
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let roll: f32 = rng.random();
        if roll < 0.3 {
            DriverBehavior::Polite
        } else if roll < 0.8 {
            DriverBehavior::Neutral
        } else {
            DriverBehavior::Aggressive
        }
    }

    /// Lane score adjusted for this temperament.
    ///
    /// `preferred` is whether the scored lane is the one the driver spawned in.
    pub fn lane_score(&self, count: usize, avg_speed: f32, nearest: f32, preferred: bool) -> f32 {
        let count = count as f32;
        let mut score = 5.0 * nearest - 0.5 * count + 2.0 * avg_speed;

        match self {
            DriverBehavior::Aggressive => {
                score += avg_speed * 2.0;
                score -= (1.0 - nearest) * 0.3;
                score -= count * 0.3;
            }
            DriverBehavior::Polite => {
                score += nearest * 3.0;
                score += avg_speed * 0.5;
                score -= count * 0.7;
                if preferred {
                    score += 2.0;
                }
            }
            DriverBehavior::Neutral => {
                score += nearest * 2.0;
                score += avg_speed;
                score -= count * 0.5;
                if preferred {
                    score += 1.0;
                }
            }
        }

        score
    }
}
