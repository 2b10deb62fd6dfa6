//! Tunable parameters of the simulation.

use crate::geo::LatLng;
use crate::light::LightTimings;
use crate::util::Interval;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The range the agent tick interval is clamped to, in ms.
pub const AGENT_TICK_RANGE_MS: Interval<u64> = Interval::new(100, 200);

/// The range of base speeds offered to the user, in km/h.
pub const BASE_SPEED_RANGE_KMH: Interval<f64> = Interval::new(20.0, 120.0);

/// All the parameters of a simulation session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Intersection placement.
    pub sampler: SamplerConfig,
    /// Traffic light dwell times.
    pub lights: LightTimings,
    /// Agent movement and signal response.
    pub agent: AgentConfig,
    /// Geocoding and routing fallbacks.
    pub provider: ProviderConfig,
    /// Seed for the random number generator. Uses entropy when absent.
    pub seed: Option<u64>,
}

/// Parameters of the intersection sampler.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// The target average spacing between intersections in m.
    pub spacing_m: f64,
    /// The minimum and maximum number of intersections per route.
    pub count: Interval<usize>,
}

/// Parameters of the route agent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Lights within this distance of the agent affect it, in m.
    pub stopping_distance_m: f64,
    /// The interval between movement ticks in ms.
    pub tick_ms: u64,
    /// The speed multiplier applied while slowing for a yellow light.
    pub slow_factor: f64,
    /// How long the agent stays slow after seeing a yellow light, in ms.
    pub slow_dwell_ms: u64,
    /// How often a stopped agent checks whether it may proceed, in ms.
    pub stopped_recheck_ms: u64,
    /// The base speed used when none is given, in km/h.
    pub default_speed_kmh: f64,
    /// How far the agent moves per tick at `reference_speed_kmh`, in waypoints.
    pub waypoints_per_tick: f64,
    /// The base speed at which the agent moves `waypoints_per_tick`, in km/h.
    pub reference_speed_kmh: f64,
}

/// Parameters of the geocoding and routing boundary.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// How long to wait for an upstream service before falling back, in ms.
    pub timeout_ms: u64,
    /// Used when the origin cannot be geocoded.
    pub default_from: LatLng,
    /// Used when the destination cannot be geocoded.
    pub default_to: LatLng,
}

impl SimulationConfig {
    /// Parses a configuration from JSON. Missing fields take their default values.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        config.agent = config.agent.validated();
        Ok(config)
    }

    /// The agent tick interval, clamped to the supported range.
    pub fn agent_tick(&self) -> u64 {
        AGENT_TICK_RANGE_MS.clamp(self.agent.tick_ms)
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            spacing_m: 650.0,
            count: Interval::new(3, 12),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            stopping_distance_m: 60.0,
            tick_ms: 150,
            slow_factor: 0.5,
            slow_dwell_ms: 3000,
            stopped_recheck_ms: 1000,
            default_speed_kmh: 50.0,
            waypoints_per_tick: 0.04,
            reference_speed_kmh: 50.0,
        }
    }
}

impl AgentConfig {
    /// Brings every parameter into its usable range. The slow factor is clamped to
    /// `[0, 1]`; other non-finite or negative values fall back to their defaults.
    pub fn validated(self) -> Self {
        let defaults = Self::default();
        let positive = |value: f64, default: f64| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                default
            }
        };
        let slow_factor = if self.slow_factor.is_nan() {
            defaults.slow_factor
        } else {
            self.slow_factor.clamp(0.0, 1.0)
        };
        let stopping_distance_m = if self.stopping_distance_m >= 0.0 {
            self.stopping_distance_m
        } else {
            defaults.stopping_distance_m
        };
        Self {
            stopping_distance_m,
            slow_factor,
            default_speed_kmh: positive(self.default_speed_kmh, defaults.default_speed_kmh),
            waypoints_per_tick: positive(self.waypoints_per_tick, defaults.waypoints_per_tick),
            reference_speed_kmh: positive(self.reference_speed_kmh, defaults.reference_speed_kmh),
            ..self
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 8000,
            default_from: LatLng::new(28.6139, 77.2090),
            default_to: LatLng::new(28.5355, 77.3910),
        }
    }
}

impl ProviderConfig {
    /// The upstream timeout as a [Duration].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            SimulationConfig::from_json(r#"{ "agent": { "tick_ms": 500 }, "seed": 42 }"#).unwrap();
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.agent.tick_ms, 500);
        assert_eq!(config.agent.stopping_distance_m, 60.0);
        assert_eq!(config.sampler, SamplerConfig::default());
        assert_eq!(config.agent_tick(), 200);
    }

    #[test]
    fn empty_json_is_default() {
        assert_eq!(
            SimulationConfig::from_json("{}").unwrap(),
            SimulationConfig::default()
        );
    }

    #[test]
    fn out_of_range_agent_parameters() {
        let config = SimulationConfig::from_json(r#"{ "agent": { "slow_factor": -0.5 } }"#).unwrap();
        assert_eq!(config.agent.slow_factor, 0.0);
        let config = SimulationConfig::from_json(r#"{ "agent": { "slow_factor": 3 } }"#).unwrap();
        assert_eq!(config.agent.slow_factor, 1.0);

        let agent = AgentConfig {
            slow_factor: f64::NAN,
            waypoints_per_tick: -1.0,
            reference_speed_kmh: 0.0,
            default_speed_kmh: f64::INFINITY,
            stopping_distance_m: f64::NAN,
            ..Default::default()
        }
        .validated();
        assert_eq!(agent, AgentConfig::default());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(SimulationConfig::from_json(r#"{ "seed": "abc" }"#).is_err());
    }
}
