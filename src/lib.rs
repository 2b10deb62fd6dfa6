pub use agent::{Agent, AgentState, AgentUpdate, RouteAgentController, SpeedFactor};
pub use clock::Scheduler;
pub use config::{AgentConfig, ProviderConfig, SamplerConfig, SimulationConfig};
pub use geo::LatLng;
pub use light::{LightState, LightTimings, TrafficLight, TrafficLightSimulator};
pub use provider::{plan_route, Geocoder, Place, PlannedRoute, Router};
pub use render::{MarkerId, RecordingSink, RenderCommand, RenderSink};
pub use route::{Route, RouteSummary};
pub use sampler::{Intersection, IntersectionSampler};
pub use session::{SimulationSession, TimerEvent};
use slotmap::new_key_type;
pub use slotmap::{Key, KeyData};
pub use util::Interval;

mod agent;
mod clock;
mod config;
pub mod geo;
mod light;
pub mod provider;
mod render;
mod route;
mod sampler;
mod session;
mod util;

new_key_type! {
    /// Unique ID of an [Intersection] and its [TrafficLight].
    pub struct IntersectionId;
    /// Unique ID of an [Agent].
    pub struct AgentId;
    /// Unique ID of a timer scheduled on a [Scheduler].
    pub struct TimerId;
}
