use crate::clock::Scheduler;
use crate::config::{AgentConfig, BASE_SPEED_RANGE_KMH};
use crate::geo::LatLng;
use crate::light::{LightState, TrafficLightSimulator};
use crate::render::{MarkerId, RenderSink};
use crate::route::Route;
use crate::session::TimerEvent;
use crate::{AgentId, TimerId};
use slotmap::SlotMap;

/// The movement state of an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentState {
    MovingNormal,
    MovingSlow,
    Stopped,
    Completed,
}

/// The speed multiplier selected by an agent's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpeedFactor {
    Stopped,
    Slow,
    Normal,
}

/// A simulated vehicle driving along a route.
#[derive(Clone, Debug)]
pub struct Agent {
    /// The agent's ID.
    id: AgentId,
    /// The position along the route as a progress value.
    progress: f64,
    /// The current state.
    state: AgentState,
    /// The heading in degrees clockwise from north.
    heading: f64,
    /// The base speed in km/h.
    speed_kmh: f64,
    /// The repeating movement timer.
    tick_timer: Option<TimerId>,
    /// The pending end of a yellow light slowdown.
    slow_timer: Option<TimerId>,
    /// The pending check of whether a stopped agent may proceed.
    recheck_timer: Option<TimerId>,
}

/// The position and heading of an agent, sent to the map layer every tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgentUpdate {
    pub position: LatLng,
    pub heading: f64,
    pub progress: f64,
    pub state: AgentState,
}

/// Animates agents along a route, reacting to nearby traffic lights.
///
/// Agents move in waypoint steps: at the reference speed an agent advances
/// `waypoints_per_tick` of a route segment per tick, so dense routes are driven
/// slowly and sparse ones quickly, whatever their length in metres.
///
/// A session drives at most one agent at a time, but stale agent IDs are handled
/// gracefully: every operation on an unknown agent does nothing.
pub struct RouteAgentController {
    /// The movement parameters.
    config: AgentConfig,
    /// The movement tick interval in ms.
    tick_ms: u64,
    /// The active agents.
    agents: SlotMap<AgentId, Agent>,
}

impl AgentState {
    /// The speed multiplier selected by the state.
    pub fn speed_factor(self) -> SpeedFactor {
        match self {
            AgentState::MovingNormal => SpeedFactor::Normal,
            AgentState::MovingSlow => SpeedFactor::Slow,
            AgentState::Stopped | AgentState::Completed => SpeedFactor::Stopped,
        }
    }

    /// The state an agent moves into on a movement tick, given the most
    /// restrictive light within stopping distance.
    ///
    /// A stopped agent never starts moving here; only its periodic re-check can release it.
    pub fn respond_to(self, signal: Option<LightState>) -> AgentState {
        use AgentState::*;
        match (self, signal) {
            (Stopped, _) | (Completed, _) => self,
            (_, Some(LightState::Red)) => Stopped,
            (MovingNormal, Some(LightState::Yellow)) => MovingSlow,
            (MovingSlow, Some(LightState::Yellow)) => MovingSlow,
            (_, Some(LightState::Green)) | (_, None) => MovingNormal,
        }
    }
}

impl Agent {
    fn new(id: AgentId, speed_kmh: f64, route: &Route) -> Self {
        Self {
            id,
            progress: 0.0,
            state: AgentState::MovingNormal,
            heading: route.heading_at(0.0),
            speed_kmh,
            tick_timer: None,
            slow_timer: None,
            recheck_timer: None,
        }
    }

    /// Gets the agent's ID.
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// The position along the route as a progress value.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// The current state.
    pub fn state(&self) -> AgentState {
        self.state
    }

    /// The heading in degrees clockwise from north.
    pub fn heading(&self) -> f64 {
        self.heading
    }

    /// The base speed in km/h.
    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }

    /// The snapshot sent to the map layer.
    pub fn update(&self, route: &Route) -> AgentUpdate {
        AgentUpdate {
            position: route.position_at(self.progress),
            heading: self.heading,
            progress: self.progress,
            state: self.state,
        }
    }

    /// The progress covered in one tick at the current state, in waypoints.
    fn step(&self, config: &AgentConfig) -> f64 {
        let multiplier = match self.state.speed_factor() {
            SpeedFactor::Normal => 1.0,
            SpeedFactor::Slow => config.slow_factor,
            SpeedFactor::Stopped => 0.0,
        };
        config.waypoints_per_tick * self.speed_kmh / config.reference_speed_kmh * multiplier
    }

    /// Cancels every pending timer of the agent.
    fn cancel_timers(&mut self, scheduler: &mut Scheduler<TimerEvent>) {
        for timer in [
            self.tick_timer.take(),
            self.slow_timer.take(),
            self.recheck_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            scheduler.cancel(timer);
        }
    }
}

impl Default for RouteAgentController {
    fn default() -> Self {
        let config = AgentConfig::default();
        Self::new(config, config.tick_ms)
    }
}

/// Clamps a requested base speed to the supported range. Non-finite speeds are rejected.
fn base_speed(speed_kmh: f64) -> Option<f64> {
    speed_kmh
        .is_finite()
        .then(|| BASE_SPEED_RANGE_KMH.clamp(speed_kmh))
}

impl RouteAgentController {
    /// Creates a controller with no agents.
    pub fn new(config: AgentConfig, tick_ms: u64) -> Self {
        Self {
            config: config.validated(),
            tick_ms: tick_ms.max(1),
            agents: SlotMap::with_key(),
        }
    }

    /// Gets the agent with the given ID, if it is still active.
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Returns an iterator over the active agents.
    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Starts animating a new agent from the start of the route.
    ///
    /// Routes with fewer than two waypoints complete immediately and yield no agent.
    pub fn start_animation(
        &mut self,
        route: &Route,
        speed_kmh: f64,
        generation: u64,
        scheduler: &mut Scheduler<TimerEvent>,
        sink: &mut impl RenderSink,
    ) -> Option<AgentId> {
        if route.is_degenerate() {
            log::debug!("Route has {} waypoints; nothing to animate", route.len());
            sink.animation_complete(None);
            return None;
        }

        let speed_kmh = base_speed(speed_kmh).unwrap_or_else(|| {
            log::warn!("Ignoring base speed {}, using the default", speed_kmh);
            BASE_SPEED_RANGE_KMH.clamp(self.config.default_speed_kmh)
        });
        let id = self
            .agents
            .insert_with_key(|id| Agent::new(id, speed_kmh, route));
        let tick = scheduler.repeat(self.tick_ms, TimerEvent::AgentTick { generation, agent: id });

        let agent = &mut self.agents[id];
        agent.tick_timer = Some(tick);
        sink.set_agent(id, &agent.update(route));
        log::debug!("Agent {:?} started at {} km/h", id, speed_kmh);
        Some(id)
    }

    /// Changes the base speed of an agent. The speed is clamped to the supported range.
    /// Returns `false` for unknown agents and non-finite speeds.
    pub fn set_base_speed(&mut self, id: AgentId, speed_kmh: f64) -> bool {
        match (self.agents.get_mut(id), base_speed(speed_kmh)) {
            (Some(agent), Some(speed_kmh)) => {
                agent.speed_kmh = speed_kmh;
                true
            }
            _ => false,
        }
    }

    /// Stops an agent, cancelling its timers and removing its marker.
    /// Stopping an unknown agent does nothing.
    pub fn stop(
        &mut self,
        id: AgentId,
        scheduler: &mut Scheduler<TimerEvent>,
        sink: &mut impl RenderSink,
    ) {
        if let Some(mut agent) = self.agents.remove(id) {
            agent.cancel_timers(scheduler);
            sink.remove_marker(MarkerId::Agent(id));
            log::debug!("Agent {:?} stopped at {:.3}", id, agent.progress);
        }
    }

    /// Stops every agent.
    pub fn stop_all(&mut self, scheduler: &mut Scheduler<TimerEvent>, sink: &mut impl RenderSink) {
        let ids = self.agents.keys().collect::<Vec<_>>();
        for id in ids {
            self.stop(id, scheduler, sink);
        }
    }

    /// Advances an agent by one movement tick.
    pub fn tick(
        &mut self,
        id: AgentId,
        route: &Route,
        lights: &TrafficLightSimulator,
        generation: u64,
        scheduler: &mut Scheduler<TimerEvent>,
        sink: &mut impl RenderSink,
    ) {
        let config = self.config;
        let agent = match self.agents.get_mut(id) {
            Some(agent) if agent.state != AgentState::Completed => agent,
            _ => return,
        };

        // React to the lights around the current position
        let position = route.position_at(agent.progress);
        let signal = lights.governing_state(position, config.stopping_distance_m);
        let next = agent.state.respond_to(signal);
        if next != agent.state {
            log::info!(
                "Agent {:?}: {:?} -> {:?} ({:?} light nearby)",
                id,
                agent.state,
                next,
                signal
            );
            match next {
                AgentState::Stopped => {
                    if let Some(timer) = agent.slow_timer.take() {
                        scheduler.cancel(timer);
                    }
                    let event = TimerEvent::StoppedRecheck { generation, agent: id };
                    agent.recheck_timer = Some(scheduler.once(config.stopped_recheck_ms, event));
                }
                AgentState::MovingSlow => {
                    let event = TimerEvent::SlowDwell { generation, agent: id };
                    agent.slow_timer = Some(scheduler.once(config.slow_dwell_ms, event));
                }
                AgentState::MovingNormal => {
                    if let Some(timer) = agent.slow_timer.take() {
                        scheduler.cancel(timer);
                    }
                }
                AgentState::Completed => {}
            }
            agent.state = next;
        }

        // Move
        let step = agent.step(&config);
        if step > 0.0 {
            agent.progress = route.clamp_progress(agent.progress + step);
        }
        agent.heading = route.heading_at(agent.progress);

        if agent.progress >= route.last_index() as f64 {
            agent.progress = route.last_index() as f64;
            agent.state = AgentState::Completed;
        }
        sink.set_agent(id, &agent.update(route));

        if agent.state == AgentState::Completed {
            log::info!("Agent {:?} reached the end of the route", id);
            self.stop(id, scheduler, sink);
            sink.animation_complete(Some(id));
        }
    }

    /// Checks whether a stopped agent may proceed, and schedules another check if not.
    pub fn recheck(
        &mut self,
        id: AgentId,
        route: &Route,
        lights: &TrafficLightSimulator,
        generation: u64,
        scheduler: &mut Scheduler<TimerEvent>,
    ) {
        let config = self.config;
        let Some(agent) = self.agents.get_mut(id) else {
            return;
        };
        agent.recheck_timer = None;
        if agent.state != AgentState::Stopped {
            return;
        }

        let position = route.position_at(agent.progress);
        match lights.governing_state(position, config.stopping_distance_m) {
            Some(LightState::Red) => {
                let event = TimerEvent::StoppedRecheck { generation, agent: id };
                agent.recheck_timer = Some(scheduler.once(config.stopped_recheck_ms, event));
            }
            signal => {
                log::info!("Agent {:?}: proceeding ({:?} light nearby)", id, signal);
                agent.state = AgentState::MovingNormal;
            }
        }
    }

    /// Ends the slowdown of an agent which slowed for a yellow light.
    pub fn end_slowdown(&mut self, id: AgentId) {
        if let Some(agent) = self.agents.get_mut(id) {
            agent.slow_timer = None;
            if agent.state == AgentState::MovingSlow {
                log::debug!("Agent {:?}: resuming normal speed", id);
                agent.state = AgentState::MovingNormal;
            }
        }
    }
}
