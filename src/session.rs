use crate::agent::{Agent, RouteAgentController};
use crate::clock::Scheduler;
use crate::config::SimulationConfig;
use crate::light::{LightState, TrafficLight, TrafficLightSimulator};
use crate::render::{MarkerId, RenderSink};
use crate::route::Route;
use crate::sampler::{Intersection, IntersectionSampler};
use crate::{AgentId, IntersectionId, TimerId};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// The cadence of the traffic lights in ms.
const LIGHT_TICK_MS: u64 = 1000;

/// An event delivered by the session's scheduler.
///
/// Every event carries the generation of the session that scheduled it, and is
/// ignored if the session has since been stopped or given a new route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    /// Advance every traffic light by one second.
    LightTick { generation: u64 },
    /// Move an agent.
    AgentTick { generation: u64, agent: AgentId },
    /// End an agent's yellow light slowdown.
    SlowDwell { generation: u64, agent: AgentId },
    /// Check whether a stopped agent may proceed.
    StoppedRecheck { generation: u64, agent: AgentId },
}

/// One displayed route with its traffic lights and animated car.
///
/// The session owns every light, agent and timer of the simulation. Loading a new
/// route or stopping the session tears all of them down and starts a new
/// generation, so nothing scheduled for the old route can affect the new one.
pub struct SimulationSession<S: RenderSink> {
    /// The configuration.
    config: SimulationConfig,
    /// Identifies the current set of lights, agent and timers.
    generation: u64,
    /// The displayed route.
    route: Option<Route>,
    /// The intersections along the displayed route.
    intersections: Vec<Intersection>,
    /// Places the intersections.
    sampler: IntersectionSampler,
    /// The traffic lights.
    lights: TrafficLightSimulator,
    /// The repeating traffic light timer.
    light_timer: Option<TimerId>,
    /// The animated agents.
    agents: RouteAgentController,
    /// The currently animated agent.
    agent: Option<AgentId>,
    /// The virtual clock.
    scheduler: Scheduler<TimerEvent>,
    /// Drives the traffic lights.
    rng: StdRng,
    /// Receives drawing commands.
    sink: S,
}

impl TimerEvent {
    /// The generation that scheduled the event.
    pub fn generation(&self) -> u64 {
        match *self {
            TimerEvent::LightTick { generation }
            | TimerEvent::AgentTick { generation, .. }
            | TimerEvent::SlowDwell { generation, .. }
            | TimerEvent::StoppedRecheck { generation, .. } => generation,
        }
    }
}

impl<S: RenderSink> SimulationSession<S> {
    /// Creates an idle session.
    pub fn new(config: SimulationConfig, sink: S) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            sampler: IntersectionSampler::new(config.sampler),
            lights: TrafficLightSimulator::new(config.lights),
            agents: RouteAgentController::new(config.agent, config.agent_tick()),
            config,
            generation: 0,
            route: None,
            intersections: vec![],
            light_timer: None,
            agent: None,
            scheduler: Scheduler::new(),
            rng,
            sink,
        }
    }

    /// Displays a route and starts its traffic lights, replacing whatever was shown before.
    pub fn load_route(&mut self, route: Route) -> &[Intersection] {
        self.stop();

        self.sink.draw_route(&route);
        self.intersections = self.sampler.sample(&route);
        for id in self.lights.start(&self.intersections, &mut self.rng) {
            if let Some(light) = self.lights.get_state(id) {
                self.sink.set_light(id, light);
            }
        }
        if !self.lights.is_empty() {
            let event = TimerEvent::LightTick {
                generation: self.generation,
            };
            self.light_timer = Some(self.scheduler.repeat(LIGHT_TICK_MS, event));
        }

        log::debug!(
            "Generation {}: loaded route with {} waypoints and {} lights",
            self.generation,
            route.len(),
            self.lights.len()
        );
        self.route = Some(route);
        &self.intersections
    }

    /// Starts animating a car along the route, replacing any running animation.
    /// Uses the configured default speed when `speed_kmh` is `None`.
    ///
    /// Without a usable route the animation completes immediately and `None` is returned.
    pub fn start_animation(&mut self, speed_kmh: Option<f64>) -> Option<AgentId> {
        self.stop_animation();
        let speed_kmh = speed_kmh.unwrap_or(self.config.agent.default_speed_kmh);
        let empty = Route::from_points(vec![]);
        let route = self.route.as_ref().unwrap_or(&empty);
        self.agent = self.agents.start_animation(
            route,
            speed_kmh,
            self.generation,
            &mut self.scheduler,
            &mut self.sink,
        );
        self.agent
    }

    /// Stops the running animation, if there is one. The traffic lights keep running.
    pub fn stop_animation(&mut self) {
        if let Some(id) = self.agent.take() {
            self.agents.stop(id, &mut self.scheduler, &mut self.sink);
        }
    }

    /// Changes the speed of the running animation.
    pub fn set_speed(&mut self, speed_kmh: f64) -> bool {
        match self.agent {
            Some(id) => self.agents.set_base_speed(id, speed_kmh),
            None => false,
        }
    }

    /// Tears down the route, lights and animation and cancels every timer.
    /// Safe to call any number of times.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.stop_animation();
        self.agents.stop_all(&mut self.scheduler, &mut self.sink);
        if let Some(timer) = self.light_timer.take() {
            self.scheduler.cancel(timer);
        }
        for (id, _) in self.lights.iter() {
            self.sink.remove_marker(MarkerId::Light(id));
        }
        self.lights.stop();
        self.intersections.clear();
        if self.route.take().is_some() {
            self.sink.clear_route();
        }
        self.scheduler.cancel_all();
    }

    /// Advances virtual time by `dt_ms`, handling every timer that falls due.
    pub fn advance(&mut self, dt_ms: u64) {
        let until = self.scheduler.now() + dt_ms;
        while let Some((_, event)) = self.scheduler.pop_due(until) {
            self.dispatch(event);
        }
        self.scheduler.settle(until);
    }

    /// Handles one timer event.
    fn dispatch(&mut self, event: TimerEvent) {
        if event.generation() != self.generation {
            log::trace!("Ignoring {:?} from an old generation", event);
            return;
        }
        let route = match &self.route {
            Some(route) => route,
            None => return,
        };

        match event {
            TimerEvent::LightTick { .. } => {
                for id in self.lights.step(&mut self.rng) {
                    if let Some(light) = self.lights.get_state(id) {
                        self.sink.set_light(id, light);
                    }
                }
            }
            TimerEvent::AgentTick { agent, .. } => {
                self.agents.tick(
                    agent,
                    route,
                    &self.lights,
                    self.generation,
                    &mut self.scheduler,
                    &mut self.sink,
                );
                if self.agent == Some(agent) && self.agents.get(agent).is_none() {
                    self.agent = None;
                }
            }
            TimerEvent::SlowDwell { agent, .. } => self.agents.end_slowdown(agent),
            TimerEvent::StoppedRecheck { agent, .. } => self.agents.recheck(
                agent,
                route,
                &self.lights,
                self.generation,
                &mut self.scheduler,
            ),
        }
    }

    /// Overrides the state of a traffic light.
    pub fn force_light(&mut self, id: IntersectionId, state: LightState, remaining: u32) -> bool {
        if !self.lights.force_state(id, state, remaining) {
            return false;
        }
        if let Some(light) = self.lights.get_state(id) {
            self.sink.set_light(id, light);
        }
        true
    }

    /// The configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The current virtual time in ms.
    pub fn now(&self) -> u64 {
        self.scheduler.now()
    }

    /// The number of pending timers.
    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    /// The displayed route.
    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    /// The intersections along the displayed route.
    pub fn intersections(&self) -> &[Intersection] {
        &self.intersections
    }

    /// Gets the traffic light at an intersection.
    pub fn light(&self, id: IntersectionId) -> Option<&TrafficLight> {
        self.lights.get_state(id)
    }

    /// Returns an iterator over the traffic lights.
    pub fn lights(&self) -> impl Iterator<Item = (IntersectionId, &TrafficLight)> {
        self.lights.iter()
    }

    /// The currently animated agent.
    pub fn agent(&self) -> Option<&Agent> {
        self.agent.and_then(|id| self.agents.get(id))
    }

    /// The render sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The render sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

impl<S: RenderSink> Drop for SimulationSession<S> {
    fn drop(&mut self) {
        self.stop();
    }
}
