//! The boundary to the map layer.

use crate::agent::AgentUpdate;
use crate::light::{LightState, TrafficLight};
use crate::route::Route;
use crate::{AgentId, IntersectionId};

/// Identifies a marker drawn on the map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MarkerId {
    Light(IntersectionId),
    Agent(AgentId),
}

/// Receives drawing commands and notifications from a simulation session.
///
/// The sink is write-only: the simulation never reads anything back from it.
/// Every method defaults to doing nothing.
pub trait RenderSink {
    /// Draws the route polyline, replacing any previous one.
    fn draw_route(&mut self, _route: &Route) {}

    /// Removes the route polyline.
    fn clear_route(&mut self) {}

    /// Creates or updates the marker of a traffic light. Called whenever the
    /// colour or countdown of the light changes.
    fn set_light(&mut self, _id: IntersectionId, _light: &TrafficLight) {}

    /// Creates or updates the marker of the agent. Called on every agent tick.
    fn set_agent(&mut self, _id: AgentId, _update: &AgentUpdate) {}

    /// Removes a marker.
    fn remove_marker(&mut self, _marker: MarkerId) {}

    /// Called once when an animation finishes, or immediately if it could not start.
    fn animation_complete(&mut self, _id: Option<AgentId>) {}
}

/// A drawing command, as recorded by [RecordingSink].
#[derive(Clone, Debug, PartialEq)]
pub enum RenderCommand {
    DrawRoute { points: usize },
    ClearRoute,
    SetLight {
        id: IntersectionId,
        state: LightState,
        remaining: u32,
    },
    SetAgent {
        id: AgentId,
        update: AgentUpdate,
    },
    RemoveMarker(MarkerId),
    AnimationComplete(Option<AgentId>),
}

/// A sink which records every command it receives.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    commands: Vec<RenderCommand>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Default::default()
    }

    /// The recorded commands, oldest first.
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    /// Removes and returns the recorded commands.
    pub fn take(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.commands)
    }

    /// The agent updates received so far.
    pub fn agent_updates(&self) -> impl Iterator<Item = &AgentUpdate> {
        self.commands.iter().filter_map(|cmd| match cmd {
            RenderCommand::SetAgent { update, .. } => Some(update),
            _ => None,
        })
    }

    /// How many times an animation has completed.
    pub fn completions(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| matches!(cmd, RenderCommand::AnimationComplete(_)))
            .count()
    }
}

impl RenderSink for RecordingSink {
    fn draw_route(&mut self, route: &Route) {
        self.commands.push(RenderCommand::DrawRoute {
            points: route.len(),
        });
    }

    fn clear_route(&mut self) {
        self.commands.push(RenderCommand::ClearRoute);
    }

    fn set_light(&mut self, id: IntersectionId, light: &TrafficLight) {
        self.commands.push(RenderCommand::SetLight {
            id,
            state: light.state(),
            remaining: light.remaining_seconds(),
        });
    }

    fn set_agent(&mut self, id: AgentId, update: &AgentUpdate) {
        self.commands.push(RenderCommand::SetAgent {
            id,
            update: *update,
        });
    }

    fn remove_marker(&mut self, marker: MarkerId) {
        self.commands.push(RenderCommand::RemoveMarker(marker));
    }

    fn animation_complete(&mut self, id: Option<AgentId>) {
        self.commands.push(RenderCommand::AnimationComplete(id));
    }
}
