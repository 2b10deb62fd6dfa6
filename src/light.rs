use crate::geo::LatLng;
use crate::sampler::Intersection;
use crate::util::Interval;
use crate::IntersectionId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use smallvec::SmallVec;

/// The state of a traffic light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightState {
    Red,
    Yellow,
    Green,
}

/// The dwell time ranges of the traffic lights, in whole seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightTimings {
    /// The countdown range used once, when a light is first created, whatever its colour.
    ///
    /// This is wider than the steady-state ranges: a red light can start with 5 s left
    /// and a yellow one with 35 s.
    pub initial: Interval<u32>,
    /// How long a light stays red.
    pub red: Interval<u32>,
    /// How long a light stays yellow.
    pub yellow: Interval<u32>,
    /// How long a light stays green.
    pub green: Interval<u32>,
}

/// A simulated traffic light sitting at a synthetic intersection.
#[derive(Clone, Debug, PartialEq)]
pub struct TrafficLight {
    /// The intersection the light controls.
    intersection: Intersection,
    /// The current state.
    state: LightState,
    /// Seconds until the next transition.
    remaining: u32,
}

/// Runs the traffic lights of one route.
///
/// Each light counts down once per second and cycles red, green, yellow, red.
/// All lights share a single one second clock, which behaves exactly like
/// independent per-light timers started at the same instant.
#[derive(Default)]
pub struct TrafficLightSimulator {
    /// The dwell times.
    timings: LightTimings,
    /// The active lights, keyed by intersection.
    lights: SlotMap<IntersectionId, TrafficLight>,
}

impl LightState {
    /// All states, in no particular order.
    pub const ALL: [LightState; 3] = [LightState::Red, LightState::Yellow, LightState::Green];

    /// The state that follows this one.
    pub fn next(self) -> Self {
        match self {
            LightState::Red => LightState::Green,
            LightState::Green => LightState::Yellow,
            LightState::Yellow => LightState::Red,
        }
    }

    /// How restrictive the state is for an approaching vehicle. Higher is stricter.
    pub fn severity(self) -> u8 {
        match self {
            LightState::Green => 0,
            LightState::Yellow => 1,
            LightState::Red => 2,
        }
    }
}

impl Default for LightTimings {
    fn default() -> Self {
        Self {
            initial: Interval::new(5, 35),
            red: Interval::new(20, 35),
            yellow: Interval::new(3, 5),
            green: Interval::new(15, 25),
        }
    }
}

impl LightTimings {
    /// The steady-state dwell range of a state.
    pub fn range(&self, state: LightState) -> Interval<u32> {
        match state {
            LightState::Red => self.red,
            LightState::Yellow => self.yellow,
            LightState::Green => self.green,
        }
    }
}

impl TrafficLight {
    /// Creates a light with a random state and warm-up countdown.
    fn new(intersection: Intersection, timings: &LightTimings, rng: &mut impl Rng) -> Self {
        let state = LightState::ALL[rng.gen_range(0..LightState::ALL.len())];
        Self {
            intersection,
            state,
            remaining: timings.initial.sample(rng).max(1),
        }
    }

    /// The intersection the light controls.
    pub fn intersection(&self) -> &Intersection {
        &self.intersection
    }

    /// The location of the light.
    pub fn position(&self) -> LatLng {
        self.intersection.position
    }

    /// The current state.
    pub fn state(&self) -> LightState {
        self.state
    }

    /// Seconds until the next transition.
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining
    }

    /// Advances the countdown by one second, transitioning when it runs out.
    fn step(&mut self, timings: &LightTimings, rng: &mut impl Rng) {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.state = self.state.next();
            self.remaining = timings.range(self.state).sample(rng).max(1);
        }
    }
}

impl TrafficLightSimulator {
    /// Creates a simulator with no lights.
    pub fn new(timings: LightTimings) -> Self {
        Self {
            timings,
            lights: SlotMap::with_key(),
        }
    }

    /// Creates one light per intersection, discarding any existing lights.
    pub fn start(
        &mut self,
        intersections: &[Intersection],
        rng: &mut impl Rng,
    ) -> Vec<IntersectionId> {
        self.stop();
        let ids = intersections
            .iter()
            .map(|intersection| {
                let light = TrafficLight::new(intersection.clone(), &self.timings, rng);
                self.lights.insert(light)
            })
            .collect::<Vec<_>>();
        log::debug!("Started {} traffic lights", ids.len());
        ids
    }

    /// Discards all lights. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if !self.lights.is_empty() {
            log::debug!("Stopped {} traffic lights", self.lights.len());
        }
        self.lights.clear();
    }

    /// Advances every light by one second.
    /// Returns the lights whose displayed state changed, which is all of them.
    pub fn step(&mut self, rng: &mut impl Rng) -> SmallVec<[IntersectionId; 12]> {
        let timings = self.timings;
        self.lights
            .iter_mut()
            .map(|(id, light)| {
                let before = light.state;
                light.step(&timings, rng);
                if light.state != before {
                    log::trace!("Light {:?}: {:?} -> {:?}", id, before, light.state);
                }
                id
            })
            .collect()
    }

    /// Gets the light at an intersection, if it is still active.
    pub fn get_state(&self, id: IntersectionId) -> Option<&TrafficLight> {
        self.lights.get(id)
    }

    /// Overrides the state and countdown of a light.
    /// Returns `false` if the light is not active.
    pub fn force_state(&mut self, id: IntersectionId, state: LightState, remaining: u32) -> bool {
        match self.lights.get_mut(id) {
            Some(light) => {
                light.state = state;
                light.remaining = remaining.max(1);
                log::debug!("Light {:?}: forced to {:?} for {}s", id, state, remaining);
                true
            }
            None => false,
        }
    }

    /// Returns an iterator over the active lights.
    pub fn iter(&self) -> impl Iterator<Item = (IntersectionId, &TrafficLight)> {
        self.lights.iter()
    }

    /// The number of active lights.
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    /// Whether there are no active lights.
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// The most restrictive state among the lights within `radius` metres of `position`.
    pub fn governing_state(&self, position: LatLng, radius: f64) -> Option<LightState> {
        self.lights
            .values()
            .filter(|light| light.position().distance(position) <= radius)
            .map(|light| light.state)
            .max_by_key(|state| state.severity())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn intersections(n: usize) -> Vec<Intersection> {
        (0..n)
            .map(|i| Intersection {
                position: LatLng::new(0.001 * i as f64, 0.0),
                route_index: i,
                progress: i as f64,
            })
            .collect()
    }

    #[test]
    fn start_uses_warm_up_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut sim = TrafficLightSimulator::new(LightTimings::default());
        let ids = sim.start(&intersections(12), &mut rng);
        assert_eq!(ids.len(), 12);
        for id in ids {
            let light = sim.get_state(id).unwrap();
            assert!(Interval::new(5, 35).contains(light.remaining_seconds()));
        }
    }

    #[test]
    fn countdown_and_cycle_order() {
        let mut rng = StdRng::seed_from_u64(11);
        let timings = LightTimings::default();
        let mut sim = TrafficLightSimulator::new(timings);
        let ids = sim.start(&intersections(4), &mut rng);

        for _ in 0..600 {
            let before = ids
                .iter()
                .map(|id| sim.get_state(*id).unwrap().clone())
                .collect::<Vec<_>>();
            let changed = sim.step(&mut rng);
            assert_eq!(changed.len(), ids.len());

            for (id, before) in ids.iter().zip(before) {
                let after = sim.get_state(*id).unwrap();
                if after.state() == before.state() {
                    assert_eq!(after.remaining_seconds(), before.remaining_seconds() - 1);
                } else {
                    assert_eq!(before.remaining_seconds(), 1);
                    assert_eq!(after.state(), before.state().next());
                    assert!(timings
                        .range(after.state())
                        .contains(after.remaining_seconds()));
                }
            }
        }
    }

    #[test]
    fn cycle_never_skips() {
        assert_eq!(LightState::Red.next(), LightState::Green);
        assert_eq!(LightState::Green.next(), LightState::Yellow);
        assert_eq!(LightState::Yellow.next(), LightState::Red);
    }

    #[test]
    fn stop_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut sim = TrafficLightSimulator::new(LightTimings::default());
        let ids = sim.start(&intersections(3), &mut rng);
        sim.stop();
        sim.stop();
        assert!(sim.is_empty());
        assert!(sim.get_state(ids[0]).is_none());
        assert!(!sim.force_state(ids[0], LightState::Red, 10));
    }

    #[test]
    fn restart_discards_previous_lights() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut sim = TrafficLightSimulator::new(LightTimings::default());
        let old = sim.start(&intersections(3), &mut rng);
        let new = sim.start(&intersections(5), &mut rng);
        assert_eq!(sim.len(), 5);
        assert!(old.iter().all(|id| sim.get_state(*id).is_none()));
        assert!(new.iter().all(|id| sim.get_state(*id).is_some()));
    }

    #[test]
    fn governing_state_prefers_red() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut sim = TrafficLightSimulator::new(LightTimings::default());
        let ids = sim.start(&intersections(3), &mut rng);
        sim.force_state(ids[0], LightState::Green, 30);
        sim.force_state(ids[1], LightState::Yellow, 30);
        sim.force_state(ids[2], LightState::Red, 30);

        // Lights are ~111 m apart
        let at = |i: f64| LatLng::new(0.001 * i, 0.0);
        assert_eq!(sim.governing_state(at(0.0), 60.0), Some(LightState::Green));
        assert_eq!(sim.governing_state(at(0.5), 60.0), Some(LightState::Yellow));
        assert_eq!(sim.governing_state(at(1.5), 60.0), Some(LightState::Red));
        assert_eq!(sim.governing_state(at(10.0), 60.0), None);
    }
}
