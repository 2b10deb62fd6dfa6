//! Tests that animate a car along a whole route.

use traffic_nav_sim::{
    AgentState, LatLng, LightState, RecordingSink, RenderCommand, Route, SimulationConfig,
    SimulationSession,
};

fn session(seed: u64) -> SimulationSession<RecordingSink> {
    let config = SimulationConfig {
        seed: Some(seed),
        ..Default::default()
    };
    SimulationSession::new(config, RecordingSink::new())
}

/// About 1.7 km due east along the equator, with a waypoint every 16.7 m.
/// The three lights sit exactly on waypoints 25, 50 and 75.
fn route() -> Route {
    Route::from_points(
        (0..=100)
            .map(|i| LatLng::new(0.0, 0.00015 * i as f64))
            .collect(),
    )
}

fn agent_update_count(session: &SimulationSession<RecordingSink>) -> usize {
    session.sink().agent_updates().count()
}

/// Test that the car drives to the end of the route, only stopping next to a light.
#[test]
fn car_completes_route() {
    for seed in 0..5 {
        let mut session = session(seed);
        let intersections = session.load_route(route()).to_vec();
        assert_eq!(intersections.len(), 3);
        session.start_animation(Some(100.0));

        // 1250 moving ticks, plus a few red lights of at most 35 s each
        for _ in 0..8000 {
            session.advance(150);
            if session.sink().completions() > 0 {
                break;
            }
        }
        assert_eq!(session.sink().completions(), 1);
        assert!(session.agent().is_none());

        let updates = session.sink().agent_updates().copied().collect::<Vec<_>>();
        for pair in updates.windows(2) {
            assert!(pair[1].progress >= pair[0].progress);
            if pair[1].state == AgentState::Stopped {
                let near_light = intersections
                    .iter()
                    .any(|i| i.position.distance(pair[1].position) <= 60.0 + 1e-6);
                assert!(near_light, "stopped away from any light");
            }
        }
        let last = updates.last().unwrap();
        assert_eq!(last.state, AgentState::Completed);
        assert_eq!(last.progress, 100.0);

        // Nothing moves once the animation is over
        let before = agent_update_count(&session);
        session.advance(10_000);
        assert_eq!(agent_update_count(&session), before);
        assert_eq!(session.sink().completions(), 1);
    }
}

/// Test that a red light holds the car short of the intersection until it turns green.
#[test]
fn red_light_holds_car() {
    let mut session = session(3);
    session.load_route(route());
    let (first, light) = session
        .lights()
        .min_by(|a, b| {
            let a = a.1.intersection().progress;
            let b = b.1.intersection().progress;
            a.total_cmp(&b)
        })
        .unwrap();
    let position = light.position();
    let progress = light.intersection().progress;
    assert!(session.force_light(first, LightState::Red, 10_000));

    session.start_animation(Some(50.0));
    session.advance(120_000);
    let agent = session.agent().unwrap();
    assert_eq!(agent.state(), AgentState::Stopped);
    assert!(agent.progress() < progress);
    let stopped_at = session.route().unwrap().position_at(agent.progress());
    assert!(stopped_at.distance(position) <= 60.0);

    // Still held a minute later
    let held = agent.progress();
    session.advance(60_000);
    assert_eq!(session.agent().unwrap().progress(), held);

    assert!(session.force_light(first, LightState::Green, 100));
    session.advance(30_000);
    let agent = session.agent().unwrap();
    assert_ne!(agent.state(), AgentState::Stopped);
    assert!(agent.progress() > progress);
}

/// Test that stopping the animation or the session silences the sink.
#[test]
fn no_updates_after_stop() {
    let mut session = session(1);
    session.load_route(route());
    session.start_animation(None);
    session.advance(3_000);
    assert!(agent_update_count(&session) > 0);

    session.stop_animation();
    session.sink_mut().take();
    session.advance(10_000);
    assert_eq!(agent_update_count(&session), 0);
    // The lights keep running without a car
    assert!(!session.sink().commands().is_empty());

    session.stop();
    session.sink_mut().take();
    session.advance(10_000);
    assert!(session.sink().commands().is_empty());
    assert_eq!(session.pending_timers(), 0);

    session.stop();
    assert_eq!(session.pending_timers(), 0);
}

/// Test that nothing from a replaced route leaks into the new one.
#[test]
fn reloading_replaces_everything() {
    let mut session = session(5);
    session.load_route(route());
    let old = session.start_animation(None).unwrap();
    session.advance(5_000);

    let shorter = Route::from_points(vec![LatLng::new(1.0, 1.0), LatLng::new(1.01, 1.0)]);
    session.load_route(shorter);
    assert!(session.agent().is_none());
    assert_eq!(session.lights().count(), 3);
    assert_eq!(session.pending_timers(), 1);

    session.sink_mut().take();
    session.advance(5_000);
    for cmd in session.sink().commands() {
        if let RenderCommand::SetAgent { id, .. } = cmd {
            assert_ne!(*id, old);
        }
    }
    assert_eq!(agent_update_count(&session), 0);

    let new = session.start_animation(None).unwrap();
    assert_ne!(new, old);
    session.advance(1_500);
    assert_eq!(agent_update_count(&session), 11);
}

/// Test that the configured tick interval and speed changes take effect.
#[test]
fn configured_tick_and_speed() {
    let config = SimulationConfig::from_json(r#"{ "seed": 11, "agent": { "tick_ms": 100 } }"#)
        .unwrap();
    let mut session = SimulationSession::new(config, RecordingSink::new());
    session.load_route(route());
    session.start_animation(Some(36.0));

    // 0.04 * 36 / 50 = 0.0288 waypoints per tick, ten ticks in a second
    session.advance(1_000);
    assert_eq!(agent_update_count(&session), 11);
    assert!((progress(&session) - 0.288).abs() < 1e-9);

    assert!(session.set_speed(100.0));
    session.advance(1_000);
    assert!((progress(&session) - 1.088).abs() < 1e-9);
}

fn progress(session: &SimulationSession<RecordingSink>) -> f64 {
    session.agent().unwrap().progress()
}

/// Test a single 111 km segment from (0, 0) to (0, 1).
///
/// Intersections are spaced by metres, so the route gets the maximum of 12. Movement is
/// counted in waypoints, so the car crosses the one segment in about 25 ticks. No tick
/// position falls within 60 m of a light, so nothing can hold it up.
#[test]
fn degree_long_segment() {
    for seed in 0..5 {
        let mut session = session(seed);
        let route = Route::from_points(vec![LatLng::new(0.0, 0.0), LatLng::new(0.0, 1.0)]);
        assert_eq!(session.load_route(route).len(), 12);
        session.start_animation(Some(50.0));

        for _ in 0..1000 {
            session.advance(150);
        }

        assert!(session.agent().is_none());
        assert_eq!(session.sink().completions(), 1);
        let updates = session.sink().agent_updates().copied().collect::<Vec<_>>();
        assert!(updates.len() <= 27);
        assert!(updates.iter().all(|u| u.state != AgentState::Stopped));
        let last = updates.last().unwrap();
        assert_eq!(last.state, AgentState::Completed);
        assert_eq!(last.progress, 1.0);
        assert!(session.now() >= 150_000);
    }
}
