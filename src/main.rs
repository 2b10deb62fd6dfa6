use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use structopt::StructOpt;
use traffic_nav_sim::{
    plan_route, AgentId, AgentState, AgentUpdate, IntersectionId, PlannedRoute, RenderSink, Route,
    SimulationConfig, SimulationSession, TrafficLight,
};

/// How long the demo runs at most, in virtual ms.
const MAX_RUN_MS: u64 = 60 * 60 * 1000;

/// Logs what a map would draw.
#[derive(Default)]
struct LogSink {
    last_state: Option<AgentState>,
    complete: bool,
}

impl RenderSink for LogSink {
    fn draw_route(&mut self, route: &Route) {
        log::info!("Route: {} waypoints, {}", route.len(), route.summary());
    }

    fn set_light(&mut self, id: IntersectionId, light: &TrafficLight) {
        log::trace!(
            "Light {:?}: {:?} ({}s)",
            id,
            light.state(),
            light.remaining_seconds()
        );
    }

    fn set_agent(&mut self, _id: AgentId, update: &AgentUpdate) {
        if self.last_state != Some(update.state) {
            log::info!(
                "Car {:?} at ({:.5}, {:.5}) heading {:.0}",
                update.state,
                update.position.lat,
                update.position.lng,
                update.heading
            );
            self.last_state = Some(update.state);
        }
    }

    fn animation_complete(&mut self, _id: Option<AgentId>) {
        self.complete = true;
    }
}

#[derive(StructOpt, Debug)]
#[structopt(name = "navsim")]
struct Flags {
    /// JSON file with the simulation configuration
    #[structopt(long = "config", parse(from_os_str))]
    config: Option<PathBuf>,

    /// Where the trip starts
    #[structopt(default_value = "Connaught Place")]
    from: String,

    /// Where the trip ends
    #[structopt(default_value = "Noida")]
    to: String,
}

fn rng(config: &SimulationConfig) -> StdRng {
    match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

#[cfg(feature = "http")]
async fn plan(from: &str, to: &str, config: &SimulationConfig) -> Result<PlannedRoute> {
    use traffic_nav_sim::provider::{NominatimGeocoder, OsrmRouter};
    let geocoder = NominatimGeocoder::new(
        "https://nominatim.openstreetmap.org",
        concat!("navsim/", env!("CARGO_PKG_VERSION")),
    )?;
    let router = OsrmRouter::new("https://router.project-osrm.org");
    let mut rng = rng(config);
    Ok(plan_route(&geocoder, &router, from, to, &config.provider, &mut rng).await)
}

#[cfg(not(feature = "http"))]
async fn plan(from: &str, to: &str, config: &SimulationConfig) -> Result<PlannedRoute> {
    let offline = offline::Offline;
    let mut rng = rng(config);
    Ok(plan_route(&offline, &offline, from, to, &config.provider, &mut rng).await)
}

/// Geocoding and routing without network access. Every lookup falls back to the
/// configured defaults and a locally generated route.
#[cfg(not(feature = "http"))]
mod offline {
    use anyhow::{bail, Result};
    use traffic_nav_sim::{Geocoder, LatLng, Place, Route, Router};

    pub struct Offline;

    impl Geocoder for Offline {
        async fn geocode(&self, _query: &str) -> Result<Option<Place>> {
            Ok(None)
        }
    }

    impl Router for Offline {
        async fn route(&self, _from: LatLng, _to: LatLng) -> Result<Route> {
            bail!("built without the http feature")
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let flags = Flags::from_args();
    let config = match &flags.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            SimulationConfig::from_json(&json)?
        }
        None => SimulationConfig::default(),
    };

    let planned = plan(&flags.from, &flags.to, &config).await?;
    log::info!(
        "{} -> {}{}",
        planned.from.name,
        planned.to.name,
        if planned.fallback { " (approximate route)" } else { "" }
    );

    let tick_ms = config.agent_tick();
    let mut session = SimulationSession::new(config, LogSink::default());
    let lights = session.load_route(planned.route).len();
    log::info!("{} traffic lights placed", lights);
    session.start_animation(None);

    while !session.sink().complete && session.now() < MAX_RUN_MS {
        session.advance(tick_ms);
    }
    if session.sink().complete {
        let minutes = session.now() as f64 / 60_000.0;
        log::info!("Arrived after {:.1} virtual minutes", minutes);
    } else {
        log::warn!("Gave up after {} virtual minutes", MAX_RUN_MS / 60_000);
    }
    session.stop();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_flags() {
        let flags = Flags::from_iter(["navsim"]);
        assert_eq!(flags.config, None);
        assert_eq!(flags.from, "Connaught Place");
        assert_eq!(flags.to, "Noida");
    }

    #[test]
    fn config_and_places() {
        let flags = Flags::from_iter(["navsim", "--config", "city.json", "Saket", "Gurgaon"]);
        assert_eq!(flags.config, Some(PathBuf::from("city.json")));
        assert_eq!(flags.from, "Saket");
        assert_eq!(flags.to, "Gurgaon");
    }
}
