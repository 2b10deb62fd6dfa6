//! The boundary to the external geocoding and routing services.
//!
//! Upstream responses are normalized into [Place] and [Route] values here, so the
//! simulation never has to guess at their shape. Failures and timeouts never reach
//! the simulation either: they are logged and replaced by local fallbacks.

use crate::config::ProviderConfig;
use crate::geo::LatLng;
use crate::route::Route;
use anyhow::{bail, Context, Result};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::Deserialize;
use std::f64::consts::PI;
use std::future::Future;

/// The number of segments in a fallback route.
const FALLBACK_SEGMENTS: usize = 15;

/// The peak sideways bulge of a fallback route, in degrees of latitude.
const FALLBACK_BULGE: f64 = 0.002;

/// The maximum jitter applied to the interior points of a fallback route, in degrees.
const FALLBACK_JITTER: f64 = 0.0005;

/// Assumed city driving time for fallback routes, in minutes per km.
const FALLBACK_MIN_PER_KM: f64 = 2.5;

/// A geocoded location.
#[derive(Clone, Debug, PartialEq)]
pub struct Place {
    pub position: LatLng,
    pub name: String,
}

/// A route between two named locations, ready to be loaded into a session.
#[derive(Clone, Debug)]
pub struct PlannedRoute {
    pub from: Place,
    pub to: Place,
    pub route: Route,
    /// Whether the route was generated locally because routing failed.
    pub fallback: bool,
}

/// Turns free-text locations into coordinates.
pub trait Geocoder {
    /// Looks up a location. Returns `None` when nothing matches.
    fn geocode(&self, query: &str) -> impl Future<Output = Result<Option<Place>>>;
}

/// Finds driving routes between coordinates.
pub trait Router {
    /// Finds a route from `from` to `to`.
    fn route(&self, from: LatLng, to: LatLng) -> impl Future<Output = Result<Route>>;
}

/// Geocodes both ends and finds a route between them.
///
/// This never fails: locations that cannot be geocoded in time use the configured
/// default coordinates, and a failed route is replaced by [fallback_route].
pub async fn plan_route(
    geocoder: &impl Geocoder,
    router: &impl Router,
    from: &str,
    to: &str,
    config: &ProviderConfig,
    rng: &mut impl Rng,
) -> PlannedRoute {
    log::debug!("Planning route: {} -> {}", from, to);
    let from = geocode_or_default(geocoder, from, config.default_from, config).await;
    let to = geocode_or_default(geocoder, to, config.default_to, config).await;

    let routed = tokio::time::timeout(config.timeout(), router.route(from.position, to.position))
        .await
        .context("routing timed out")
        .and_then(|res| res);
    match routed {
        Ok(route) if !route.is_degenerate() => {
            log::debug!("Route found with {} points", route.len());
            PlannedRoute {
                from,
                to,
                route,
                fallback: false,
            }
        }
        res => {
            match res {
                Err(err) => log::warn!("Routing failed, using fallback route: {:#}", err),
                Ok(route) => log::warn!(
                    "Router returned {} points, using fallback route",
                    route.len()
                ),
            }
            let route = fallback_route(from.position, to.position, rng);
            PlannedRoute {
                from,
                to,
                route,
                fallback: true,
            }
        }
    }
}

/// Geocodes a location, falling back to `default` on failure, no match or timeout.
async fn geocode_or_default(
    geocoder: &impl Geocoder,
    query: &str,
    default: LatLng,
    config: &ProviderConfig,
) -> Place {
    let res = tokio::time::timeout(config.timeout(), geocoder.geocode(query)).await;
    match res {
        Ok(Ok(Some(place))) => return place,
        Ok(Ok(None)) => log::warn!("No match for {:?}, using default coordinates", query),
        Ok(Err(err)) => log::warn!("Geocoding {:?} failed, using default: {:#}", query, err),
        Err(_) => log::warn!("Geocoding {:?} timed out, using default coordinates", query),
    }
    Place {
        position: default,
        name: query.to_string(),
    }
}

/// Generates a gently curved approximate route between two points.
///
/// The route bulges northwards by up to [FALLBACK_BULGE] degrees and its interior
/// points are jittered slightly so it looks hand drawn. The end points are exact.
pub fn fallback_route(from: LatLng, to: LatLng, rng: &mut impl Rng) -> Route {
    let jitter = Uniform::new_inclusive(-FALLBACK_JITTER, FALLBACK_JITTER);
    let points = (0..=FALLBACK_SEGMENTS)
        .map(|i| {
            let t = i as f64 / FALLBACK_SEGMENTS as f64;
            let mut point = from.lerp(to, t);
            if i > 0 && i < FALLBACK_SEGMENTS {
                let offset = jitter.sample(rng);
                point.lat += (t * PI).sin() * FALLBACK_BULGE + offset;
                point.lng += offset;
            }
            point
        })
        .collect();

    let km = ((to.lat - from.lat) * 111.0).hypot((to.lng - from.lng) * 85.0);
    Route::new(points, km * 1000.0, km * FALLBACK_MIN_PER_KM * 60.0)
}

#[derive(Deserialize)]
struct OsrmResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    /// `[lng, lat]` pairs.
    coordinates: Vec<[f64; 2]>,
}

/// Parses an OSRM `route` response requested with `geometries=geojson`.
pub fn parse_osrm_route(json: &str) -> Result<Route> {
    let resp: OsrmResponse = serde_json::from_str(json).context("malformed OSRM response")?;
    let Some(route) = resp.routes.into_iter().next() else {
        bail!(
            "OSRM returned no routes (code {})",
            resp.code.as_deref().unwrap_or("missing")
        );
    };
    if route.geometry.coordinates.len() < 2 {
        bail!(
            "OSRM route has {} coordinates",
            route.geometry.coordinates.len()
        );
    }
    let points = route
        .geometry
        .coordinates
        .iter()
        .map(|[lng, lat]| LatLng::new(*lat, *lng))
        .collect();
    Ok(Route::new(points, route.distance, route.duration))
}

#[derive(Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

/// Parses a Nominatim `search?format=json` response, keeping the best match.
pub fn parse_nominatim(json: &str) -> Result<Option<Place>> {
    let places: Vec<NominatimPlace> =
        serde_json::from_str(json).context("malformed Nominatim response")?;
    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };
    let lat = place
        .lat
        .parse()
        .with_context(|| format!("bad latitude {:?}", place.lat))?;
    let lng = place
        .lon
        .parse()
        .with_context(|| format!("bad longitude {:?}", place.lon))?;
    Ok(Some(Place {
        position: LatLng::new(lat, lng),
        name: place.display_name,
    }))
}

#[cfg(feature = "http")]
pub use self::http::{NominatimGeocoder, OsrmRouter};

#[cfg(feature = "http")]
mod http {
    use super::*;

    /// Routes with an OSRM server.
    pub struct OsrmRouter {
        base_url: String,
        client: reqwest::Client,
    }

    /// Geocodes with a Nominatim server.
    pub struct NominatimGeocoder {
        base_url: String,
        client: reqwest::Client,
    }

    impl OsrmRouter {
        /// Creates a router using the server at `base_url`, e.g. `https://router.project-osrm.org`.
        pub fn new(base_url: impl Into<String>) -> Self {
            Self {
                base_url: base_url.into(),
                client: reqwest::Client::new(),
            }
        }
    }

    impl NominatimGeocoder {
        /// Creates a geocoder using the server at `base_url`, e.g.
        /// `https://nominatim.openstreetmap.org`. Nominatim requires a descriptive user agent.
        pub fn new(base_url: impl Into<String>, user_agent: &str) -> Result<Self> {
            let client = reqwest::Client::builder()
                .user_agent(user_agent)
                .build()
                .context("building HTTP client")?;
            Ok(Self {
                base_url: base_url.into(),
                client,
            })
        }
    }

    impl Router for OsrmRouter {
        async fn route(&self, from: LatLng, to: LatLng) -> Result<Route> {
            let url = format!(
                "{}/route/v1/driving/{},{};{},{}?overview=full&geometries=geojson",
                self.base_url.trim_end_matches('/'),
                from.lng,
                from.lat,
                to.lng,
                to.lat
            );
            let body = self
                .client
                .get(&url)
                .send()
                .await
                .and_then(|resp| resp.error_for_status())
                .with_context(|| format!("requesting {}", url))?
                .text()
                .await?;
            parse_osrm_route(&body)
        }
    }

    impl Geocoder for NominatimGeocoder {
        async fn geocode(&self, query: &str) -> Result<Option<Place>> {
            let url = format!("{}/search", self.base_url.trim_end_matches('/'));
            let body = self
                .client
                .get(&url)
                .query(&[("format", "json"), ("limit", "1"), ("q", query)])
                .send()
                .await
                .and_then(|resp| resp.error_for_status())
                .with_context(|| format!("geocoding {:?}", query))?
                .text()
                .await?;
            parse_nominatim(&body)
        }
    }
}
