use crate::config::SamplerConfig;
use crate::geo::LatLng;
use crate::route::Route;
use serde::{Deserialize, Serialize};

/// A synthetic intersection placed along a route to host a traffic light.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intersection {
    /// The location of the intersection.
    pub position: LatLng,
    /// The index of the route waypoint nearest to the intersection.
    pub route_index: usize,
    /// The exact route progress of the intersection.
    pub progress: f64,
}

/// Places roughly evenly spaced intersections along a route.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntersectionSampler {
    config: SamplerConfig,
}

impl IntersectionSampler {
    /// Creates a new sampler.
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    /// The number of intersections to place along a route of the given length in m.
    pub fn target_count(&self, length: f64) -> usize {
        let count = (length / self.config.spacing_m).floor();
        let count = if count.is_finite() { count as usize } else { 0 };
        self.config.count.clamp(count)
    }

    /// Samples the intersections of a route, in route order.
    ///
    /// Routes with fewer than two waypoints have no intersections. The output only
    /// depends on the route geometry.
    pub fn sample(&self, route: &Route) -> Vec<Intersection> {
        if route.is_degenerate() {
            return vec![];
        }

        let total = route.length();
        let target = self.target_count(total);
        let spacing = total / (target + 1) as f64;

        let mut out = Vec::with_capacity(target);
        let mut next = spacing;
        let cumulative = route.cumulative_distances();
        for dist in cumulative.iter().skip(1) {
            // Emit every multiple of `spacing` crossed by this segment
            while out.len() < target && spacing > 0.0 && *dist >= next {
                out.push(intersection_at(route, next));
                next += spacing;
            }
            if out.len() == target {
                break;
            }
        }

        if out.is_empty() {
            let mid = route.len() / 2;
            out.push(Intersection {
                position: route.points()[mid],
                route_index: mid,
                progress: mid as f64,
            });
        }

        log::debug!(
            "Placed {} intersections along {:.0} m ({:.0} m apart)",
            out.len(),
            total,
            spacing
        );
        out
    }
}

/// Builds the intersection sitting `distance` metres along the route.
fn intersection_at(route: &Route, distance: f64) -> Intersection {
    let progress = route.progress_at(distance);
    Intersection {
        position: route.position_at(progress),
        route_index: route.nearest_index(progress),
        progress,
    }
}
