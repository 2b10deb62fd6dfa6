use crate::geo::LatLng;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A route between two locations, as returned by a routing service.
///
/// Routes are immutable once built. Positions along a route are expressed as a
/// "progress" value: the integer part is the index of a waypoint and the fractional
/// part is the interpolation factor towards the following waypoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "RouteData", into = "RouteData")]
pub struct Route {
    /// The waypoints in traversal order.
    points: Vec<LatLng>,
    /// The distance from the first waypoint to each waypoint, in m.
    cumulative: Vec<f64>,
    /// The route length reported by the routing service, in m.
    total_distance_m: f64,
    /// The travel time reported by the routing service, in s.
    total_duration_s: f64,
}

/// The serialized form of a [Route].
#[derive(Clone, Serialize, Deserialize)]
struct RouteData {
    points: Vec<LatLng>,
    total_distance_m: f64,
    total_duration_s: f64,
}

/// Human readable route totals, as shown in the route info panel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouteSummary {
    pub distance_km: f64,
    pub duration_min: u64,
}

impl Route {
    /// Creates a route from its waypoints and the totals reported by the routing service.
    pub fn new(points: Vec<LatLng>, total_distance_m: f64, total_duration_s: f64) -> Self {
        let cumulative = std::iter::once(0.0)
            .chain(points.iter().tuple_windows().scan(0.0, |acc, (a, b)| {
                *acc += a.distance(*b);
                Some(*acc)
            }))
            .take(points.len())
            .collect();
        Self {
            points,
            cumulative,
            total_distance_m,
            total_duration_s,
        }
    }

    /// Creates a route from its waypoints alone. The distance is measured from the
    /// polyline and the duration is unknown (zero).
    pub fn from_points(points: Vec<LatLng>) -> Self {
        let mut route = Self::new(points, 0.0, 0.0);
        route.total_distance_m = route.length();
        route
    }

    /// The waypoints of the route.
    pub fn points(&self) -> &[LatLng] {
        &self.points
    }

    /// The number of waypoints.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the route has no waypoints.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether the route is too short to traverse (fewer than two waypoints).
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 2
    }

    /// The progress value of the final waypoint.
    pub fn last_index(&self) -> usize {
        self.points.len().saturating_sub(1)
    }

    /// The length of the polyline in m.
    pub fn length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// The distance from the start of the polyline to each waypoint, in m.
    pub fn cumulative_distances(&self) -> &[f64] {
        &self.cumulative
    }

    /// The route length reported by the routing service, in m.
    pub fn total_distance_m(&self) -> f64 {
        self.total_distance_m
    }

    /// The travel time reported by the routing service, in s.
    pub fn total_duration_s(&self) -> f64 {
        self.total_duration_s
    }

    /// The route totals formatted for display.
    pub fn summary(&self) -> RouteSummary {
        RouteSummary {
            distance_km: (self.total_distance_m / 100.0).round() / 10.0,
            duration_min: (self.total_duration_s / 60.0).round() as u64,
        }
    }

    /// Clamps a progress value to the valid range for this route.
    pub fn clamp_progress(&self, progress: f64) -> f64 {
        progress.clamp(0.0, self.last_index() as f64)
    }

    /// Converts a progress value into a distance along the polyline in m.
    pub fn distance_at(&self, progress: f64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let progress = self.clamp_progress(progress);
        let idx = progress.floor() as usize;
        if idx >= self.last_index() {
            return self.length();
        }
        let frac = progress - idx as f64;
        let seg = self.cumulative[idx + 1] - self.cumulative[idx];
        self.cumulative[idx] + frac * seg
    }

    /// Converts a distance along the polyline in m into a progress value.
    pub fn progress_at(&self, distance: f64) -> f64 {
        if distance <= 0.0 || self.is_empty() {
            return 0.0;
        }
        if distance >= self.length() {
            return self.last_index() as f64;
        }
        // cumulative[idx] <= distance < cumulative[idx + 1], so the segment is non-empty
        let idx = self.cumulative.partition_point(|d| *d <= distance) - 1;
        let seg = self.cumulative[idx + 1] - self.cumulative[idx];
        idx as f64 + (distance - self.cumulative[idx]) / seg
    }

    /// The interpolated position at a progress value.
    pub fn position_at(&self, progress: f64) -> LatLng {
        let (a, b, frac) = self.segment_at(progress);
        a.lerp(b, frac)
    }

    /// The heading of the segment containing `progress`, in degrees clockwise from north.
    pub fn heading_at(&self, progress: f64) -> f64 {
        let (a, b, _) = self.segment_at(progress);
        a.bearing(b)
    }

    /// The index of the waypoint nearest to a progress value.
    pub fn nearest_index(&self, progress: f64) -> usize {
        self.clamp_progress(progress).round() as usize
    }

    /// Gets the end points of the segment containing `progress`, and the interpolation
    /// factor between them. At the final waypoint the last segment is used.
    fn segment_at(&self, progress: f64) -> (LatLng, LatLng, f64) {
        match self.points.len() {
            0 => (LatLng::default(), LatLng::default(), 0.0),
            1 => (self.points[0], self.points[0], 0.0),
            len => {
                let progress = self.clamp_progress(progress);
                let idx = usize::min(progress.floor() as usize, len - 2);
                (self.points[idx], self.points[idx + 1], progress - idx as f64)
            }
        }
    }
}

impl From<RouteData> for Route {
    fn from(data: RouteData) -> Self {
        Route::new(data.points, data.total_distance_m, data.total_duration_s)
    }
}

impl From<Route> for RouteData {
    fn from(route: Route) -> Self {
        RouteData {
            points: route.points,
            total_distance_m: route.total_distance_m,
            total_duration_s: route.total_duration_s,
        }
    }
}

impl fmt::Display for RouteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} km, {} mins", self.distance_km, self.duration_min)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn l_shaped() -> Route {
        Route::from_points(vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.01, 0.0),
            LatLng::new(0.01, 0.01),
        ])
    }

    #[test]
    fn cumulative_distances() {
        let route = l_shaped();
        let cum = route.cumulative_distances();
        assert_eq!(cum.len(), 3);
        assert_eq!(cum[0], 0.0);
        assert_approx_eq!(cum[1], 1113.2, 0.01);
        assert_approx_eq!(cum[2], 2226.4, 0.1);
        assert_approx_eq!(route.total_distance_m(), route.length());
    }

    #[test]
    fn progress_distance_conversions() {
        let route = l_shaped();
        assert_approx_eq!(route.progress_at(route.distance_at(1.25)), 1.25);
        assert_approx_eq!(route.progress_at(route.length() / 4.0), 0.5, 0.001);
        assert_eq!(route.progress_at(-3.0), 0.0);
        assert_eq!(route.progress_at(1e9), 2.0);
    }

    #[test]
    fn position_and_heading() {
        let route = l_shaped();
        let pos = route.position_at(0.5);
        assert_approx_eq!(pos.lat, 0.005);
        assert_approx_eq!(pos.lng, 0.0);
        assert_approx_eq!(route.heading_at(0.5), 0.0, 0.1);
        assert_approx_eq!(route.heading_at(1.5), 90.0, 0.1);
        // The final waypoint keeps the heading of the last segment
        assert_approx_eq!(route.heading_at(2.0), 90.0, 0.1);
    }

    #[test]
    fn degenerate_routes() {
        let empty = Route::from_points(vec![]);
        assert!(empty.is_degenerate());
        assert_eq!(empty.length(), 0.0);
        assert_eq!(empty.clamp_progress(3.0), 0.0);

        let single = Route::from_points(vec![LatLng::new(1.0, 2.0)]);
        assert!(single.is_degenerate());
        assert_eq!(single.position_at(0.7), LatLng::new(1.0, 2.0));
    }

    #[test]
    fn summary_formatting() {
        let route = Route::new(vec![], 12_345.0, 1_740.0);
        let summary = route.summary();
        assert_eq!(summary.distance_km, 12.3);
        assert_eq!(summary.duration_min, 29);
        assert_eq!(summary.to_string(), "12.3 km, 29 mins");
    }

    #[test]
    fn serde_round_trip_rebuilds_distances() {
        let route = l_shaped();
        let json = serde_json::to_string(&route).unwrap();
        let back: Route = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cumulative_distances(), route.cumulative_distances());
    }
}
