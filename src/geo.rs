//! Geographic points and the distance/bearing functions used throughout the crate.

use cgmath::prelude::*;
use cgmath::Vector2;
use serde::{Deserialize, Serialize};

/// Length of one degree of latitude, in m.
const METRES_PER_DEGREE: f64 = 111_320.0;

/// A planar offset in metres (x = east, y = north).
pub type Offset2d = Vector2<f64>;

/// A WGS84 coordinate in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new coordinate.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// The offset from this point to `other` on a local equirectangular projection, in m.
    pub fn offset_to(&self, other: LatLng) -> Offset2d {
        let mean_lat = (0.5 * (self.lat + other.lat)).to_radians();
        Offset2d::new(
            (other.lng - self.lng) * METRES_PER_DEGREE * mean_lat.cos(),
            (other.lat - self.lat) * METRES_PER_DEGREE,
        )
    }

    /// Planar distance to `other` in m.
    ///
    /// Every distance in the crate goes through this function, so sampling,
    /// proximity checks and agent movement all agree with each other.
    pub fn distance(&self, other: LatLng) -> f64 {
        self.offset_to(other).magnitude()
    }

    /// Initial great-circle bearing towards `other`, in degrees clockwise from north in `[0, 360)`.
    pub fn bearing(&self, other: LatLng) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let y = dlng.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();

        (y.atan2(x).to_degrees() + 360.0) % 360.0
    }

    /// Linearly interpolates between two coordinates.
    pub fn lerp(&self, other: LatLng, t: f64) -> LatLng {
        LatLng {
            lat: self.lat + t * (other.lat - self.lat),
            lng: self.lng + t * (other.lng - self.lng),
        }
    }
}
