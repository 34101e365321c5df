use fleet_model::Coord;
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
/// Average speed assumed for synthesized routes.
pub const FALLBACK_SPEED_KPH: f64 = 50.0;
pub const MIN_FALLBACK_STEPS: usize = 5;

/// Linear mapping from simulation space onto a lng/lat window.
/// Inputs outside the domain extrapolate; nothing is clamped.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimProjection {
    pub sim_min_x: f64,
    pub sim_max_x: f64,
    pub sim_min_y: f64,
    pub sim_max_y: f64,
    pub min_lng: f64,
    pub max_lng: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Default for SimProjection {
    fn default() -> Self {
        Self {
            sim_min_x: 0.0,
            sim_max_x: 15_000.0,
            sim_min_y: 0.0,
            sim_max_y: 12_000.0,
            min_lng: -74.2,
            max_lng: -73.7,
            min_lat: 40.5,
            max_lat: 40.9,
        }
    }
}

impl SimProjection {
    pub fn convert_x_to_lng(&self, x: f64) -> f64 {
        linear_map(x, self.sim_min_x, self.sim_max_x, self.min_lng, self.max_lng)
    }

    pub fn convert_y_to_lat(&self, y: f64) -> f64 {
        linear_map(y, self.sim_min_y, self.sim_max_y, self.min_lat, self.max_lat)
    }

    pub fn to_coord(&self, x: f64, y: f64) -> Coord {
        [self.convert_x_to_lng(x), self.convert_y_to_lat(y)]
    }
}

/// `out_min + (input - in_min) / (in_max - in_min) * (out_max - out_min)`,
/// evaluated so both ends of the domain land exactly on the range ends.
pub fn linear_map(input: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    let t = (input - in_min) / (in_max - in_min);
    lerp(out_min, out_max, t)
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    (1.0 - t) * a + t * b
}

pub fn lerp_coord(a: Coord, b: Coord, t: f64) -> Coord {
    [lerp(a[0], b[0], t), lerp(a[1], b[1], t)]
}

/// Great-circle distance in meters.
pub fn haversine_distance(a: Coord, b: Coord) -> f64 {
    let lat1 = a[1].to_radians();
    let lat2 = b[1].to_radians();
    let dlat = (b[1] - a[1]).to_radians();
    let dlng = (b[0] - a[0]).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Heading of the segment `from -> to` in degrees, 0 = north, 90 = east.
/// Planar: `atan2(dlng, dlat)`, so the result lies in (-180, 180].
pub fn heading_deg(from: Coord, to: Coord) -> f64 {
    (to[0] - from[0]).atan2(to[1] - from[1]).to_degrees()
}

/// Initial great-circle bearing of `from -> to` in degrees, in [0, 360).
pub fn bearing_deg(from: Coord, to: Coord) -> f64 {
    let lat1 = from[1].to_radians();
    let lat2 = to[1].to_radians();
    let dlng = (to[0] - from[0]).to_radians();
    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

const COMPASS: [&str; 8] = ["north", "northeast", "east", "southeast", "south", "southwest", "west", "northwest"];

/// Nearest of the eight compass words for a bearing in degrees.
pub fn compass_direction(bearing: f64) -> &'static str {
    let idx = (bearing.rem_euclid(360.0) / 45.0).round() as usize % 8;
    COMPASS[idx]
}

/// Number of steps used to subdivide a straight fallback path.
pub fn fallback_steps(distance_m: f64) -> usize {
    ((distance_m / 1000.0).floor() as usize).max(MIN_FALLBACK_STEPS)
}

/// Evenly spaced waypoints from `start` to `end` (inclusive), roughly one per km
/// and never fewer than `MIN_FALLBACK_STEPS + 1`.
pub fn straight_line_waypoints(start: Coord, end: Coord) -> Vec<Coord> {
    let steps = fallback_steps(haversine_distance(start, end));
    (0..=steps)
        .map(|i| lerp_coord(start, end, i as f64 / steps as f64))
        .collect()
}

/// Seconds needed to cover `distance_m` at [`FALLBACK_SPEED_KPH`].
pub fn fallback_duration(distance_m: f64) -> f64 {
    distance_m / FALLBACK_SPEED_KPH * 3.6
}
