use fleet_model::Bounds;
use fleet_route_core::RouteMode;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnimatorConfig {
    /// Minimum wall-clock time between ticks of the animation loop.
    pub tick_interval_ms: u64,
    /// Speed at which a vehicle covers one route segment per second.
    pub reference_speed: f64,
    pub speed_jitter_probability: f64,
    /// Width of the uniform speed perturbation, centred on zero.
    pub speed_jitter_span: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub battery_drain_per_tick: f64,
    pub route_mode: RouteMode,
    /// Where new destinations are drawn from when no map is attached.
    pub destination_bounds: Bounds,
    /// Fixed seed for reproducible runs; entropy when absent.
    pub seed: Option<u64>,
    /// Turn-by-turn announcements for navigating vehicles.
    pub announce_guidance: bool,
    pub camera: CameraConfig,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            reference_speed: 50.0,
            speed_jitter_probability: 0.1,
            speed_jitter_span: 10.0,
            min_speed: 10.0,
            max_speed: 70.0,
            battery_drain_per_tick: 0.001,
            route_mode: RouteMode::Balanced,
            destination_bounds: Bounds::default(),
            seed: None,
            announce_guidance: true,
            camera: CameraConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Overview mode recentres only once the vehicle drifts this far (degrees).
    pub overview_threshold_deg: f64,
    /// Chase camera distance behind the vehicle (degrees).
    pub chase_offset_deg: f64,
    /// How long manual map interaction keeps the camera hands-off.
    pub resume_after_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self { overview_threshold_deg: 0.01, chase_offset_deg: 0.002, resume_after_ms: 3_000 }
    }
}
