//! Shared fleet animation model: tracked vehicles, camera poses and map features.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `[longitude, latitude]` in degrees.
pub type Coord = [f64; 2];

pub const DEFAULT_BATTERY_LEVEL: f64 = 100.0;
pub const DEFAULT_SPEED_KPH: f64 = 30.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ModelError {
    #[error("vehicle name must not be empty")]
    EmptyName,
    #[error("invalid coordinate [{0}, {1}]")]
    InvalidCoordinate(f64, f64),
    #[error("battery level {0} outside [0, 100]")]
    BatteryOutOfRange(f64),
    #[error("speed {0} must be finite and non-negative")]
    InvalidSpeed(f64),
}

pub fn is_valid_coordinate(c: Coord) -> bool {
    let [lng, lat] = c;
    (-180.0..=180.0).contains(&lng) && (-90.0..=90.0).contains(&lat)
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ArrivalPolicy {
    /// Pick a new destination and keep driving.
    #[default]
    Reroute,
    /// Park at the final waypoint.
    Stop,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VehicleState {
    Idle,
    AwaitingRoute,
    Moving,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TrackedVehicle {
    pub id: String,
    pub name: String,
    pub position: Coord,
    pub battery_level: f64,
    pub speed: f64,
    pub is_moving: bool,
    pub heading: f64,
    #[serde(default)]
    pub route: Vec<Coord>,
    pub route_progress: f64,
    #[serde(default)]
    pub on_arrival: ArrivalPolicy,
    #[serde(default)]
    pub awaiting_route: bool,
}

/// Loose vehicle description accepted from any producer (simulation files,
/// navigation, direct API use). Goes through [`TrackedVehicle::from_init`].
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct VehicleInit {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub position: Coord,
    #[serde(default)]
    pub battery_level: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub is_moving: Option<bool>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub route: Option<Vec<Coord>>,
    #[serde(default)]
    pub on_arrival: Option<ArrivalPolicy>,
}

impl VehicleInit {
    pub fn new(name: impl Into<String>, position: Coord) -> Self {
        Self { name: name.into(), position, ..Default::default() }
    }
}

impl TrackedVehicle {
    pub fn from_init(init: VehicleInit) -> Result<Self, ModelError> {
        let name = init.name.trim().to_string();
        if name.is_empty() {
            return Err(ModelError::EmptyName);
        }
        let [lng, lat] = init.position;
        if !is_valid_coordinate(init.position) {
            return Err(ModelError::InvalidCoordinate(lng, lat));
        }
        let battery_level = init.battery_level.unwrap_or(DEFAULT_BATTERY_LEVEL);
        if !(0.0..=100.0).contains(&battery_level) {
            return Err(ModelError::BatteryOutOfRange(battery_level));
        }
        let speed = init.speed.unwrap_or(DEFAULT_SPEED_KPH);
        if !speed.is_finite() || speed < 0.0 {
            return Err(ModelError::InvalidSpeed(speed));
        }
        if let Some(bad) = init.route.iter().flatten().find(|c| !is_valid_coordinate(**c)) {
            return Err(ModelError::InvalidCoordinate(bad[0], bad[1]));
        }
        let id = match init.id.map(|s| s.trim().to_string()) {
            Some(id) if !id.is_empty() => id,
            _ => Uuid::new_v4().simple().to_string(),
        };

        Ok(Self {
            id,
            name,
            position: init.position,
            battery_level,
            speed,
            is_moving: init.is_moving.unwrap_or(true),
            heading: init.heading.unwrap_or(0.0),
            route: init.route.unwrap_or_default(),
            route_progress: 0.0,
            on_arrival: init.on_arrival.unwrap_or_default(),
            awaiting_route: false,
        })
    }

    /// At least one segment to interpolate along.
    pub fn has_route(&self) -> bool {
        self.route.len() >= 2
    }

    pub fn state(&self) -> VehicleState {
        if self.awaiting_route {
            VehicleState::AwaitingRoute
        } else if self.is_moving && self.has_route() {
            VehicleState::Moving
        } else {
            VehicleState::Idle
        }
    }

    /// Largest legal `route_progress` for the current route.
    pub fn max_progress(&self) -> f64 {
        self.route.len().saturating_sub(1) as f64
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Bounds {
    pub fn contains(&self, c: Coord) -> bool {
        (self.west..=self.east).contains(&c[0]) && (self.south..=self.north).contains(&c[1])
    }
}

impl Default for Bounds {
    // lower Manhattan / Brooklyn, matching the default simulation projection
    fn default() -> Self {
        Self { west: -74.05, south: 40.65, east: -73.90, north: 40.80 }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CameraMode {
    #[default]
    Overview,
    Driving,
    Chase,
    TopDown,
    BirdsEye,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct CameraPose {
    pub center: Coord,
    pub zoom: f64,
    pub bearing: f64,
    pub pitch: f64,
}

/// A smoothed camera move; the surface eases to `pose` over `duration_ms`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct CameraTransition {
    pub pose: CameraPose,
    pub duration_ms: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub struct Feature {
    pub geometry: Point,
    pub properties: VehicleProperties,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub struct Point {
    pub coordinates: Coord,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct VehicleProperties {
    pub id: String,
    pub name: String,
    pub speed: i64,
    pub battery: i64,
    pub heading: f64,
}

impl FeatureCollection {
    pub fn from_vehicles(vehicles: &[TrackedVehicle]) -> Self {
        let features = vehicles
            .iter()
            .map(|v| Feature {
                geometry: Point { coordinates: v.position },
                properties: VehicleProperties {
                    id: v.id.clone(),
                    name: v.name.clone(),
                    speed: v.speed.round() as i64,
                    battery: v.battery_level.round() as i64,
                    heading: v.heading,
                },
            })
            .collect();
        Self { features }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct FleetStats {
    pub total: usize,
    pub moving: usize,
    pub stopped: usize,
    pub average_battery: f64,
}

impl FleetStats {
    pub fn from_vehicles(vehicles: &[TrackedVehicle]) -> Self {
        let total = vehicles.len();
        let moving = vehicles.iter().filter(|v| v.is_moving).count();
        let average_battery = if total > 0 {
            vehicles.iter().map(|v| v.battery_level).sum::<f64>() / total as f64
        } else {
            0.0
        };
        Self { total, moving, stopped: total - moving, average_battery }
    }
}
