//! Route acquisition traits and the fallback policy used by the animator.

pub mod guidance;

use fleet_geo::{fallback_duration, haversine_distance, straight_line_waypoints};
use fleet_model::{is_valid_coordinate, Coord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RouteMode {
    Fastest,
    #[default]
    Balanced,
    Energy,
}

/// Wire shape of a directions response. Only `routes[0]` is consumed.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DirectionsResponse {
    #[serde(default)]
    pub routes: Vec<DirectionsRoute>,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectionsRoute {
    /// meters
    pub distance: f64,
    /// seconds
    pub duration: f64,
    pub geometry: LineString,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineString {
    pub coordinates: Vec<Coord>,
    #[serde(rename = "type", default = "line_string")]
    pub kind: String,
}

fn line_string() -> String {
    "LineString".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Waypoint {
    #[serde(default)]
    pub name: String,
    pub location: Coord,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GeocodeResponse {
    #[serde(default)]
    pub features: Vec<GeocodeFeature>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeocodeFeature {
    #[serde(default)]
    pub id: String,
    pub place_name: String,
    pub center: Coord,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteResult {
    pub route: Vec<Coord>,
    pub distance_m: f64,
    pub duration_s: f64,
    #[serde(default)]
    pub instructions: Vec<String>,
    /// True when the route was synthesized locally rather than returned by a service.
    #[serde(default)]
    pub synthetic: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("{0}")]
    Msg(String),
    #[error("directions access token not set")]
    MissingToken,
    #[error("no route found")]
    NoRoute,
    #[error("could not find location: {0}")]
    NotFound(String),
    #[error("location name cannot be empty")]
    EmptyQuery,
    #[error("invalid coordinate [{0}, {1}]")]
    InvalidCoordinate(f64, f64),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A resolved route for one vehicle, handed back to the tick loop.
#[derive(Debug, Clone)]
pub struct RouteUpdate {
    pub vehicle_id: String,
    /// Lets the receiver discard answers to superseded requests.
    pub request_id: u64,
    /// Where the request was headed, for re-synthesizing an unusable answer.
    pub destination: Coord,
    pub result: RouteResult,
}

pub type RouteTx = crossbeam_channel::Sender<RouteUpdate>;
pub type RouteRx = crossbeam_channel::Receiver<RouteUpdate>;

pub fn channel() -> (RouteTx, RouteRx) {
    crossbeam_channel::unbounded()
}

/// Anything that can turn an origin/destination pair into routed polylines.
#[async_trait::async_trait]
pub trait DirectionsSource: Send + Sync {
    async fn directions(&self, origin: Coord, destination: Coord, mode: RouteMode)
        -> Result<DirectionsResponse, RouteError>;
}

/// Forward geocoding of free-form place names.
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, query: &str) -> Result<GeocodeResponse, RouteError>;
}

/// Routes `start -> end`, falling back to a straight line when the service
/// errors or returns nothing. Never fails.
pub async fn calculate_route(
    source: &dyn DirectionsSource,
    start: Coord,
    end: Coord,
    mode: RouteMode,
) -> RouteResult {
    match source.directions(start, end, mode).await.and_then(first_route) {
        Ok(result) => {
            debug!(
                distance_m = result.distance_m,
                duration_s = result.duration_s,
                points = result.route.len(),
                "route calculated"
            );
            result
        }
        Err(err) => {
            warn!(error = %err, "route calculation failed, using straight-line route");
            create_straight_line_route(start, end)
        }
    }
}

fn first_route(resp: DirectionsResponse) -> Result<RouteResult, RouteError> {
    let route = resp.routes.into_iter().next().ok_or(RouteError::NoRoute)?;
    // a single point gives the interpolator nothing to move along
    if route.geometry.coordinates.len() < 2 {
        return Err(RouteError::NoRoute);
    }
    let instructions = guidance::generate_instructions(&route.geometry.coordinates, "destination")
        .into_iter()
        .map(|i| i.text)
        .collect();
    Ok(RouteResult {
        route: route.geometry.coordinates,
        distance_m: route.distance,
        duration_s: route.duration,
        instructions,
        synthetic: false,
    })
}

/// Straight path subdivided roughly once per km (minimum five steps), timed at 50 km/h.
pub fn create_straight_line_route(start: Coord, end: Coord) -> RouteResult {
    let distance = haversine_distance(start, end);
    RouteResult {
        route: straight_line_waypoints(start, end),
        distance_m: distance,
        duration_s: fallback_duration(distance),
        instructions: vec![
            "Head towards destination".into(),
            "Continue straight".into(),
            "Arrive at destination".into(),
        ],
        synthetic: true,
    }
}

async fn geocode_first(geocoder: &dyn Geocoder, name: &str) -> Result<GeocodeFeature, RouteError> {
    let query = name.trim();
    if query.is_empty() {
        return Err(RouteError::EmptyQuery);
    }
    geocoder
        .geocode(query)
        .await?
        .features
        .into_iter()
        .next()
        .ok_or_else(|| RouteError::NotFound(query.to_string()))
}

/// Geocodes both names and routes between the first matches.
pub async fn calculate_route_from_names(
    directions: &dyn DirectionsSource,
    geocoder: &dyn Geocoder,
    start_name: &str,
    end_name: &str,
    mode: RouteMode,
) -> Result<RouteResult, RouteError> {
    let start = geocode_first(geocoder, start_name).await?;
    let end = geocode_first(geocoder, end_name).await?;
    debug!(start = %start.place_name, end = %end.place_name, "geocoded route endpoints");
    Ok(calculate_route(directions, start.center, end.center, mode).await)
}

pub async fn calculate_route_from_coordinates_to_name(
    directions: &dyn DirectionsSource,
    geocoder: &dyn Geocoder,
    start: Coord,
    end_name: &str,
    mode: RouteMode,
) -> Result<RouteResult, RouteError> {
    if !is_valid_coordinate(start) {
        return Err(RouteError::InvalidCoordinate(start[0], start[1]));
    }
    let end = geocode_first(geocoder, end_name).await?;
    debug!(destination = %end.place_name, "geocoded destination");
    Ok(calculate_route(directions, start, end.center, mode).await)
}
