use anyhow::{Context, Result};
use fleet_geo::SimProjection;
use fleet_model::*;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, warn};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SimPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SimulationTrip {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub from_location: String,
    #[serde(default)]
    pub to_location: String,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub energy_consumed_wh: f64,
    #[serde(default)]
    pub soc_percentage: f64,
    pub start_position: SimPosition,
    pub end_position: SimPosition,
    #[serde(default)]
    pub path: Vec<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SimulationVehicleData {
    pub initial_soc: f64,
    #[serde(default)]
    pub trips: Vec<SimulationTrip>,
}

/// A vehicle from a simulation file, ready to hand to the animator.
#[derive(Clone, Debug, PartialEq)]
pub struct SimVehicle {
    pub init: VehicleInit,
    /// Trip end positions in lng/lat, in file order.
    pub destinations: Vec<Coord>,
    pub trips: Vec<SimulationTrip>,
}

/// Parses `{ "<vehicle name>": { initial_soc, trips: [...] }, ... }`.
/// Vehicles are numbered `sim-<n>` by their position in the file; vehicles
/// without trips are skipped but still consume a number.
pub fn parse_simulation(raw: &str, proj: &SimProjection) -> Result<Vec<SimVehicle>> {
    let doc: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(raw).context("simulation file must be a JSON object")?;

    let mut out = Vec::with_capacity(doc.len());
    for (index, (name, value)) in doc.into_iter().enumerate() {
        let data: SimulationVehicleData =
            serde_json::from_value(value).with_context(|| format!("vehicle {name}"))?;
        let Some(first) = data.trips.first() else {
            warn!(vehicle = %name, "no trips, skipping");
            continue;
        };

        let init = VehicleInit {
            id: Some(format!("sim-{index}")),
            name: name.clone(),
            position: proj.to_coord(first.start_position.x, first.start_position.y),
            battery_level: Some(data.initial_soc.clamp(0.0, 100.0)),
            speed: Some(0.0),
            is_moving: Some(false),
            ..Default::default()
        };
        let destinations = data
            .trips
            .iter()
            .map(|t| proj.to_coord(t.end_position.x, t.end_position.y))
            .collect();
        out.push(SimVehicle { init, destinations, trips: data.trips });
    }
    debug!(vehicles = out.len(), "simulation parsed");
    Ok(out)
}

pub fn load_simulation(path: &Path, proj: &SimProjection) -> Result<Vec<SimVehicle>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_simulation(&raw, proj)
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct RouteExport {
    pub timestamp: String,
    pub route: Vec<Coord>,
    pub start: Coord,
    pub end: Coord,
    pub distance: f64,
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<serde_json::Value>,
}

impl RouteExport {
    pub fn new(route: Vec<Coord>, distance: f64, duration: f64, vehicle: Option<serde_json::Value>) -> Result<Self> {
        let (Some(start), Some(end)) = (route.first().copied(), route.last().copied()) else {
            anyhow::bail!("cannot export an empty route");
        };
        let timestamp = OffsetDateTime::now_utc().format(&Rfc3339)?;
        Ok(Self { timestamp, route, start, end, distance, duration, vehicle })
    }
}

pub fn export_route_json(export: &RouteExport, path: &Path) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, export)?;
    w.flush()?;
    Ok(())
}

pub fn import_route_json(path: &Path) -> Result<RouteExport> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    Ok(serde_json::from_reader(BufReader::new(f))?)
}

/// One snapshot (all vehicles at one tick) per line.
pub fn export_snapshots_ndjson(snapshots: &[Vec<TrackedVehicle>], path: &Path) -> Result<()> {
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for s in snapshots {
        let line = serde_json::to_string(s)?;
        writeln!(w, "{}", line)?;
    }
    w.flush()?;
    Ok(())
}

pub fn import_snapshots_ndjson(path: &Path) -> Result<Vec<Vec<TrackedVehicle>>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut out = vec![];
    for line in BufReader::new(f).lines() {
        let s = line?;
        if s.trim().is_empty() { continue; }
        out.push(serde_json::from_str(&s)?);
    }
    Ok(out)
}

pub fn export_snapshot_csv(vehicles: &[TrackedVehicle], path: &Path) -> Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for v in vehicles {
        w.serialize(CsvRow {
            id: v.id.clone(),
            name: v.name.clone(),
            lng: v.position[0],
            lat: v.position[1],
            battery: v.battery_level,
            speed: v.speed,
            heading: v.heading,
            is_moving: v.is_moving,
            route_progress: v.route_progress,
        })?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct CsvRow {
    pub id: String,
    pub name: String,
    pub lng: f64,
    pub lat: f64,
    pub battery: f64,
    pub speed: f64,
    pub heading: f64,
    pub is_moving: bool,
    pub route_progress: f64,
}
