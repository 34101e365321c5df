use anyhow::{Context, Result};
use fleet_animator::AnimatorConfig;
use fleet_geo::SimProjection;
use fleet_route_mapbox::MapboxConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "FLEET_SIM_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub animator: AnimatorConfig,
    pub mapbox: MapboxConfig,
    pub projection: SimProjection,
    pub run: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Vehicles spawned when no simulation file is given.
    pub random_vehicles: usize,
    pub min_start_speed: f64,
    pub max_start_speed: f64,
    pub stats_every_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { random_vehicles: 5, min_start_speed: 30.0, max_start_speed: 70.0, stats_every_ms: 1_000 }
    }
}

impl AppConfig {
    /// Explicit path, then `$FLEET_SIM_CONFIG`, then `./fleet-sim.toml`; defaults
    /// when none of them exist. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::from_file(p);
        }
        let candidates = std::env::var(CONFIG_ENV)
            .ok()
            .map(PathBuf::from)
            .into_iter()
            .chain([PathBuf::from("fleet-sim.toml")]);
        for p in candidates {
            if p.exists() {
                return Self::from_file(&p);
            }
        }
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    }
}
