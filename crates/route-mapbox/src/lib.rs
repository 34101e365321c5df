use anyhow::Context;
use fleet_model::Coord;
use fleet_route_core::*;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const TOKEN_ENV: &str = "MAPBOX_TOKEN";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MapboxConfig {
    pub base_url: String,            // e.g. "https://api.mapbox.com"
    pub access_token: Option<String>,
    pub timeout_ms: u64,
    /// Ask for alternative routes; only the first one is used.
    pub alternatives: bool,
}

impl Default for MapboxConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mapbox.com".into(),
            access_token: None,
            timeout_ms: 10_000,
            alternatives: true,
        }
    }
}

impl MapboxConfig {
    /// Fills a missing token from `MAPBOX_TOKEN`.
    pub fn with_env_token(mut self) -> Self {
        if self.access_token.as_deref().map_or(true, str::is_empty) {
            self.access_token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());
        }
        self
    }
}

pub fn profile_for(mode: RouteMode) -> &'static str {
    match mode {
        RouteMode::Fastest | RouteMode::Balanced => "mapbox/driving",
        RouteMode::Energy => "mapbox/driving-traffic",
    }
}

pub struct MapboxClient {
    cfg: MapboxConfig,
    http: reqwest::Client,
}

impl MapboxClient {
    pub fn new(cfg: MapboxConfig) -> Result<Self, RouteError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .context("http client init")?;
        Ok(Self { cfg, http })
    }

    fn token(&self) -> Result<&str, RouteError> {
        self.cfg
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(RouteError::MissingToken)
    }

    fn base(&self) -> Result<Url, RouteError> {
        Url::parse(&self.cfg.base_url)
            .with_context(|| format!("base url {}", self.cfg.base_url))
            .map_err(RouteError::from)
    }

    pub fn directions_url(&self, origin: Coord, destination: Coord, mode: RouteMode) -> Result<Url, RouteError> {
        let token = self.token()?;
        let mut url = self.base()?;
        let coords = format!("{},{};{},{}", origin[0], origin[1], destination[0], destination[1]);
        url.path_segments_mut()
            .map_err(|_| RouteError::Msg(format!("base url {} cannot carry a path", self.cfg.base_url)))?
            .pop_if_empty()
            .extend(["directions", "v5"])
            .extend(profile_for(mode).split('/'))
            .push(&coords);
        url.query_pairs_mut()
            .append_pair("alternatives", if self.cfg.alternatives { "true" } else { "false" })
            .append_pair("geometries", "geojson")
            .append_pair("overview", "full")
            .append_pair("steps", "true")
            .append_pair("access_token", token);
        Ok(url)
    }

    pub fn geocode_url(&self, query: &str) -> Result<Url, RouteError> {
        let token = self.token()?;
        let query = query.trim();
        if query.is_empty() {
            return Err(RouteError::EmptyQuery);
        }
        let mut url = self.base()?;
        url.path_segments_mut()
            .map_err(|_| RouteError::Msg(format!("base url {} cannot carry a path", self.cfg.base_url)))?
            .pop_if_empty()
            .extend(["geocoding", "v5", "mapbox.places"])
            .push(&format!("{query}.json"));
        url.query_pairs_mut()
            .append_pair("access_token", token)
            .append_pair("limit", "1");
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, RouteError> {
        // never log the query string, it carries the token
        let path = url.path().to_string();
        debug!(%path, "mapbox request");
        let resp = self.http.get(url).send().await.with_context(|| format!("GET {path}"))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RouteError::Status { status: status.as_u16(), url: path });
        }
        let body = resp.json::<T>().await.with_context(|| format!("decode {path}"))?;
        Ok(body)
    }
}

#[async_trait::async_trait]
impl DirectionsSource for MapboxClient {
    async fn directions(&self, origin: Coord, destination: Coord, mode: RouteMode)
        -> Result<DirectionsResponse, RouteError>
    {
        let url = self.directions_url(origin, destination, mode)?;
        self.get_json(url).await
    }
}

#[async_trait::async_trait]
impl Geocoder for MapboxClient {
    async fn geocode(&self, query: &str) -> Result<GeocodeResponse, RouteError> {
        let url = self.geocode_url(query)?;
        self.get_json(url).await
    }
}
