use crate::config::AppConfig;
use anyhow::Result;
use fleet_animator::{FleetAnimator, HeadlessSurface, ListenerId};
use fleet_model::*;
use fleet_route_core::DirectionsSource;
use fleet_route_mapbox::MapboxClient;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{path::Path, sync::Arc};
use tracing::{info, warn};

/// One headless run: the animator, its map stand-in and the recorded ticks.
pub struct SimSession {
    pub animator: FleetAnimator,
    pub surface: Arc<HeadlessSurface>,
    pub recording: Arc<Mutex<Vec<Vec<TrackedVehicle>>>>,
    cfg: AppConfig,
    rng: StdRng,
    recorder: Option<ListenerId>,
}

impl SimSession {
    pub fn new(cfg: AppConfig) -> Result<Self> {
        let directions = directions_for(&cfg)?;
        let animator = FleetAnimator::new(cfg.animator.clone(), directions);
        let surface = Arc::new(HeadlessSurface::new(Some(cfg.animator.destination_bounds)));
        animator.attach_surface(surface.clone());

        let rng = match cfg.animator.seed {
            // offset so start speeds do not mirror the engine's own draws
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        Ok(Self { animator, surface, recording: Arc::default(), cfg, rng, recorder: None })
    }

    fn start_speed(&mut self) -> f64 {
        let (lo, hi) = (self.cfg.run.min_start_speed, self.cfg.run.max_start_speed);
        if hi > lo { self.rng.gen_range(lo..hi) } else { lo }
    }

    /// Loads a simulation file and sends every vehicle to its first trip destination.
    pub fn load_simulation(&mut self, path: &Path) -> Result<usize> {
        let vehicles = iox::load_simulation(path, &self.cfg.projection)?;
        let mut added = 0;
        for sv in vehicles {
            let mut init = sv.init;
            init.speed = Some(self.start_speed());
            let id = match self.animator.add_vehicle(init) {
                Ok(id) => id,
                Err(err) => {
                    warn!(error = %err, "skipping simulation vehicle");
                    continue;
                }
            };
            if let Some(dest) = sv.destinations.first() {
                self.animator.navigate(&id, *dest)?;
            }
            added += 1;
        }
        info!(vehicles = added, path = %path.display(), "simulation loaded");
        Ok(added)
    }

    /// Spawns `n` roaming vehicles at random spots inside the destination bounds.
    pub fn spawn_random(&mut self, n: usize) -> Result<usize> {
        let b = self.cfg.animator.destination_bounds;
        for i in 0..n {
            let position = [
                self.rng.gen_range(b.west..=b.east),
                self.rng.gen_range(b.south..=b.north),
            ];
            let init = VehicleInit {
                id: Some(format!("ev-{i}")),
                name: format!("EV {}", i + 1),
                position,
                battery_level: Some(self.rng.gen_range(40.0..=100.0)),
                speed: Some(self.start_speed()),
                ..Default::default()
            };
            self.animator.add_vehicle(init)?;
        }
        info!(vehicles = n, "random fleet spawned");
        Ok(n)
    }

    pub fn start_recording(&mut self) {
        let rec = self.recording.clone();
        self.recorder = Some(self.animator.add_listener(move |vs| rec.lock().push(vs.to_vec())));
    }

    pub fn stop_recording(&mut self) {
        if let Some(id) = self.recorder.take() {
            self.animator.remove_listener(id);
        }
    }

    pub fn log_stats(&self) {
        let s = self.animator.stats();
        info!(
            total = s.total,
            moving = s.moving,
            stopped = s.stopped,
            avg_battery = format_args!("{:.2}", s.average_battery),
            camera_moves = self.surface.transitions().len(),
            "fleet"
        );
    }
}

fn directions_for(cfg: &AppConfig) -> Result<Option<Arc<dyn DirectionsSource>>> {
    let mapbox = cfg.mapbox.clone().with_env_token();
    if mapbox.access_token.is_none() {
        warn!("no directions token, vehicles will drive straight-line routes");
        return Ok(None);
    }
    Ok(Some(Arc::new(MapboxClient::new(mapbox)?)))
}
