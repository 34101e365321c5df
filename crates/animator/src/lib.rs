//! Fleet animation engine: moves tracked vehicles along routes, drives a map
//! camera and fans out per-tick snapshots.

pub mod broadcast;
pub mod camera;
pub mod config;
pub mod engine;
pub mod planner;
pub mod surface;

pub use broadcast::{Broadcaster, ListenerId};
pub use config::{AnimatorConfig, CameraConfig};
pub use engine::{Engine, TickOutput};
pub use surface::{HeadlessSurface, MapSurface};

use fleet_model::*;
use fleet_route_core::{guidance::Announcement, DirectionsSource};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum AnimatorError {
    #[error(transparent)]
    InvalidVehicle(#[from] ModelError),
    #[error("vehicle {0} already tracked")]
    DuplicateVehicle(String),
    #[error("unknown vehicle {0}")]
    UnknownVehicle(String),
    #[error("invalid destination [{0}, {1}]")]
    InvalidDestination(f64, f64),
    #[error("animation loop needs a tokio runtime")]
    NoRuntime,
}

struct Shared {
    engine: Mutex<Engine>,
    listeners: Broadcaster<TrackedVehicle>,
    guidance: Broadcaster<Announcement>,
    surface: Mutex<Option<Arc<dyn MapSurface>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    tick_interval: Duration,
}

/// Handle to one animation engine. Clones share the same engine.
#[derive(Clone)]
pub struct FleetAnimator {
    shared: Arc<Shared>,
}

impl FleetAnimator {
    pub fn new(cfg: AnimatorConfig, directions: Option<Arc<dyn DirectionsSource>>) -> Self {
        let tick_interval = Duration::from_millis(cfg.tick_interval_ms.max(1));
        Self {
            shared: Arc::new(Shared {
                engine: Mutex::new(Engine::new(cfg, directions)),
                listeners: Broadcaster::default(),
                guidance: Broadcaster::default(),
                surface: Mutex::new(None),
                task: Mutex::new(None),
                tick_interval,
            }),
        }
    }

    pub fn attach_surface(&self, surface: Arc<dyn MapSurface>) {
        *self.shared.surface.lock() = Some(surface);
    }

    pub fn detach_surface(&self) {
        *self.shared.surface.lock() = None;
    }

    fn ready_surface(&self) -> Option<Arc<dyn MapSurface>> {
        self.shared.surface.lock().clone().filter(|s| s.is_ready())
    }

    fn surface_bounds(&self) -> Option<Bounds> {
        self.ready_surface().and_then(|s| s.bounds())
    }

    fn push_features(&self, vehicles: &[TrackedVehicle]) {
        if let Some(s) = self.ready_surface() {
            s.set_vehicle_data(&FeatureCollection::from_vehicles(vehicles));
        }
    }

    pub fn add_vehicle(&self, init: VehicleInit) -> Result<String, AnimatorError> {
        let bounds = self.surface_bounds();
        let (id, snapshot) = {
            let mut engine = self.shared.engine.lock();
            let id = engine.add_vehicle(init, bounds)?;
            (id, engine.vehicles().to_vec())
        };
        self.push_features(&snapshot);
        Ok(id)
    }

    pub fn remove_vehicle(&self, id: &str) -> bool {
        self.shared.engine.lock().remove_vehicle(id)
    }

    pub fn clear(&self) {
        self.shared.engine.lock().clear();
        self.push_features(&[]);
    }

    pub fn set_moving(&self, id: &str, moving: bool) -> Result<(), AnimatorError> {
        let bounds = self.surface_bounds();
        self.shared.engine.lock().set_moving(id, moving, bounds)
    }

    pub fn navigate(&self, id: &str, destination: Coord) -> Result<(), AnimatorError> {
        self.shared.engine.lock().navigate(id, destination)
    }

    pub fn navigate_named(&self, id: &str, destination: Coord, name: Option<&str>) -> Result<(), AnimatorError> {
        self.shared.engine.lock().navigate_named(id, destination, name)
    }

    pub fn follow_vehicle(&self, id: &str, mode: CameraMode) {
        self.shared.engine.lock().follow_vehicle(id, mode);
    }

    pub fn stop_following(&self) {
        self.shared.engine.lock().stop_following();
    }

    pub fn set_camera_mode(&self, mode: CameraMode) {
        self.shared.engine.lock().set_camera_mode(mode);
    }

    /// Call when the user drags or zooms the map by hand.
    pub fn notify_user_interaction(&self) {
        self.shared.engine.lock().notify_user_interaction();
    }

    pub fn vehicles(&self) -> Vec<TrackedVehicle> {
        self.shared.engine.lock().vehicles().to_vec()
    }

    pub fn vehicle(&self, id: &str) -> Option<TrackedVehicle> {
        self.shared.engine.lock().vehicle(id).cloned()
    }

    pub fn stats(&self) -> FleetStats {
        self.shared.engine.lock().stats()
    }

    pub fn add_listener<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&[TrackedVehicle]) + Send + Sync + 'static,
    {
        self.shared.listeners.add_listener(f)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove_listener(id)
    }

    /// Called with the guidance announcements of a tick, when there are any.
    pub fn add_guidance_listener<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&[Announcement]) + Send + Sync + 'static,
    {
        self.shared.guidance.add_listener(f)
    }

    pub fn remove_guidance_listener(&self, id: ListenerId) -> bool {
        self.shared.guidance.remove_listener(id)
    }

    /// Runs one tick synchronously: state update, map push, camera, broadcast.
    /// Hosts with their own frame callback can call this directly instead of
    /// [`start_animation`](Self::start_animation).
    pub fn tick(&self, elapsed: Duration) {
        let surface = self.ready_surface();
        let bounds = surface.as_ref().and_then(|s| s.bounds());
        let center = surface.as_ref().and_then(|s| s.center());

        // the engine lock is released before any host callback runs
        let out = self.shared.engine.lock().step(elapsed, bounds, center);

        if let Some(s) = &surface {
            s.set_vehicle_data(&FeatureCollection::from_vehicles(&out.snapshot));
            if let Some(t) = &out.camera {
                s.ease_to(t);
            }
        }
        self.shared.listeners.broadcast(&out.snapshot);
        if !out.announcements.is_empty() {
            self.shared.guidance.broadcast(&out.announcements);
        }
    }

    /// Spawns the tick loop on the current tokio runtime. No-op when already running.
    pub fn start_animation(&self) -> Result<(), AnimatorError> {
        let mut task = self.shared.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| AnimatorError::NoRuntime)?;
        let period = self.shared.tick_interval;
        let this = self.clone();
        info!(tick_ms = period.as_millis() as u64, "animation started");
        *task = Some(handle.spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;
            let mut last = Instant::now();
            loop {
                interval.tick().await;
                let now = Instant::now();
                this.tick(now - last);
                last = now;
            }
        }));
        Ok(())
    }

    /// Cancels the loop; vehicles keep their last computed state.
    pub fn stop_animation(&self) {
        if let Some(task) = self.shared.task.lock().take() {
            task.abort();
            info!("animation stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the loop and drops every vehicle, every listener and the map surface.
    pub fn dispose(&self) {
        self.stop_animation();
        self.clear();
        self.shared.listeners.clear();
        self.shared.guidance.clear();
        self.detach_surface();
    }
}
