//! Camera follow: per-mode target poses for the followed vehicle.

use crate::config::CameraConfig;
use fleet_model::{CameraMode, CameraPose, CameraTransition, Coord, TrackedVehicle};
use tracing::debug;

pub fn ease_duration_ms(mode: CameraMode) -> u64 {
    match mode {
        CameraMode::Driving => 100,
        CameraMode::Chase => 200,
        CameraMode::TopDown => 300,
        CameraMode::BirdsEye => 400,
        CameraMode::Overview => 1_000,
    }
}

/// Target pose for `mode` relative to `vehicle`.
pub fn camera_pose(mode: CameraMode, vehicle: &TrackedVehicle, chase_offset_deg: f64) -> CameraPose {
    let heading = vehicle.heading;
    let center = vehicle.position;
    match mode {
        CameraMode::Driving => CameraPose { center, zoom: 18.0, bearing: heading, pitch: 60.0 },
        CameraMode::Chase => {
            let h = heading.to_radians();
            let behind = [center[0] - h.sin() * chase_offset_deg, center[1] - h.cos() * chase_offset_deg];
            CameraPose { center: behind, zoom: 16.0, bearing: heading, pitch: 45.0 }
        }
        CameraMode::TopDown => CameraPose { center, zoom: 17.0, bearing: 0.0, pitch: 0.0 },
        CameraMode::BirdsEye => CameraPose { center, zoom: 14.0, bearing: heading, pitch: 30.0 },
        CameraMode::Overview => CameraPose { center, zoom: 13.0, bearing: 0.0, pitch: 0.0 },
    }
}

#[derive(Debug, Clone)]
pub struct CameraController {
    cfg: CameraConfig,
    followed: Option<String>,
    mode: CameraMode,
    // remaining hands-off time after manual map interaction
    suspended_ms: f64,
}

impl CameraController {
    pub fn new(cfg: CameraConfig) -> Self {
        Self { cfg, followed: None, mode: CameraMode::Overview, suspended_ms: 0.0 }
    }

    pub fn follow(&mut self, vehicle_id: impl Into<String>, mode: CameraMode) {
        self.followed = Some(vehicle_id.into());
        self.mode = mode;
        self.suspended_ms = 0.0;
    }

    pub fn stop_following(&mut self) {
        self.followed = None;
        self.mode = CameraMode::Overview;
    }

    /// Switches mode; applies from the next update without re-following.
    pub fn set_mode(&mut self, mode: CameraMode) {
        self.mode = mode;
        self.suspended_ms = 0.0;
    }

    /// The user moved the map by hand: back off for the configured delay.
    pub fn notify_user_interaction(&mut self) {
        if self.followed.is_some() {
            self.suspended_ms = self.cfg.resume_after_ms as f64;
            debug!(resume_after_ms = self.cfg.resume_after_ms, "camera yielded to user");
        }
    }

    pub fn followed(&self) -> Option<&str> {
        self.followed.as_deref()
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended_ms > 0.0
    }

    /// One camera step. `vehicle` is the followed vehicle if it still exists;
    /// `current_center` is where the map is looking right now, when known.
    pub fn update(
        &mut self,
        elapsed_ms: f64,
        vehicle: Option<&TrackedVehicle>,
        current_center: Option<Coord>,
    ) -> Option<CameraTransition> {
        if self.suspended_ms > 0.0 {
            self.suspended_ms = (self.suspended_ms - elapsed_ms).max(0.0);
            return None;
        }
        let vehicle = vehicle?;
        if self.mode == CameraMode::Overview {
            if let Some(c) = current_center {
                let threshold = self.cfg.overview_threshold_deg;
                let drifted = (c[0] - vehicle.position[0]).abs() > threshold
                    || (c[1] - vehicle.position[1]).abs() > threshold;
                if !drifted {
                    return None;
                }
            }
        }
        Some(CameraTransition {
            pose: camera_pose(self.mode, vehicle, self.cfg.chase_offset_deg),
            duration_ms: ease_duration_ms(self.mode),
        })
    }
}
