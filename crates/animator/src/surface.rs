use fleet_model::{Bounds, CameraTransition, Coord, FeatureCollection};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// The map the animator draws on. Creation and teardown belong to the host;
/// the animator only pushes vehicle features and camera moves.
pub trait MapSurface: Send + Sync {
    /// False until the host map has finished loading; calls are skipped until then.
    fn is_ready(&self) -> bool;
    fn bounds(&self) -> Option<Bounds>;
    fn center(&self) -> Option<Coord>;
    fn set_vehicle_data(&self, features: &FeatureCollection);
    fn ease_to(&self, transition: &CameraTransition);
}

/// In-memory surface for headless runs: keeps the latest features and every
/// camera move, and jumps its center to each eased pose.
pub struct HeadlessSurface {
    ready: AtomicBool,
    bounds: Option<Bounds>,
    state: Mutex<HeadlessState>,
}

#[derive(Default)]
struct HeadlessState {
    center: Option<Coord>,
    features: Option<FeatureCollection>,
    feature_updates: usize,
    transitions: Vec<CameraTransition>,
}

impl HeadlessSurface {
    pub fn new(bounds: Option<Bounds>) -> Self {
        Self { ready: AtomicBool::new(true), bounds, state: Mutex::new(HeadlessState::default()) }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_center(&self, center: Coord) {
        self.state.lock().center = Some(center);
    }

    pub fn features(&self) -> Option<FeatureCollection> {
        self.state.lock().features.clone()
    }

    pub fn feature_updates(&self) -> usize {
        self.state.lock().feature_updates
    }

    pub fn transitions(&self) -> Vec<CameraTransition> {
        self.state.lock().transitions.clone()
    }

    pub fn last_transition(&self) -> Option<CameraTransition> {
        self.state.lock().transitions.last().copied()
    }
}

impl MapSurface for HeadlessSurface {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    fn center(&self) -> Option<Coord> {
        self.state.lock().center
    }

    fn set_vehicle_data(&self, features: &FeatureCollection) {
        let mut st = self.state.lock();
        st.features = Some(features.clone());
        st.feature_updates += 1;
    }

    fn ease_to(&self, transition: &CameraTransition) {
        let mut st = self.state.lock();
        st.center = Some(transition.pose.center);
        st.transitions.push(*transition);
    }
}
