use crate::{camera::CameraController, config::AnimatorConfig, planner::RoutePlanner, AnimatorError};
use fleet_geo::{heading_deg, lerp_coord};
use fleet_model::*;
use fleet_route_core::{
    create_straight_line_route,
    guidance::{generate_instructions, Announcement, InstructionTracker},
    DirectionsSource, RouteUpdate,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, info, trace, warn};

/// Result of one tick: the post-update snapshot, the camera move and any
/// guidance announcements.
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub snapshot: Vec<TrackedVehicle>,
    pub camera: Option<CameraTransition>,
    pub announcements: Vec<Announcement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Skipped,
    Moved,
    Arrived,
}

/// Synchronous animation state. Owns every tracked vehicle, the route
/// planner, the camera controller and the random source.
pub struct Engine {
    cfg: AnimatorConfig,
    vehicles: Vec<TrackedVehicle>,
    planner: RoutePlanner,
    camera: CameraController,
    rng: StdRng,
    // navigation destination names, until their route arrives
    trip_names: HashMap<String, String>,
    guidance: HashMap<String, InstructionTracker>,
}

impl Engine {
    pub fn new(cfg: AnimatorConfig, directions: Option<Arc<dyn DirectionsSource>>) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            planner: RoutePlanner::new(directions, cfg.route_mode),
            camera: CameraController::new(cfg.camera.clone()),
            vehicles: Vec::new(),
            rng,
            trip_names: HashMap::new(),
            guidance: HashMap::new(),
            cfg,
        }
    }

    /// Adds a vehicle. One without a usable route gets one requested if it is
    /// supposed to be moving. Returns the vehicle id.
    pub fn add_vehicle(&mut self, init: VehicleInit, map_bounds: Option<Bounds>) -> Result<String, AnimatorError> {
        let mut v = TrackedVehicle::from_init(init)?;
        if self.vehicles.iter().any(|o| o.id == v.id) {
            return Err(AnimatorError::DuplicateVehicle(v.id));
        }
        if v.is_moving && !v.has_route() {
            let dest = self.random_destination(map_bounds);
            v.awaiting_route = true;
            self.planner.request(&v.id, v.position, dest);
        }
        debug!(vehicle = %v.id, name = %v.name, state = ?v.state(), "vehicle added");
        let id = v.id.clone();
        self.vehicles.push(v);
        Ok(id)
    }

    pub fn remove_vehicle(&mut self, id: &str) -> bool {
        self.planner.cancel(id);
        self.trip_names.remove(id);
        self.guidance.remove(id);
        let before = self.vehicles.len();
        self.vehicles.retain(|v| v.id != id);
        before != self.vehicles.len()
    }

    pub fn clear(&mut self) {
        self.planner.cancel_all();
        self.vehicles.clear();
        self.trip_names.clear();
        self.guidance.clear();
    }

    /// Starts or pauses a vehicle. A paused vehicle keeps any pending route
    /// request and stays put when the answer lands. Resuming without a route,
    /// or at the end of a finished trip, requests a fresh one and roams.
    pub fn set_moving(&mut self, id: &str, moving: bool, map_bounds: Option<Bounds>) -> Result<(), AnimatorError> {
        let dest = self.random_destination(map_bounds);
        let v = self.vehicle_mut(id)?;
        v.is_moving = moving;
        if !moving || v.awaiting_route {
            return Ok(());
        }
        let trip_done = v.has_route() && v.route_progress >= v.max_progress();
        if trip_done {
            v.on_arrival = ArrivalPolicy::Reroute;
            v.route.clear();
        }
        if !v.has_route() {
            v.awaiting_route = true;
            v.route_progress = 0.0;
            let pos = v.position;
            self.planner.request(id, pos, dest);
        }
        if trip_done {
            self.guidance.remove(id);
        }
        Ok(())
    }

    /// One-shot trip: route from the current position to `destination` and
    /// park there on arrival.
    pub fn navigate(&mut self, id: &str, destination: Coord) -> Result<(), AnimatorError> {
        self.navigate_named(id, destination, None)
    }

    /// [`navigate`](Self::navigate) with a place name for guidance messages.
    pub fn navigate_named(&mut self, id: &str, destination: Coord, name: Option<&str>) -> Result<(), AnimatorError> {
        if !is_valid_coordinate(destination) {
            return Err(AnimatorError::InvalidDestination(destination[0], destination[1]));
        }
        let v = self.vehicle_mut(id)?;
        v.on_arrival = ArrivalPolicy::Stop;
        v.is_moving = true;
        v.awaiting_route = true;
        v.route_progress = 0.0;
        let (id, pos) = (v.id.clone(), v.position);
        info!(vehicle = %id, ?destination, "navigation started");
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => n.to_string(),
            None => format!("{:.5}, {:.5}", destination[1], destination[0]),
        };
        self.guidance.remove(&id);
        self.trip_names.insert(id.clone(), name);
        self.planner.request(&id, pos, destination);
        Ok(())
    }

    pub fn follow_vehicle(&mut self, id: &str, mode: CameraMode) {
        info!(vehicle = id, ?mode, "following vehicle");
        self.camera.follow(id, mode);
    }

    pub fn stop_following(&mut self) {
        self.camera.stop_following();
    }

    pub fn set_camera_mode(&mut self, mode: CameraMode) {
        self.camera.set_mode(mode);
    }

    pub fn notify_user_interaction(&mut self) {
        self.camera.notify_user_interaction();
    }

    pub fn camera(&self) -> &CameraController {
        &self.camera
    }

    pub fn vehicle(&self, id: &str) -> Option<&TrackedVehicle> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    pub fn vehicles(&self) -> &[TrackedVehicle] {
        &self.vehicles
    }

    pub fn stats(&self) -> FleetStats {
        FleetStats::from_vehicles(&self.vehicles)
    }

    pub fn pending_routes(&self) -> usize {
        self.planner.pending()
    }

    fn vehicle_mut(&mut self, id: &str) -> Result<&mut TrackedVehicle, AnimatorError> {
        self.vehicles
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| AnimatorError::UnknownVehicle(id.to_string()))
    }

    fn random_destination(&mut self, map_bounds: Option<Bounds>) -> Coord {
        let b = map_bounds.unwrap_or(self.cfg.destination_bounds);
        [
            b.west + self.rng.gen::<f64>() * (b.east - b.west),
            b.south + self.rng.gen::<f64>() * (b.north - b.south),
        ]
    }

    /// Advances the simulation by `elapsed`: applies finished routes, moves
    /// every vehicle, then works out the camera.
    pub fn step(&mut self, elapsed: Duration, map_bounds: Option<Bounds>, map_center: Option<Coord>) -> TickOutput {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        for update in self.planner.drain() {
            self.apply_route(update);
        }

        let mut announcements = Vec::new();
        for i in 0..self.vehicles.len() {
            let step = advance(&mut self.vehicles[i], elapsed_ms, &self.cfg, &mut self.rng);
            if step != Step::Skipped {
                self.announce(i, &mut announcements);
            }
            if step == Step::Arrived {
                self.arrive(i, map_bounds);
            }
        }

        let followed = self.camera.followed().and_then(|id| self.vehicles.iter().find(|v| v.id == id));
        let camera = self.camera.update(elapsed_ms, followed, map_center);
        trace!(elapsed_ms, vehicles = self.vehicles.len(), camera = camera.is_some(), "tick");

        TickOutput { snapshot: self.vehicles.clone(), camera, announcements }
    }

    fn apply_route(&mut self, update: RouteUpdate) {
        let Some(v) = self.vehicles.iter_mut().find(|v| v.id == update.vehicle_id) else {
            return;
        };
        if !v.awaiting_route {
            return;
        }
        let mut route = update.result.route;
        if route.len() < 2 {
            warn!(vehicle = %v.id, points = route.len(), "route too short, using straight-line route");
            route = create_straight_line_route(v.position, update.destination).route;
        }
        debug!(
            vehicle = %v.id,
            points = route.len(),
            distance_m = update.result.distance_m,
            synthetic = update.result.synthetic,
            "route assigned"
        );
        v.route = route;
        v.route_progress = 0.0;
        v.awaiting_route = false;

        let name = self.trip_names.remove(&v.id);
        if v.on_arrival == ArrivalPolicy::Stop && self.cfg.announce_guidance {
            let name = name.unwrap_or_else(|| "destination".into());
            let tracker = InstructionTracker::new(generate_instructions(&v.route, &name));
            debug!(vehicle = %v.id, instructions = tracker.instructions().len(), "guidance ready");
            self.guidance.insert(v.id.clone(), tracker);
        }
    }

    fn announce(&mut self, i: usize, out: &mut Vec<Announcement>) {
        let v = &self.vehicles[i];
        let Some(tracker) = self.guidance.get_mut(&v.id) else {
            return;
        };
        for a in tracker.check(&v.id, v.position) {
            info!(vehicle = %a.vehicle_id, distance_m = a.distance_m.round(), "{}", a.text);
            out.push(a);
        }
    }

    fn arrive(&mut self, i: usize, map_bounds: Option<Bounds>) {
        match self.vehicles[i].on_arrival {
            ArrivalPolicy::Reroute => {
                let dest = self.random_destination(map_bounds);
                let v = &mut self.vehicles[i];
                v.route_progress = 0.0;
                v.awaiting_route = true;
                self.planner.request(&v.id, v.position, dest);
            }
            ArrivalPolicy::Stop => {
                let v = &mut self.vehicles[i];
                v.route_progress = v.max_progress();
                v.is_moving = false;
                self.guidance.remove(&v.id);
                info!(vehicle = %v.id, position = ?v.position, "arrived");
            }
        }
    }
}

/// Moves one vehicle along its route.
fn advance(v: &mut TrackedVehicle, elapsed_ms: f64, cfg: &AnimatorConfig, rng: &mut StdRng) -> Step {
    if !v.is_moving || v.awaiting_route || !v.has_route() {
        return Step::Skipped;
    }

    v.route_progress += (v.speed / cfg.reference_speed) * (elapsed_ms / 1000.0);

    let n = v.route.len();
    if v.route_progress >= v.max_progress() {
        // park on the final waypoint; the caller decides what happens next
        v.position = v.route[n - 1];
        v.heading = heading_deg(v.route[n - 2], v.route[n - 1]);
        return Step::Arrived;
    }

    let idx = v.route_progress.floor() as usize;
    let ratio = v.route_progress - idx as f64;
    let (a, b) = (v.route[idx], v.route[idx + 1]);
    v.position = lerp_coord(a, b, ratio);
    v.heading = heading_deg(a, b);

    if rng.gen::<f64>() < cfg.speed_jitter_probability {
        let delta = (rng.gen::<f64>() - 0.5) * cfg.speed_jitter_span;
        v.speed = (v.speed + delta).clamp(cfg.min_speed, cfg.max_speed);
    }
    v.battery_level = (v.battery_level - cfg.battery_drain_per_tick).max(0.0);
    Step::Moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TICK: Duration = Duration::from_millis(100);

    fn quiet_config() -> AnimatorConfig {
        AnimatorConfig { speed_jitter_probability: 0.0, seed: Some(7), ..Default::default() }
    }

    fn init(id: &str, route: Vec<Coord>, speed: f64) -> VehicleInit {
        VehicleInit {
            id: Some(id.into()),
            name: id.to_uppercase(),
            position: route.first().copied().unwrap_or([-73.98, 40.75]),
            speed: Some(speed),
            route: Some(route),
            ..Default::default()
        }
    }

    fn on_segment(p: Coord, a: Coord, b: Coord) -> bool {
        let cross = (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0]);
        let within = |k: usize| p[k] >= a[k].min(b[k]) - 1e-12 && p[k] <= a[k].max(b[k]) + 1e-12;
        cross.abs() < 1e-12 && within(0) && within(1)
    }

    fn zigzag() -> Vec<Coord> {
        vec![[-73.99, 40.73], [-73.98, 40.735], [-73.975, 40.74], [-73.97, 40.738], [-73.96, 40.75]]
    }

    #[test]
    fn position_stays_on_current_segment() {
        let cfg = AnimatorConfig { seed: Some(42), ..Default::default() };
        let mut e = Engine::new(cfg, None);
        e.add_vehicle(init("a", zigzag(), 35.0), None).unwrap();

        for _ in 0..500 {
            e.step(TICK, None, None);
            let v = e.vehicle("a").unwrap();
            if v.awaiting_route || v.route_progress == 0.0 {
                continue;
            }
            let idx = v.route_progress.floor() as usize;
            assert!(v.route_progress <= v.max_progress());
            assert!(on_segment(v.position, v.route[idx], v.route[idx + 1]), "{:?} off segment {idx}", v.position);
            assert!((10.0..=70.0).contains(&v.speed));
        }
    }

    #[test]
    fn progress_increases_at_constant_speed() {
        let mut e = Engine::new(quiet_config(), None);
        e.add_vehicle(init("a", zigzag(), 20.0), None).unwrap();
        let mut last = 0.0;
        for _ in 0..10 {
            e.step(TICK, None, None);
            let p = e.vehicle("a").unwrap().route_progress;
            assert!(p > last);
            assert_relative_eq!(p - last, 20.0 / 50.0 * 0.1, epsilon = 1e-9);
            last = p;
        }
    }

    #[test]
    fn end_of_route_resets_and_reroutes() {
        let route = vec![[-73.99, 40.73], [-73.98, 40.74], [-73.97, 40.75]];
        let mut e = Engine::new(quiet_config(), None);
        e.add_vehicle(init("a", route.clone(), 50.0), None).unwrap();

        // one segment per second
        e.step(Duration::from_secs(1), None, None);
        assert_eq!(e.vehicle("a").unwrap().position, route[1]);

        e.step(Duration::from_secs(1), None, None);
        let v = e.vehicle("a").unwrap();
        assert_eq!(v.route_progress, 0.0);
        assert!(v.awaiting_route);
        assert_eq!(v.state(), VehicleState::AwaitingRoute);
        assert_eq!(v.position, route[2]);

        // the fallback route is picked up before any further movement
        let out = e.step(Duration::from_millis(0), None, None);
        let v = &out.snapshot[0];
        assert!(!v.awaiting_route);
        assert_eq!(v.route[0], route[2]);
        assert!(v.route.len() >= 6);
        assert!(Bounds::default().contains(*v.route.last().unwrap()));
    }

    #[test]
    fn paused_vehicle_does_not_move() {
        let mut e = Engine::new(quiet_config(), None);
        e.add_vehicle(init("a", zigzag(), 50.0), None).unwrap();
        e.set_moving("a", false, None).unwrap();
        let before = e.vehicle("a").unwrap().clone();
        e.step(Duration::from_secs(1), None, None);
        assert_eq!(e.vehicle("a").unwrap(), &before);
    }

    #[test]
    fn short_route_is_a_noop() {
        let mut e = Engine::new(quiet_config(), None);
        let mut i = init("a", vec![[-73.9, 40.7]], 50.0);
        i.is_moving = Some(false);
        e.add_vehicle(i, None).unwrap();
        let before = e.vehicle("a").unwrap().clone();
        e.step(Duration::from_secs(1), None, None);
        assert_eq!(e.vehicle("a").unwrap(), &before);
    }

    #[test]
    fn battery_never_negative() {
        let cfg = AnimatorConfig { battery_drain_per_tick: 0.4, ..quiet_config() };
        let mut e = Engine::new(cfg, None);
        let mut i = init("a", zigzag(), 1.0);
        i.battery_level = Some(1.0);
        e.add_vehicle(i, None).unwrap();
        for _ in 0..20 {
            e.step(TICK, None, None);
            assert!(e.vehicle("a").unwrap().battery_level >= 0.0);
        }
        assert_eq!(e.vehicle("a").unwrap().battery_level, 0.0);
    }

    #[test]
    fn missing_route_is_requested_on_add() {
        let mut e = Engine::new(quiet_config(), None);
        let bounds = Bounds { west: 2.0, south: 48.0, east: 2.5, north: 49.0 };
        let id = e.add_vehicle(VehicleInit::new("Paris cab", [2.35, 48.85]), Some(bounds)).unwrap();
        assert_eq!(e.vehicle(&id).unwrap().state(), VehicleState::AwaitingRoute);
        assert_eq!(e.pending_routes(), 1);

        e.step(TICK, None, None);
        let v = e.vehicle(&id).unwrap();
        assert!(v.has_route());
        assert!(bounds.contains(*v.route.last().unwrap()));
        assert_eq!(v.route[0], [2.35, 48.85]);
    }

    #[test]
    fn navigation_parks_at_destination() {
        let mut e = Engine::new(quiet_config(), None);
        let mut i = VehicleInit::new("Van", [-73.99, 40.73]);
        i.id = Some("van".into());
        i.is_moving = Some(false);
        i.speed = Some(60.0);
        e.add_vehicle(i, None).unwrap();
        let dest = [-73.96, 40.76];
        e.navigate("van", dest).unwrap();

        for _ in 0..200 {
            e.step(Duration::from_millis(500), None, None);
        }
        let v = e.vehicle("van").unwrap();
        assert!(!v.is_moving);
        assert_eq!(v.position, dest);
        assert_eq!(v.route_progress, v.max_progress());
        assert_eq!(v.state(), VehicleState::Idle);
        assert_eq!(e.pending_routes(), 0);
    }

    #[test]
    fn paused_vehicle_stays_put_when_its_route_lands() {
        let mut e = Engine::new(quiet_config(), None);
        let id = e.add_vehicle(VehicleInit::new("Cab", [-73.99, 40.73]), None).unwrap();
        e.set_moving(&id, false, None).unwrap();

        for _ in 0..3 {
            e.step(TICK, None, None);
        }
        let v = e.vehicle(&id).unwrap();
        assert!(!v.is_moving);
        assert!(v.has_route());
        assert_eq!(v.position, [-73.99, 40.73]);
        assert_eq!(v.route_progress, 0.0);
        assert_eq!(v.state(), VehicleState::Idle);

        e.set_moving(&id, true, None).unwrap();
        assert_eq!(e.pending_routes(), 0);
        e.step(TICK, None, None);
        assert!(e.vehicle(&id).unwrap().route_progress > 0.0);
    }

    #[test]
    fn single_point_answer_becomes_straight_line() {
        let mut e = Engine::new(quiet_config(), None);
        let id = e.add_vehicle(init("a", zigzag(), 30.0), None).unwrap();
        let dest = [-73.95, 40.76];
        e.navigate(&id, dest).unwrap();
        e.apply_route(RouteUpdate {
            vehicle_id: id.clone(),
            request_id: 0,
            destination: dest,
            result: fleet_route_core::RouteResult {
                route: vec![[-73.99, 40.73]],
                distance_m: 0.0,
                duration_s: 0.0,
                instructions: vec![],
                synthetic: false,
            },
        });
        let v = e.vehicle(&id).unwrap();
        assert!(!v.awaiting_route);
        assert!(v.route.len() >= 6);
        assert_eq!(*v.route.last().unwrap(), dest);

        e.step(TICK, None, None);
        assert!(e.vehicle(&id).unwrap().route_progress > 0.0);
    }

    #[test]
    fn parked_vehicle_can_resume_roaming() {
        let mut e = Engine::new(quiet_config(), None);
        let mut i = VehicleInit::new("Van", [-73.99, 40.73]);
        i.id = Some("van".into());
        i.speed = Some(60.0);
        i.is_moving = Some(false);
        e.add_vehicle(i, None).unwrap();
        e.navigate("van", [-73.985, 40.735]).unwrap();
        for _ in 0..100 {
            e.step(Duration::from_millis(500), None, None);
        }
        assert!(!e.vehicle("van").unwrap().is_moving);

        e.set_moving("van", true, None).unwrap();
        let v = e.vehicle("van").unwrap();
        assert_eq!(v.on_arrival, ArrivalPolicy::Reroute);
        assert_eq!(v.state(), VehicleState::AwaitingRoute);

        e.step(TICK, None, None);
        let v = e.vehicle("van").unwrap();
        assert!(v.is_moving);
        assert!(v.route_progress > 0.0 && v.route_progress < v.max_progress());
        assert_eq!(v.route[0], [-73.985, 40.735]);
    }

    #[test]
    fn navigation_announces_guidance_once() {
        let mut e = Engine::new(quiet_config(), None);
        let mut i = VehicleInit::new("Van", [-73.99, 40.73]);
        i.id = Some("van".into());
        i.speed = Some(70.0);
        i.is_moving = Some(false);
        e.add_vehicle(i, None).unwrap();
        e.navigate_named("van", [-73.99, 40.76], Some(" Pier 17 ")).unwrap();

        let mut heard = Vec::new();
        for _ in 0..400 {
            heard.extend(e.step(Duration::from_millis(500), None, None).announcements);
        }
        assert!(!e.vehicle("van").unwrap().is_moving);
        let ids: Vec<_> = heard.iter().map(|a| a.instruction_id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"start"));
        assert_eq!(ids.last(), Some(&"arrive"));
        assert_eq!(ids.iter().filter(|id| **id == "arrive").count(), 1);
        assert_eq!(heard.last().unwrap().text, "Arriving at Pier 17");
        assert!(heard.iter().all(|a| a.vehicle_id == "van"));

        // roaming vehicles get no guidance
        e.add_vehicle(init("r", zigzag(), 30.0), None).unwrap();
        assert!(e.step(TICK, None, None).announcements.is_empty());
    }

    #[test]
    fn control_errors() {
        let mut e = Engine::new(quiet_config(), None);
        e.add_vehicle(init("a", zigzag(), 30.0), None).unwrap();
        assert!(matches!(e.add_vehicle(init("a", zigzag(), 30.0), None), Err(AnimatorError::DuplicateVehicle(_))));
        assert!(matches!(e.navigate("nope", [0.0, 0.0]), Err(AnimatorError::UnknownVehicle(_))));
        assert!(matches!(e.navigate("a", [0.0, 91.0]), Err(AnimatorError::InvalidDestination(..))));
        assert!(matches!(
            e.add_vehicle(VehicleInit::new("", [0.0, 0.0]), None),
            Err(AnimatorError::InvalidVehicle(ModelError::EmptyName))
        ));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let run = || {
            let cfg = AnimatorConfig { seed: Some(99), speed_jitter_probability: 0.5, ..Default::default() };
            let mut e = Engine::new(cfg, None);
            e.add_vehicle(init("a", zigzag(), 40.0), None).unwrap();
            e.add_vehicle(init("b", zigzag().into_iter().rev().collect(), 25.0), None).unwrap();
            (0..300).map(|_| e.step(TICK, None, None).snapshot).last().unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn clear_and_remove() {
        let mut e = Engine::new(quiet_config(), None);
        e.add_vehicle(init("a", zigzag(), 30.0), None).unwrap();
        e.add_vehicle(VehicleInit::new("b", [-73.9, 40.7]), None).unwrap();
        assert_eq!(e.stats().total, 2);
        assert!(e.remove_vehicle("a"));
        assert!(!e.remove_vehicle("a"));
        e.clear();
        assert!(e.vehicles().is_empty());
        assert_eq!(e.pending_routes(), 0);
        assert!(e.step(TICK, None, None).snapshot.is_empty());
    }

    #[test]
    fn camera_follows_after_movement() {
        let mut e = Engine::new(quiet_config(), None);
        e.add_vehicle(init("a", zigzag(), 30.0), None).unwrap();
        e.follow_vehicle("a", CameraMode::Driving);
        let out = e.step(TICK, None, None);
        let cam = out.camera.unwrap();
        assert_eq!(cam.pose.center, out.snapshot[0].position);
        assert_eq!(cam.pose.bearing, out.snapshot[0].heading);

        e.follow_vehicle("ghost", CameraMode::Driving);
        assert!(e.step(TICK, None, None).camera.is_none());
    }
}
