use fleet_model::Coord;
use fleet_route_core::{
    calculate_route, channel, create_straight_line_route, DirectionsSource, RouteMode, RouteRx, RouteTx,
    RouteUpdate,
};
use std::{collections::HashMap, sync::Arc};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, trace};

struct InFlight {
    request_id: u64,
    task: Option<JoinHandle<()>>,
}

/// Per-vehicle route requests. Answers come back over a channel and are
/// picked up by [`RoutePlanner::drain`] at the start of the next tick.
///
/// Requests run on the ambient tokio runtime. Without a runtime, or without a
/// directions source, the straight-line fallback is queued immediately.
pub struct RoutePlanner {
    source: Option<Arc<dyn DirectionsSource>>,
    mode: RouteMode,
    tx: RouteTx,
    rx: RouteRx,
    next_request: u64,
    in_flight: HashMap<String, InFlight>,
}

impl RoutePlanner {
    pub fn new(source: Option<Arc<dyn DirectionsSource>>, mode: RouteMode) -> Self {
        let (tx, rx) = channel();
        Self { source, mode, tx, rx, next_request: 0, in_flight: HashMap::new() }
    }

    /// Requests `start -> end` for `vehicle_id`, superseding any earlier request.
    pub fn request(&mut self, vehicle_id: &str, start: Coord, end: Coord) {
        self.cancel(vehicle_id);
        let request_id = self.next_request;
        self.next_request += 1;
        trace!(vehicle = vehicle_id, request_id, ?start, ?end, "route requested");

        let task = match (self.source.clone(), Handle::try_current()) {
            (Some(source), Ok(handle)) => {
                let tx = self.tx.clone();
                let vehicle_id = vehicle_id.to_string();
                let mode = self.mode;
                Some(handle.spawn(async move {
                    let result = calculate_route(source.as_ref(), start, end, mode).await;
                    let _ = tx.send(RouteUpdate { vehicle_id, request_id, destination: end, result });
                }))
            }
            _ => {
                let result = create_straight_line_route(start, end);
                let _ = self.tx.send(RouteUpdate {
                    vehicle_id: vehicle_id.to_string(),
                    request_id,
                    destination: end,
                    result,
                });
                None
            }
        };
        self.in_flight.insert(vehicle_id.to_string(), InFlight { request_id, task });
    }

    /// Finished routes for requests that are still current.
    pub fn drain(&mut self) -> Vec<RouteUpdate> {
        let mut out = Vec::new();
        for update in self.rx.try_iter() {
            match self.in_flight.get(&update.vehicle_id) {
                Some(f) if f.request_id == update.request_id => {
                    self.in_flight.remove(&update.vehicle_id);
                    out.push(update);
                }
                _ => debug!(vehicle = %update.vehicle_id, request_id = update.request_id, "dropping stale route"),
            }
        }
        out
    }

    pub fn cancel(&mut self, vehicle_id: &str) {
        if let Some(InFlight { task: Some(task), .. }) = self.in_flight.remove(vehicle_id) {
            task.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, f) in self.in_flight.drain() {
            if let Some(task) = f.task {
                task.abort();
            }
        }
        // answers already queued belong to cancelled requests
        for _ in self.rx.try_iter() {}
    }

    pub fn is_pending(&self, vehicle_id: &str) -> bool {
        self.in_flight.contains_key(vehicle_id)
    }

    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }
}

impl Drop for RoutePlanner {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_runtime_falls_back_synchronously() {
        let mut p = RoutePlanner::new(None, RouteMode::Balanced);
        p.request("a", [0.0, 0.0], [0.01, 0.01]);
        assert!(p.is_pending("a"));
        let got = p.drain();
        assert_eq!(got.len(), 1);
        assert!(got[0].result.synthetic);
        assert_eq!(got[0].result.route[0], [0.0, 0.0]);
        assert!(!p.is_pending("a"));
    }

    #[test]
    fn newer_request_supersedes_older() {
        let mut p = RoutePlanner::new(None, RouteMode::Balanced);
        p.request("a", [0.0, 0.0], [0.01, 0.0]);
        p.request("a", [0.0, 0.0], [0.0, 0.02]);
        let got = p.drain();
        assert_eq!(got.len(), 1);
        assert_eq!(*got[0].result.route.last().unwrap(), [0.0, 0.02]);
    }

    #[test]
    fn cancel_all_discards_queued_answers() {
        let mut p = RoutePlanner::new(None, RouteMode::Balanced);
        p.request("a", [0.0, 0.0], [0.01, 0.0]);
        p.request("b", [0.0, 0.0], [0.01, 0.0]);
        p.cancel_all();
        assert_eq!(p.pending(), 0);
        assert!(p.drain().is_empty());
    }
}
