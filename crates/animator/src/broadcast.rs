use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

pub type Listener<T> = Arc<dyn Fn(&[T]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Fan-out of per-tick batches (vehicle snapshots, guidance announcements),
/// in registration order.
///
/// Each broadcast works on a copy of the listener list, so listeners may
/// register or remove others (or themselves) from inside a callback; the
/// change applies from the next broadcast.
pub struct Broadcaster<T> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Self { next_id: AtomicU64::new(0), listeners: Mutex::new(Vec::new()) }
    }
}

impl<T> Broadcaster<T> {
    pub fn add_listener<F>(&self, f: F) -> ListenerId
    where
        F: Fn(&[T]) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(f)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn broadcast(&self, batch: &[T]) {
        let current: Vec<Listener<T>> = self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for l in current {
            l(batch);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_model::TrackedVehicle;

    #[test]
    fn calls_in_registration_order() {
        let b = Broadcaster::<TrackedVehicle>::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let log = log.clone();
            b.add_listener(move |_| log.lock().push(tag));
        }
        b.broadcast(&[]);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let b = Broadcaster::<TrackedVehicle>::default();
        let id = b.add_listener(|_| {});
        assert!(b.remove_listener(id));
        assert!(!b.remove_listener(id));
        assert!(b.is_empty());
    }

    #[test]
    fn listener_added_during_broadcast_waits_for_next() {
        let b = Arc::new(Broadcaster::<TrackedVehicle>::default());
        let late_calls = Arc::new(AtomicU64::new(0));
        let added = Arc::new(Mutex::new(false));
        {
            let (b2, late_calls, added) = (b.clone(), late_calls.clone(), added.clone());
            b.add_listener(move |_| {
                let mut added = added.lock();
                if !*added {
                    *added = true;
                    let late_calls = late_calls.clone();
                    b2.add_listener(move |_| {
                        late_calls.fetch_add(1, Ordering::SeqCst);
                    });
                }
            });
        }
        b.broadcast(&[]);
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        b.broadcast(&[]);
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }
}
