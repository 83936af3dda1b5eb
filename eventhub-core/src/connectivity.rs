//! Online/offline state observed from outside the engine.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

/// Current connectivity plus a generation counter that changes on every
/// transition, so delayed reactions can tell whether a newer flap happened.
pub struct Connectivity {
    online: watch::Sender<bool>,
    generation: AtomicU64,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        Connectivity {
            online: watch::Sender::new(online),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online.subscribe()
    }

    /// Record a connectivity report. Returns the new generation when it was a
    /// transition to online, `None` otherwise.
    pub fn set_online(&self, online: bool) -> Option<u64> {
        let changed = self.online.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if !changed {
            return None;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        online.then_some(generation)
    }

    /// True when no transition happened since `generation` was handed out.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_offline_to_online_transitions_yield_a_generation() {
        let connectivity = Connectivity::new(true);
        assert_eq!(connectivity.set_online(true), None);
        assert_eq!(connectivity.set_online(false), None);
        let generation = connectivity.set_online(true).unwrap();
        assert!(connectivity.is_current(generation));
        assert!(connectivity.is_online());
    }

    #[test]
    fn flapping_invalidates_earlier_generations() {
        let connectivity = Connectivity::new(false);
        let first = connectivity.set_online(true).unwrap();
        connectivity.set_online(false);
        let second = connectivity.set_online(true).unwrap();
        assert!(!connectivity.is_current(first));
        assert!(connectivity.is_current(second));
    }
}
