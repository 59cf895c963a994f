use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

use crate::analysis::AnalysisStage;

const STAGE_BUFFER: usize = 16;

struct Slot {
    generation: u64,
    tx: broadcast::Sender<AnalysisStage>,
    watchers: usize,
    running: bool,
}

#[derive(Default)]
struct Inner {
    slots: Mutex<HashMap<String, Slot>>,
    next_generation: AtomicU64,
}

/// Stage channels keyed by request id. An entry lives while a run or a
/// stream holds it and is removed when the last of them lets go.
#[derive(Clone, Default)]
pub struct ProgressRegistry {
    inner: Arc<Inner>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to the stages of `request_id`. Keep the guard for as long
    /// as the receiver is read.
    pub fn watch(&self, request_id: &str) -> (broadcast::Receiver<AnalysisStage>, WatchGuard) {
        let mut slots = self.slots();
        let slot = self.slot(&mut slots, request_id);
        slot.watchers += 1;
        let rx = slot.tx.subscribe();
        let guard = WatchGuard {
            registry: self.clone(),
            request_id: request_id.to_string(),
            generation: slot.generation,
        };
        (rx, guard)
    }

    /// Claims `request_id` for a run. Dropping the handle closes every stream
    /// watching it.
    pub fn start_run(&self, request_id: &str) -> ProgressRun {
        let mut slots = self.slots();
        let slot = self.slot(&mut slots, request_id);
        slot.running = true;
        ProgressRun {
            tx: slot.tx.clone(),
            registry: self.clone(),
            request_id: request_id.to_string(),
            generation: slot.generation,
        }
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot<'a>(&self, slots: &'a mut HashMap<String, Slot>, request_id: &str) -> &'a mut Slot {
        slots.entry(request_id.to_string()).or_insert_with(|| Slot {
            generation: self.inner.next_generation.fetch_add(1, Ordering::Relaxed),
            tx: broadcast::channel(STAGE_BUFFER).0,
            watchers: 0,
            running: false,
        })
    }
}

pub struct WatchGuard {
    registry: ProgressRegistry,
    request_id: String,
    generation: u64,
}

impl WatchGuard {
    /// Whether a run currently holds the channel being watched.
    pub fn is_claimed(&self) -> bool {
        self.registry
            .slots()
            .get(&self.request_id)
            .is_some_and(|slot| slot.generation == self.generation && slot.running)
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        let mut slots = self.registry.slots();
        let Some(slot) = slots.get_mut(&self.request_id) else {
            return;
        };
        if slot.generation != self.generation {
            return;
        }
        slot.watchers = slot.watchers.saturating_sub(1);
        if slot.watchers == 0 && !slot.running {
            debug!(request_id = %self.request_id, "Dropping unclaimed progress channel");
            slots.remove(&self.request_id);
        }
    }
}

pub struct ProgressRun {
    tx: broadcast::Sender<AnalysisStage>,
    registry: ProgressRegistry,
    request_id: String,
    generation: u64,
}

impl ProgressRun {
    pub fn sender(&self) -> &broadcast::Sender<AnalysisStage> {
        &self.tx
    }
}

impl Drop for ProgressRun {
    fn drop(&mut self) {
        let mut slots = self.registry.slots();
        if slots
            .get(&self.request_id)
            .is_some_and(|slot| slot.generation == self.generation)
        {
            slots.remove(&self.request_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ProgressObserver;

    #[test]
    fn abandoned_watches_leave_nothing_behind() {
        let registry = ProgressRegistry::new();
        for i in 0..1000 {
            let (rx, guard) = registry.watch(&format!("req-{}", i));
            drop(rx);
            drop(guard);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn entry_stays_while_any_watcher_remains() {
        let registry = ProgressRegistry::new();
        let (_rx1, first) = registry.watch("req");
        let (_rx2, second) = registry.watch("req");
        drop(first);
        assert_eq!(registry.len(), 1);
        drop(second);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn finished_run_closes_watchers_and_frees_the_entry() {
        let registry = ProgressRegistry::new();
        let (mut rx, guard) = registry.watch("req");

        assert!(!guard.is_claimed());
        let run = registry.start_run("req");
        assert!(guard.is_claimed());
        run.sender().on_stage(&AnalysisStage::Fetching);
        drop(run);
        assert!(registry.is_empty());

        assert_eq!(rx.recv().await.unwrap(), AnalysisStage::Fetching);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        drop(guard);
        assert!(registry.is_empty());
    }

    #[test]
    fn watcher_leaving_mid_run_keeps_the_entry() {
        let registry = ProgressRegistry::new();
        let (rx, guard) = registry.watch("req");
        let run = registry.start_run("req");
        drop(rx);
        drop(guard);
        assert_eq!(registry.len(), 1);
        drop(run);
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_guard_leaves_a_newer_entry_alone() {
        let registry = ProgressRegistry::new();
        let (_rx, old_guard) = registry.watch("req");
        drop(registry.start_run("req"));

        let (_rx2, _new_guard) = registry.watch("req");
        drop(old_guard);
        assert_eq!(registry.len(), 1);
    }
}
