//! Per-topic change listeners shared by the storage backends

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    topics: HashMap<String, Vec<(u64, ChangeCallback)>>,
}

/// Append-only listener lists keyed by topic.
#[derive(Clone, Default)]
pub struct ListenerMap {
    table: Arc<Mutex<ListenerTable>>,
}

impl ListenerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: String, callback: ChangeCallback) -> Subscription {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.next_id += 1;
        let id = table.next_id;
        table
            .topics
            .entry(topic.clone())
            .or_default()
            .push((id, callback));
        Subscription {
            table: Arc::downgrade(&self.table),
            topic,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Invoke every listener of `topic`. Callbacks run outside the lock so
    /// they may subscribe or unsubscribe.
    pub fn notify(&self, topic: &str) {
        let callbacks: Vec<ChangeCallback> = {
            let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table
                .topics
                .get(topic)
                .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default()
        };
        for callback in callbacks {
            callback();
        }
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.topics.get(topic).map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.topics.clear();
    }
}

/// Handle returned by a subscribe call.
#[must_use = "dropping a Subscription keeps the listener registered; call unsubscribe()"]
pub struct Subscription {
    table: Weak<Mutex<ListenerTable>>,
    topic: String,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Remove this listener. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = table.topics.get_mut(&self.topic) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                table.topics.remove(&self.topic);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(counter: &Arc<AtomicUsize>) -> ChangeCallback {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_unsubscribe_leaves_other_listeners() {
        let map = ListenerMap::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let sub_a = map.subscribe("t".into(), counting(&a));
        let _sub_b = map.subscribe("t".into(), counting(&b));

        map.notify("t");
        sub_a.unsubscribe();
        sub_a.unsubscribe();
        map.notify("t");

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 2);
        assert_eq!(map.listener_count("t"), 1);
        assert!(!sub_a.is_active());
    }

    #[test]
    fn test_callback_may_unsubscribe_itself() {
        let map = ListenerMap::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let inner_slot = Arc::clone(&slot);
        let inner_hits = Arc::clone(&hits);
        let sub = map.subscribe(
            "t".into(),
            Arc::new(move || {
                inner_hits.fetch_add(1, Ordering::SeqCst);
                if let Some(sub) = inner_slot.lock().unwrap().as_ref() {
                    sub.unsubscribe();
                }
            }),
        );
        *slot.lock().unwrap() = Some(sub);

        map.notify("t");
        map.notify("t");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(map.listener_count("t"), 0);
    }

    #[test]
    fn test_unsubscribe_after_map_dropped() {
        let map = ListenerMap::new();
        let sub = map.subscribe("t".into(), Arc::new(|| {}));
        drop(map);
        sub.unsubscribe();
        assert!(!sub.is_active());
    }

    #[test]
    fn test_clear() {
        let map = ListenerMap::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let _sub = map.subscribe("t".into(), counting(&hits));
        map.clear();
        map.notify("t");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
