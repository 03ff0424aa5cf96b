//! The Watch Subsystem (spec §4.3): long-poll change notification via
//! hidden meta-marker children on monitored nodes.

pub mod backlog;
pub mod ids;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use obix_model::node::{CopyExclude, Node, NodeType};
use obix_model::{ErrorKind, ObixError, Result};

use crate::sync::ptask::Scheduler;
use backlog::Backlog;
use ids::IdAllocator;

/// Default and bound values for a watch's poll-wait interval (spec §4.3).
pub const DEFAULT_LEASE: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_MIN: Duration = Duration::from_secs(0);
pub const DEFAULT_POLL_MAX: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchState {
    Active,
    Destroyed,
}

struct Item {
    node: Node,
    marker: Node,
}

/// A single watch descriptor. `requester_id` is the requester that
/// created it; only that requester (or a subsystem id) may operate on it
/// (enforced by the caller via the same [`crate::device::AccessOracle`]
/// rules used elsewhere).
pub struct Watch {
    pub id: u64,
    pub requester_id: String,
    items: Mutex<HashMap<String, Item>>,
    pub backlog: Backlog,
    poll_min: Mutex<Duration>,
    poll_max: Mutex<Duration>,
    lease: Mutex<Duration>,
    lease_task_id: Mutex<Option<u64>>,
    state: Mutex<WatchState>,
}

impl Watch {
    fn new(id: u64, requester_id: String, lease: Duration) -> Self {
        Self {
            id,
            requester_id,
            items: Mutex::new(HashMap::new()),
            backlog: Backlog::new(),
            poll_min: Mutex::new(DEFAULT_POLL_MIN),
            poll_max: Mutex::new(DEFAULT_POLL_MAX),
            lease: Mutex::new(lease),
            lease_task_id: Mutex::new(None),
            state: Mutex::new(WatchState::Active),
        }
    }

    pub fn is_active(&self) -> bool {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) == WatchState::Active
    }

    pub fn set_poll_interval(&self, min: Duration, max: Duration) {
        *self.poll_min.lock().unwrap_or_else(|p| p.into_inner()) = min;
        *self.poll_max.lock().unwrap_or_else(|p| p.into_inner()) = max;
    }

    pub fn lease(&self) -> Duration {
        *self.lease.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_lease(&self, lease: Duration) {
        *self.lease.lock().unwrap_or_else(|p| p.into_inner()) = lease;
    }

    /// Adds `href`/`node` to the monitored set, attaching a hidden meta
    /// marker child so a write to `node` can find this watch by walking
    /// up from the mutated node (spec §4.3 "ancestor walk").
    pub fn add_item(&self, href: String, node: Node) -> Result<()> {
        let marker = Node::new(NodeType::Meta, format!("watch{}", self.id));
        marker.set_hidden(true);
        marker.set_watch_marker(self.id);
        node.add_child(marker.clone());
        self.items
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(href, Item { node, marker });
        Ok(())
    }

    pub fn remove_item(&self, href: &str) -> bool {
        let mut items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        match items.remove(href) {
            Some(item) => {
                item.node.remove_child_identity(&item.marker);
                true
            }
            None => false,
        }
    }

    /// Called by whoever mutates a monitored node (directly, or walking up
    /// from it via [`Node::watch_markers`]) to enqueue a change.
    pub fn notify_changed(&self, href: &str) {
        let items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(item) = items.get(href) {
            let snapshot = item.node.deep_copy(CopyExclude::read_response());
            self.backlog.record_change(href.to_string(), Some(snapshot));
        }
    }

    pub fn notify_removed(&self, href: &str) {
        let items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        if items.contains_key(href) {
            self.backlog.record_change(href.to_string(), None);
        }
    }

    pub fn poll_changes(&self) -> Vec<(String, Option<Node>)> {
        let min = *self.poll_min.lock().unwrap_or_else(|p| p.into_inner());
        let max = *self.poll_max.lock().unwrap_or_else(|p| p.into_inner());
        self.backlog.wait_and_drain(min, max)
    }

    /// Returns the current value of every monitored item regardless of
    /// whether it changed (spec §4.3 `pollRefresh`).
    pub fn poll_refresh(&self) -> Vec<(String, Option<Node>)> {
        let items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        items
            .iter()
            .map(|(href, item)| (href.clone(), Some(item.node.deep_copy(CopyExclude::read_response()))))
            .collect()
    }

    /// Unlinks every marker, leaving monitored nodes clean.
    fn dispose(&self) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = WatchState::Destroyed;
        let mut items = self.items.lock().unwrap_or_else(|p| p.into_inner());
        for (_, item) in items.drain() {
            item.node.remove_child_identity(&item.marker);
        }
    }
}

/// Owns every live watch, keyed by id, plus the scheduler driving lease
/// expiry (spec §4.3's `lease` op and automatic `delete` on timeout).
pub struct WatchRegistry {
    by_id: DashMap<u64, Arc<Watch>>,
    ids: IdAllocator,
    scheduler: Arc<Scheduler>,
}

impl WatchRegistry {
    pub fn new(scheduler: Arc<Scheduler>) -> Arc<Self> {
        Arc::new(Self {
            by_id: DashMap::new(),
            ids: IdAllocator::new(),
            scheduler,
        })
    }

    pub fn get(&self, id: u64) -> Option<Arc<Watch>> {
        self.by_id.get(&id).map(|e| e.value().clone())
    }

    /// Creates a watch and schedules its lease-expiry task. `self_ref` must
    /// be the same registry wrapped in the `Arc` the caller holds (the
    /// lease task needs a weak back-reference to expire the watch without
    /// keeping the registry alive past its own shutdown).
    pub fn make(self_ref: &Arc<Self>, requester_id: String) -> Arc<Watch> {
        let id = self_ref.ids.alloc();
        let watch = Arc::new(Watch::new(id, requester_id, DEFAULT_LEASE));
        self_ref.by_id.insert(id, watch.clone());

        let weak_self: Weak<Self> = Arc::downgrade(self_ref);
        let task_id = self_ref.scheduler.schedule(DEFAULT_LEASE, Some(1), move || {
            if let Some(registry) = weak_self.upgrade() {
                registry.expire(id);
            }
        });
        *watch.lease_task_id.lock().unwrap_or_else(|p| p.into_inner()) = Some(task_id);
        watch
    }

    /// Refreshes a watch's lease timer (spec §4.3: any op on a watch
    /// resets its lease).
    pub fn refresh_lease(&self, watch: &Watch) {
        if let Some(task_id) = *watch.lease_task_id.lock().unwrap_or_else(|p| p.into_inner()) {
            self.scheduler.reset(task_id);
        }
    }

    fn expire(&self, id: u64) {
        if let Some((_, watch)) = self.by_id.remove(&id) {
            self.ids.free(id);
            watch.dispose();
        }
    }

    /// Explicit client `delete` (spec §4.3), as opposed to automatic lease
    /// expiry; requires `requester` to be the watch's creator or a
    /// subsystem id.
    pub fn delete(&self, id: u64, requester: &str) -> Result<()> {
        let watch = self
            .get(id)
            .ok_or_else(|| ObixError::new(ErrorKind::WatchNoSuchUri, format!("no watch {id}")))?;
        if watch.requester_id != requester && !crate::device::access::is_subsystem(requester) {
            return Err(ObixError::perm_denied(format!(
                "'{requester}' may not delete watch {id}"
            )));
        }
        if let Some((_, _)) = self.by_id.remove(&id) {
            self.ids.free(id);
        }
        if let Some(task_id) = *watch.lease_task_id.lock().unwrap_or_else(|p| p.into_inner()) {
            self.scheduler.cancel(task_id, false);
        }
        watch.dispose();
        Ok(())
    }

    /// Notifies every watch monitoring `node` or any of its ancestors
    /// (spec §4.3 "when a writer mutates a node it collects all ancestor
    /// meta-markers, walking up"): a watch on `/obix/deviceRoot/A` must
    /// still fire when `/obix/deviceRoot/A/n` is written, because
    /// monitoring the ancestor subsumes monitoring its descendants. Each
    /// matching watch is notified with the *monitored* node's own href
    /// (the ancestor's, not the mutated leaf's), since that's the key its
    /// watch-item was registered under.
    pub fn notify_all(&self, node: &Node) {
        let mut cur = Some(node.clone());
        while let Some(n) = cur {
            let href = n.full_href();
            for (_marker, watch_id) in n.watch_markers() {
                if let Some(watch) = self.get(watch_id) {
                    watch.notify_changed(&href);
                }
            }
            cur = n.parent();
        }
    }

    pub fn notify_all_removed(&self, node: &Node) {
        let mut cur = Some(node.clone());
        while let Some(n) = cur {
            let href = n.full_href();
            for (_, watch_id) in n.watch_markers() {
                if let Some(watch) = self.get(watch_id) {
                    watch.notify_removed(&href);
                }
            }
            cur = n.parent();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_remove_item_wires_and_unwires_marker() {
        let watch = Watch::new(1, "alice".to_string(), DEFAULT_LEASE);
        let node = Node::new(NodeType::Int, "n");
        watch.add_item("/A/n".to_string(), node.clone()).unwrap();
        assert_eq!(node.watch_markers().len(), 1);
        assert!(watch.remove_item("/A/n"));
        assert!(node.watch_markers().is_empty());
    }

    #[test]
    fn poll_refresh_returns_current_values_unconditionally() {
        let watch = Watch::new(1, "alice".to_string(), DEFAULT_LEASE);
        let node = Node::new(NodeType::Int, "n");
        node.set_val("1");
        watch.add_item("/A/n".to_string(), node).unwrap();
        let values = watch.poll_refresh();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].0, "/A/n");
    }

    #[test]
    fn registry_make_and_delete() {
        let scheduler = Arc::new(Scheduler::new());
        let registry = WatchRegistry::new(scheduler);
        let watch = WatchRegistry::make(&registry, "alice".to_string());
        let id = watch.id;
        assert!(registry.get(id).is_some());
        registry.delete(id, "alice").unwrap();
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn notify_all_reaches_watching_watch() {
        let scheduler = Arc::new(Scheduler::new());
        let registry = WatchRegistry::new(scheduler);
        let watch = WatchRegistry::make(&registry, "alice".to_string());
        let node = Node::new(NodeType::Int, "n");
        node.set_val("1");
        watch.add_item("/A/n".to_string(), node.clone()).unwrap();

        registry.notify_all(&node);
        let drained = watch.backlog.drain_now();
        assert_eq!(drained.len(), 1);
    }
}
