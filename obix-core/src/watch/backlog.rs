//! The long-poll backlog behind `pollChanges` (spec §4.3).
//!
//! Holds the set of hrefs that changed since the last drain, in the order
//! they first changed, deduplicating repeat changes to the same href to
//! their latest value. `wait_and_drain` blocks the calling (blocking, OS)
//! thread: it waits up to `pollWaitInterval/max` for the first change, then
//! up to `pollWaitInterval/min` more to let a short burst of related
//! changes batch into one response.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use obix_model::node::Node;

struct BacklogState {
    /// Hrefs in first-changed order; `None` means the node was deleted.
    order: Vec<String>,
    latest: HashMap<String, Option<Node>>,
}

pub struct Backlog {
    state: Mutex<BacklogState>,
    cv: Condvar,
}

impl Default for Backlog {
    fn default() -> Self {
        Self::new()
    }
}

impl Backlog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BacklogState {
                order: Vec::new(),
                latest: HashMap::new(),
            }),
            cv: Condvar::new(),
        }
    }

    /// Records that `href` changed to `value` (`None` for a deletion),
    /// waking any thread parked in [`Self::wait_and_drain`].
    pub fn record_change(&self, href: String, value: Option<Node>) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if !state.latest.contains_key(&href) {
            state.order.push(href.clone());
        }
        state.latest.insert(href, value);
        self.cv.notify_all();
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).order.is_empty()
    }

    /// Blocks until at least one change is pending or `max` elapses, then
    /// waits up to `min` more to batch further changes, and drains the
    /// backlog in first-changed order.
    pub fn wait_and_drain(&self, min: Duration, max: Duration) -> Vec<(String, Option<Node>)> {
        let start = Instant::now();
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());

        while guard.order.is_empty() {
            let elapsed = start.elapsed();
            if elapsed >= max {
                return Vec::new();
            }
            let (g, timeout) = self
                .cv
                .wait_timeout(guard, max - elapsed)
                .unwrap_or_else(|p| p.into_inner());
            guard = g;
            if timeout.timed_out() && guard.order.is_empty() {
                return Vec::new();
            }
        }

        let elapsed = start.elapsed();
        if elapsed < min {
            let (g, _) = self
                .cv
                .wait_timeout(guard, min - elapsed)
                .unwrap_or_else(|p| p.into_inner());
            guard = g;
        }

        drain(&mut guard)
    }

    /// Drains whatever is pending right now without blocking (spec §4.3
    /// `pollRefresh` always returns every monitored value, not just
    /// changes, but shares the same drain-ordering machinery).
    pub fn drain_now(&self) -> Vec<(String, Option<Node>)> {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        drain(&mut guard)
    }
}

fn drain(state: &mut BacklogState) -> Vec<(String, Option<Node>)> {
    let order = std::mem::take(&mut state.order);
    order
        .into_iter()
        .map(|href| {
            let value = state.latest.remove(&href).flatten();
            (href, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use obix_model::node::NodeType;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn drains_in_first_changed_order() {
        let backlog = Backlog::new();
        backlog.record_change("a".into(), Some(Node::new(NodeType::Int, "a")));
        backlog.record_change("b".into(), Some(Node::new(NodeType::Int, "b")));
        backlog.record_change("a".into(), Some(Node::new(NodeType::Int, "a2")));

        let drained = backlog.drain_now();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, "a");
        assert_eq!(drained[1].0, "b");
    }

    #[test]
    fn wait_and_drain_times_out_empty() {
        let backlog = Backlog::new();
        let drained = backlog.wait_and_drain(Duration::from_millis(0), Duration::from_millis(20));
        assert!(drained.is_empty());
    }

    #[test]
    fn wait_and_drain_wakes_on_change() {
        let backlog = Arc::new(Backlog::new());
        let b2 = backlog.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            b2.record_change("x".into(), Some(Node::new(NodeType::Int, "x")));
        });
        let drained = backlog.wait_and_drain(Duration::from_millis(0), Duration::from_secs(2));
        handle.join().unwrap();
        assert_eq!(drained.len(), 1);
    }
}
