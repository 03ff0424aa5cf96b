//! Blocking reference count (spec §5 "Reference counting").
//!
//! A watch descriptor is strong-owned by the Watch Subsystem and weakly
//! referenced by parked poll tasks, so a poll task can safely outlive the
//! handler that created it (spec §9 "prefer a strong/weak split"). This
//! type tracks the number of outstanding holders so that disposal can wait
//! for the last one to finish, matching the source's `watch_put` semantics
//! of blocking on last release.

use std::sync::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct RefGate {
    count: Mutex<usize>,
    drained: Condvar,
}

impl RefGate {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(1),
            drained: Condvar::new(),
        }
    }

    /// `watch_get`: registers a new holder.
    pub fn get(&self) {
        *self.count.lock().unwrap_or_else(|p| p.into_inner()) += 1;
    }

    /// `watch_put`: releases a holder, waking any waiter once the count
    /// reaches zero.
    pub fn put(&self) {
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        *count -= 1;
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    /// Drops the subsystem's own initial reference and blocks until every
    /// other holder has released theirs.
    pub fn dispose_wait(&self) {
        let mut count = self.count.lock().unwrap_or_else(|p| p.into_inner());
        *count -= 1;
        while *count > 0 {
            count = self.drained.wait(count).unwrap_or_else(|p| p.into_inner());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn dispose_wait_blocks_for_outstanding_holders() {
        let gate = Arc::new(RefGate::new());
        gate.get();
        let g2 = gate.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            g2.put();
        });
        gate.dispose_wait();
        handle.join().unwrap();
    }
}
