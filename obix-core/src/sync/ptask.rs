//! Periodic-task scheduler (`ptask`, spec §5): one thread per scheduler,
//! sleeping on a condvar until the earliest `next_fire`. Used by watch
//! leases (spec §4.3) and available for a device's backup cadence.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Payload = Box<dyn FnMut() + Send + 'static>;

struct Task {
    id: u64,
    next_fire: Instant,
    period: Duration,
    /// `None` means indefinite (`EXECUTE_INDEFINITE` in the original).
    remaining_runs: Option<u32>,
    payload: Payload,
    cancelled: bool,
    running: bool,
}

struct Inner {
    tasks: Mutex<Vec<Task>>,
    list_changed: Condvar,
    executed: Condvar,
    stop: AtomicBool,
    next_id: AtomicU64,
}

/// A handle to a running scheduler thread. Dropping it joins the thread
/// (see [`Scheduler::dispose`]).
pub struct Scheduler {
    inner: Arc<Inner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            tasks: Mutex::new(Vec::new()),
            list_changed: Condvar::new(),
            executed: Condvar::new(),
            stop: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        });
        let worker_inner = inner.clone();
        let thread = thread::spawn(move || Self::thread_cycle(worker_inner));
        Self {
            inner,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Schedules a task. `times = None` runs indefinitely; `Some(n)` runs
    /// it exactly `n` times before it is dropped from the queue.
    pub fn schedule(
        &self,
        period: Duration,
        times: Option<u32>,
        task: impl FnMut() + Send + 'static,
    ) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let mut tasks = self.inner.tasks.lock().unwrap_or_else(|p| p.into_inner());
        tasks.push(Task {
            id,
            next_fire: Instant::now() + period,
            period,
            remaining_runs: times,
            payload: Box::new(task),
            cancelled: false,
            running: false,
        });
        self.inner.list_changed.notify_one();
        id
    }

    /// Resets a task's next-fire time to `now + period` (used to refresh a
    /// watch lease on every `Watch.*` operation, spec §4.3).
    pub fn reset(&self, id: u64) -> bool {
        let mut tasks = self.inner.tasks.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.next_fire = Instant::now() + task.period;
            self.inner.list_changed.notify_one();
            true
        } else {
            false
        }
    }

    /// Cancels a task. If `wait` is true and the task is currently
    /// executing, blocks until it finishes (spec §5 `cancel(wait=true)`).
    pub fn cancel(&self, id: u64, wait: bool) {
        let mut tasks = self.inner.tasks.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.cancelled = true;
        } else {
            return;
        }
        if wait {
            loop {
                let still_running = tasks.iter().any(|t| t.id == id && t.running);
                if !still_running {
                    break;
                }
                tasks = self
                    .inner
                    .executed
                    .wait(tasks)
                    .unwrap_or_else(|p| p.into_inner());
            }
        }
        tasks.retain(|t| t.id != id);
        self.inner.list_changed.notify_one();
    }

    /// Stops the scheduler thread, waiting for it to exit.
    pub fn dispose(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        self.inner.list_changed.notify_one();
        if let Some(handle) = self.thread.lock().unwrap_or_else(|p| p.into_inner()).take() {
            let _ = handle.join();
        }
    }

    fn thread_cycle(inner: Arc<Inner>) {
        loop {
            let mut tasks = inner.tasks.lock().unwrap_or_else(|p| p.into_inner());
            if inner.stop.load(Ordering::SeqCst) {
                return;
            }

            let earliest = tasks
                .iter()
                .filter(|t| !t.cancelled)
                .map(|t| t.next_fire)
                .min();

            let Some(earliest) = earliest else {
                let _ = inner
                    .list_changed
                    .wait_timeout(tasks, Duration::from_millis(500))
                    .unwrap_or_else(|p| p.into_inner());
                continue;
            };

            let now = Instant::now();
            if earliest > now {
                let _ = inner
                    .list_changed
                    .wait_timeout(tasks, earliest - now)
                    .unwrap_or_else(|p| p.into_inner());
                continue;
            }

            let id = tasks
                .iter()
                .find(|t| !t.cancelled && t.next_fire <= now)
                .map(|t| t.id)
                .expect("earliest task must exist");
            let mut payload = {
                let task = tasks.iter_mut().find(|t| t.id == id).unwrap();
                task.running = true;
                std::mem::replace(&mut task.payload, Box::new(|| {}))
            };
            drop(tasks);

            payload();

            let mut tasks = inner.tasks.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
                task.payload = payload;
                task.running = false;
                let exhausted = if let Some(n) = task.remaining_runs {
                    let left = n.saturating_sub(1);
                    task.remaining_runs = Some(left);
                    left == 0
                } else {
                    false
                };
                task.next_fire = Instant::now() + task.period;
                if exhausted || task.cancelled {
                    tasks.retain(|t| t.id != id);
                }
            }
            inner.executed.notify_all();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn fires_repeatedly() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU32::new(0));
        let c2 = counter.clone();
        scheduler.schedule(Duration::from_millis(10), None, move || {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(60));
        assert!(counter.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn cancel_stops_future_runs() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicU32::new(0));
        let c2 = counter.clone();
        let id = scheduler.schedule(Duration::from_millis(10), None, move || {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(25));
        scheduler.cancel(id, true);
        let seen = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(counter.load(Ordering::SeqCst), seen);
    }
}
