//! The concurrency fabric (spec §5): a readers/writers/shutdown gate
//! (`tsync`), a periodic-task scheduler (`ptask`), and a blocking refcount
//! used by the Watch Subsystem so a parked poll task can outlive the
//! handler that created it.

pub mod ptask;
pub mod refcount;

use std::sync::{Condvar, Mutex};

use obix_model::{ErrorKind, ObixError, Result};

/// A readers/writers/shutdown synchroniser, one embedded per device, watch,
/// or history facility (spec §5 "Per-subtree gate"). Writer-preferring: a
/// pending writer blocks new readers so writers cannot starve, but a run of
/// writers can starve readers — acceptable per the source's own tradeoff
/// note, since writes are rare and fast.
#[derive(Debug)]
pub struct Gate {
    state: Mutex<GateState>,
    rq: Condvar,
    wq: Condvar,
    swq: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    being_shutdown: bool,
    readers: u32,
    writers: u32,
    running_readers: u32,
    running_writers: u32,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            rq: Condvar::new(),
            wq: Condvar::new(),
            swq: Condvar::new(),
        }
    }

    /// Blocks until a reader slot is granted, or returns `invalid-state` if
    /// shutdown has already begun.
    pub fn reader_entry(&self) -> Result<ReaderGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.being_shutdown {
            return Err(ObixError::new(ErrorKind::InvalidState, "gate is shutting down"));
        }
        state.readers += 1;
        while state.writers > 0 {
            state = self.rq.wait(state).unwrap_or_else(|p| p.into_inner());
        }
        state.running_readers += 1;
        Ok(ReaderGuard { gate: self })
    }

    fn reader_exit(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.readers -= 1;
        state.running_readers -= 1;
        if state.running_readers == 0 && state.writers > 0 {
            self.wq.notify_one();
        }
        if state.being_shutdown && state.readers == 0 && state.writers == 0 {
            self.swq.notify_one();
        }
    }

    /// Blocks until a writer slot is granted (exclusive of all readers and
    /// other writers), or returns `invalid-state` if shutdown has begun.
    pub fn writer_entry(&self) -> Result<WriterGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.being_shutdown {
            return Err(ObixError::new(ErrorKind::InvalidState, "gate is shutting down"));
        }
        state.writers += 1;
        while state.running_readers > 0 || state.running_writers > 0 {
            state = self.wq.wait(state).unwrap_or_else(|p| p.into_inner());
        }
        state.running_writers += 1;
        Ok(WriterGuard { gate: self })
    }

    fn writer_exit(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.running_writers -= 1;
        state.writers -= 1;
        if state.writers > 0 {
            self.wq.notify_one();
        } else if state.readers > 0 {
            self.rq.notify_all();
        } else if state.being_shutdown {
            self.swq.notify_one();
        }
    }

    /// Raises the shutdown flag (rejecting subsequent readers/writers) and
    /// blocks until every in-flight reader and writer has drained.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.being_shutdown {
            return;
        }
        state.being_shutdown = true;
        while state.readers > 0 || state.writers > 0 {
            state = self.swq.wait(state).unwrap_or_else(|p| p.into_inner());
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).being_shutdown
    }
}

/// RAII reader permit; releases on drop.
pub struct ReaderGuard<'a> {
    gate: &'a Gate,
}

impl Drop for ReaderGuard<'_> {
    fn drop(&mut self) {
        self.gate.reader_exit();
    }
}

/// RAII writer permit; releases on drop.
pub struct WriterGuard<'a> {
    gate: &'a Gate,
}

impl Drop for WriterGuard<'_> {
    fn drop(&mut self) {
        self.gate.writer_exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn readers_coexist() {
        let gate = Gate::new();
        let r1 = gate.reader_entry().unwrap();
        let r2 = gate.reader_entry().unwrap();
        drop(r1);
        drop(r2);
    }

    #[test]
    fn shutdown_rejects_new_entrants() {
        let gate = Gate::new();
        gate.shutdown();
        assert!(gate.reader_entry().is_err());
        assert!(gate.writer_entry().is_err());
    }

    #[test]
    fn shutdown_waits_for_drain() {
        let gate = Arc::new(Gate::new());
        let g2 = gate.clone();
        let guard = gate.writer_entry().unwrap();
        let handle = thread::spawn(move || {
            g2.shutdown();
        });
        thread::sleep(Duration::from_millis(50));
        drop(guard);
        handle.join().unwrap();
        assert!(gate.is_shutdown());
    }

    #[test]
    fn writer_excludes_readers() {
        let gate = Arc::new(Gate::new());
        let writer = gate.writer_entry().unwrap();
        let g2 = gate.clone();
        let handle = thread::spawn(move || g2.reader_entry().is_ok());
        thread::sleep(Duration::from_millis(30));
        drop(writer);
        assert!(handle.join().unwrap());
    }
}
