//! Recyclable ascending watch-id allocator (spec §4.3).
//!
//! Ids are handed out starting at 1 and increasing; a freed id is reused
//! before any new high-water id is minted, but two ids freed out of order
//! are still handed back out in ascending order relative to each other.

use std::collections::BTreeSet;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    next_fresh: u64,
    freed: BTreeSet<u64>,
}

pub struct IdAllocator {
    state: Mutex<State>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_fresh: 1,
                freed: BTreeSet::new(),
            }),
        }
    }

    pub fn alloc(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(&lowest) = state.freed.iter().next() {
            state.freed.remove(&lowest);
            lowest
        } else {
            let id = state.next_fresh;
            state.next_fresh += 1;
            id
        }
    }

    pub fn free(&self, id: u64) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if id + 1 == state.next_fresh {
            state.next_fresh -= 1;
            // Freeing the current high-water id may let a run of
            // previously-freed ids just below it collapse back down too.
            while state.freed.remove(&(state.next_fresh - 1)) {
                state.next_fresh -= 1;
            }
        } else {
            state.freed.insert(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_ascending() {
        let alloc = IdAllocator::new();
        assert_eq!(alloc.alloc(), 1);
        assert_eq!(alloc.alloc(), 2);
        assert_eq!(alloc.alloc(), 3);
    }

    #[test]
    fn recycles_freed_id_before_new_ones() {
        let alloc = IdAllocator::new();
        let a = alloc.alloc();
        let b = alloc.alloc();
        let _c = alloc.alloc();
        alloc.free(a);
        alloc.free(b);
        assert_eq!(alloc.alloc(), a);
        assert_eq!(alloc.alloc(), b);
    }

    #[test]
    fn collapses_high_water_mark() {
        let alloc = IdAllocator::new();
        let _a = alloc.alloc();
        let b = alloc.alloc();
        alloc.free(b);
        assert_eq!(alloc.alloc(), b);
    }
}
