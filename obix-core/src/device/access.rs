//! The access-control oracle (spec §4.2 "Access-control oracle"):
//! `permits(requester, object_owner, op)`, pluggable but defaulting to the
//! built-in rules the core must honour.

/// Reserved requester ids used by the subsystems themselves to perform
/// internal removals that bypass ownership checks (spec §4.2).
pub const SERVER_DEVICE: &str = "SERVER:DEVICE";
pub const SERVER_WATCH: &str = "SERVER:WATCH";
pub const SERVER_HISTORY: &str = "SERVER:HISTORY";

pub fn is_subsystem(requester: &str) -> bool {
    matches!(requester, SERVER_DEVICE | SERVER_WATCH | SERVER_HISTORY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Remove,
    Delete,
}

pub trait AccessOracle: Send + Sync {
    /// `parent_is_root` is true when the object being removed sits
    /// directly under `/obix/deviceRoot` — a client may always sign off
    /// its own top-level device (spec §4.2).
    fn permits(&self, requester: &str, owner: &str, op: Operation, parent_is_root: bool) -> bool;
}

/// The built-in rule set described in spec §4.2.
#[derive(Debug, Default)]
pub struct DefaultOracle;

impl AccessOracle for DefaultOracle {
    fn permits(&self, requester: &str, owner: &str, op: Operation, parent_is_root: bool) -> bool {
        if is_subsystem(requester) {
            return true;
        }
        match op {
            Operation::Remove => parent_is_root || requester == owner,
            Operation::Delete => requester == owner,
            Operation::Add => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_always_permitted() {
        let oracle = DefaultOracle;
        assert!(oracle.permits(SERVER_DEVICE, "alice", Operation::Delete, false));
    }

    #[test]
    fn remove_under_root_is_open() {
        let oracle = DefaultOracle;
        assert!(oracle.permits("bob", "alice", Operation::Remove, true));
    }

    #[test]
    fn remove_elsewhere_requires_owner() {
        let oracle = DefaultOracle;
        assert!(!oracle.permits("bob", "alice", Operation::Remove, false));
        assert!(oracle.permits("alice", "alice", Operation::Remove, false));
    }

    #[test]
    fn delete_requires_owner() {
        let oracle = DefaultOracle;
        assert!(!oracle.permits("bob", "alice", Operation::Delete, false));
    }

    #[test]
    fn add_defaults_permit() {
        let oracle = DefaultOracle;
        assert!(oracle.permits("anyone", "alice", Operation::Add, false));
    }
}
