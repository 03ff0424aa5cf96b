//! The Device Subsystem (spec §4.2): per-device subtree, owner, lock,
//! persistence, hash+LRU index.

pub mod access;
pub mod persistence;
pub mod registry;

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use obix_model::node::{Node, NodeType};

use crate::sync::Gate;

pub use access::{AccessOracle, DefaultOracle, Operation};
pub use registry::DeviceRegistry;

/// A device descriptor (spec §3 "Device descriptor"). One exists per
/// registered device, holding the subtree root under `/obix/deviceRoot`,
/// its owning requester id, its own reader/writer gate, and (for devices
/// backed by a resource directory) its on-disk location.
pub struct Device {
    pub href: String,
    pub owner_id: String,
    pub subtree_root: Node,
    pub gate: Gate,
    pub parent_href: Option<String>,
    pub children: Mutex<Vec<String>>,
    pub disk_dir: Option<PathBuf>,
    last_write: Mutex<Option<Instant>>,
    /// Stub `ref` node returned in `/obix/deviceRoot` listings (spec §4.2).
    pub ref_stub: Node,
}

impl Device {
    pub fn new(
        href: String,
        owner_id: String,
        subtree_root: Node,
        parent_href: Option<String>,
        disk_dir: Option<PathBuf>,
    ) -> Self {
        let ref_stub = Node::new(NodeType::Ref, obix_model::path::last_segment(&href).to_string());
        ref_stub.set_val(href.clone());

        Self {
            href,
            owner_id,
            subtree_root,
            gate: Gate::new(),
            parent_href,
            children: Mutex::new(Vec::new()),
            disk_dir,
            last_write: Mutex::new(None),
            ref_stub,
        }
    }

    /// Has at least `backup_period` elapsed since the last persisted write,
    /// or has this device never been persisted (spec §6.3 `backup_period`)?
    pub fn due_for_backup(&self, backup_period: Duration) -> bool {
        match *self.last_write.lock().unwrap_or_else(|p| p.into_inner()) {
            None => true,
            Some(last) => last.elapsed() >= backup_period,
        }
    }

    pub fn mark_written(&self) {
        *self.last_write.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
    }
}
