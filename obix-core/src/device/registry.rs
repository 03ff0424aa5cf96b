//! The hash+LRU device index and device lifecycle operations (spec §4.2).
//!
//! Devices are kept in a [`DashMap`] keyed by their absolute href below
//! `/obix/deviceRoot`. Resolving an arbitrary node href to its owning
//! device requires a longest-prefix walk; the result is cached in a small
//! LRU so repeated lookups under the same device (the common case: many
//! reads/writes against one device's children) stay O(1) after the first.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use obix_model::node::{CopyExclude, Node};
use obix_model::{path, ErrorKind, ObixError, Result};

use super::{access::Operation, persistence, AccessOracle, Device, DefaultOracle};

/// The pseudo-root under which every registered device lives (spec §4.2).
pub const DEVICE_ROOT: &str = "/obix/deviceRoot";

const DEFAULT_PATH_CACHE_CAPACITY: usize = 512;
const DEFAULT_TABLE_SIZE: usize = 4096;

struct PathCache {
    capacity: usize,
    order: VecDeque<String>,
    map: std::collections::HashMap<String, String>,
}

impl PathCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            map: std::collections::HashMap::new(),
        }
    }

    fn get(&mut self, href: &str) -> Option<String> {
        if let Some(device_href) = self.map.get(href).cloned() {
            self.touch(href);
            Some(device_href)
        } else {
            None
        }
    }

    fn touch(&mut self, href: &str) {
        if let Some(pos) = self.order.iter().position(|h| h == href) {
            let h = self.order.remove(pos).unwrap();
            self.order.push_back(h);
        }
    }

    fn insert(&mut self, href: String, device_href: String) {
        if self.map.contains_key(&href) {
            self.touch(&href);
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.map.remove(&evicted);
            }
        }
        self.order.push_back(href.clone());
        self.map.insert(href, device_href);
    }

    fn clear(&mut self) {
        self.order.clear();
        self.map.clear();
    }
}

pub struct DeviceRegistry {
    by_href: DashMap<String, Arc<Device>>,
    path_cache: Mutex<PathCache>,
    oracle: Box<dyn AccessOracle>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(Box::new(DefaultOracle))
    }
}

impl DeviceRegistry {
    pub fn new(oracle: Box<dyn AccessOracle>) -> Self {
        Self::with_capacity(oracle, DEFAULT_TABLE_SIZE, DEFAULT_PATH_CACHE_CAPACITY)
    }

    /// Builds a registry sized per the `dev_table_size`/`dev_cache_size`
    /// configuration keys (spec §6.2).
    pub fn with_capacity(oracle: Box<dyn AccessOracle>, table_size: usize, cache_size: usize) -> Self {
        Self {
            by_href: DashMap::with_capacity(table_size),
            path_cache: Mutex::new(PathCache::new(cache_size)),
            oracle,
        }
    }

    pub fn get(&self, device_href: &str) -> Option<Arc<Device>> {
        self.by_href.get(device_href).map(|e| e.value().clone())
    }

    pub fn all_hrefs(&self) -> Vec<String> {
        self.by_href.iter().map(|e| e.key().clone()).collect()
    }

    /// Path-cache contents, least-recently-used first (spec §2 `obix-dev-cache-dump`).
    pub fn cache_entries(&self) -> Vec<(String, String)> {
        let cache = self.path_cache.lock().unwrap_or_else(|p| p.into_inner());
        cache
            .order
            .iter()
            .filter_map(|href| cache.map.get(href).map(|dev| (href.clone(), dev.clone())))
            .collect()
    }

    /// Longest-prefix lookup: the device owning `href`, which may be `href`
    /// itself or any ancestor of it.
    pub fn resolve(&self, href: &str) -> Option<Arc<Device>> {
        {
            let mut cache = self.path_cache.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(device_href) = cache.get(href) {
                if let Some(device) = self.by_href.get(&device_href) {
                    return Some(device.value().clone());
                }
            }
        }
        let mut candidate = href.to_string();
        loop {
            if let Some(device) = self.by_href.get(&candidate) {
                let device = device.value().clone();
                self.path_cache
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .insert(href.to_string(), candidate);
                return Some(device);
            }
            match path::parent_of(&candidate) {
                Some(parent) => candidate = parent,
                None => return None,
            }
        }
    }

    /// Registers a new device rooted at `href`, whose node is already
    /// wired into the object tree by the caller. Persists `device.xml` /
    /// `meta.xml` under `res_dir` when a resource directory is configured
    /// (spec §6.3).
    pub fn add(
        &self,
        href: String,
        owner_id: String,
        subtree_root: Node,
        res_dir: Option<&Path>,
    ) -> Result<Arc<Device>> {
        if !path::is_valid_href(&href) {
            return Err(ObixError::invalid_href(format!("bad device href '{href}'")));
        }
        if self.by_href.contains_key(&href) {
            return Err(ObixError::device_exists(href));
        }
        // `href`'s direct path-parent need not itself be a registered
        // device: a device may sit nested arbitrarily deep inside another
        // device's subtree. What matters is that some ancestor device (or
        // `DEVICE_ROOT` itself, for a top-level device) exists to own it.
        let path_parent = path::parent_of(&href);
        let owning_href = match &path_parent {
            Some(parent) if parent == DEVICE_ROOT => DEVICE_ROOT.to_string(),
            Some(parent) => self
                .nearest_owning_device(parent)
                .ok_or_else(|| ObixError::device_orphan(format!("'{href}' has no owning device")))?,
            None => DEVICE_ROOT.to_string(),
        };

        let disk_dir = res_dir.map(|r| persistence::device_dir(r, &href));
        if let Some(dir) = &disk_dir {
            let device_hrefs = self.all_hrefs();
            persistence::create_files(dir, &subtree_root, &owner_id, &href, &device_hrefs)?;
        }

        let device = Arc::new(Device::new(
            href.clone(),
            owner_id,
            subtree_root,
            Some(owning_href.clone()),
            disk_dir,
        ));
        self.by_href.insert(href.clone(), device.clone());
        if owning_href != DEVICE_ROOT {
            if let Some(parent_dev) = self.by_href.get(&owning_href) {
                parent_dev
                    .children
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(href.clone());
            }
        }
        self.path_cache.lock().unwrap_or_else(|p| p.into_inner()).clear();
        Ok(device)
    }

    /// Walks up from `href` (inclusive) looking for the nearest registered
    /// device, without touching the (href-keyed, not path-keyed) LRU cache.
    fn nearest_owning_device(&self, href: &str) -> Option<String> {
        let mut candidate = href.to_string();
        loop {
            if self.by_href.contains_key(&candidate) {
                return Some(candidate);
            }
            candidate = path::parent_of(&candidate)?;
        }
    }

    /// Unregisters a device (spec §4.2 `remove`/`delete`). `op` selects
    /// which access rule applies; both require the device to have no
    /// children still signed up.
    pub fn remove(&self, href: &str, requester: &str, op: Operation) -> Result<Arc<Device>> {
        let device = self
            .by_href
            .get(href)
            .map(|e| e.value().clone())
            .ok_or_else(|| ObixError::device_no_such_uri(href.to_string()))?;

        let parent_is_root = device.parent_href.as_deref() == Some(DEVICE_ROOT);
        if !self.oracle.permits(requester, &device.owner_id, op, parent_is_root) {
            return Err(ObixError::perm_denied(format!(
                "'{requester}' may not remove device '{href}'"
            )));
        }
        {
            let children = device.children.lock().unwrap_or_else(|p| p.into_inner());
            if !children.is_empty() {
                return Err(ObixError::device_children(href.to_string()));
            }
        }

        self.by_href.remove(href);
        if let Some(parent) = &device.parent_href {
            if let Some(parent_dev) = self.by_href.get(parent) {
                parent_dev
                    .children
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .retain(|h| h != href);
            }
        }
        if let Some(dir) = &device.disk_dir {
            persistence::remove_files(dir)?;
        }
        self.path_cache.lock().unwrap_or_else(|p| p.into_inner()).clear();
        Ok(device)
    }

    /// Re-serialises a device's current subtree to disk (spec §6.3's
    /// periodic backup task calls this once per device when due).
    pub fn persist(&self, device: &Device) -> Result<()> {
        let Some(dir) = &device.disk_dir else {
            return Ok(());
        };
        let device_hrefs = self.all_hrefs();
        persistence::write_device_xml(dir, &device.subtree_root, &device.href, &device_hrefs)?;
        device.mark_written();
        Ok(())
    }

    /// Copies `node`'s subtree for a read response, crossing device
    /// boundaries by acquiring each nested device's own reader gate in
    /// turn rather than holding every gate for the whole walk (spec §4.2
    /// `copy_node`). The top-level gate is held for the full within-device
    /// walk; a nested device root triggers a fresh, independently-acquired
    /// gate for its own subtree.
    pub fn copy_node(&self, node: &Node, exclude: CopyExclude) -> Result<Node> {
        let href = node.full_href();
        let device = self
            .resolve(&href)
            .ok_or_else(|| ObixError::device_no_such_uri(href.clone()))?;
        let _guard = device.gate.reader_entry()?;
        self.copy_within_device(node, &device.href, exclude)
    }

    fn copy_within_device(&self, node: &Node, device_href: &str, exclude: CopyExclude) -> Result<Node> {
        let copy = node.shallow_copy();
        for child in node.children() {
            if exclude.hidden && child.hidden() {
                continue;
            }
            if exclude.meta && child.node_type() == obix_model::node::NodeType::Meta {
                continue;
            }
            let child_href = child.full_href();
            let copied_child = if self.by_href.contains_key(&child_href) && child_href != device_href {
                self.copy_node(&child, exclude)?
            } else {
                self.copy_within_device(&child, device_href, exclude)?
            };
            copy.add_child(copied_child);
        }
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obix_model::node::NodeType;

    fn leaf(href: &str) -> Node {
        Node::new(NodeType::Obj, href)
    }

    #[test]
    fn add_then_resolve_longest_prefix() {
        let registry = DeviceRegistry::default();
        let root = leaf("A");
        registry.add("/obix/deviceRoot/A".to_string(), "alice".to_string(), root, None).unwrap();

        let resolved = registry.resolve("/obix/deviceRoot/A/child/grandchild").unwrap();
        assert_eq!(resolved.href, "/obix/deviceRoot/A");
    }

    #[test]
    fn add_rejects_duplicate() {
        let registry = DeviceRegistry::default();
        registry.add("/obix/deviceRoot/A".to_string(), "alice".to_string(), leaf("A"), None).unwrap();
        let err = registry
            .add("/obix/deviceRoot/A".to_string(), "bob".to_string(), leaf("A"), None)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeviceExists);
    }

    #[test]
    fn add_rejects_orphan_parent() {
        let registry = DeviceRegistry::default();
        let err = registry
            .add("/obix/deviceRoot/A/B".to_string(), "alice".to_string(), leaf("B"), None)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeviceOrphan);
    }

    #[test]
    fn remove_requires_owner_outside_root() {
        let registry = DeviceRegistry::default();
        registry.add("/obix/deviceRoot/A".to_string(), "alice".to_string(), leaf("A"), None).unwrap();
        registry.add("/obix/deviceRoot/A/B".to_string(), "alice".to_string(), leaf("B"), None).unwrap();

        let err = registry.remove("/obix/deviceRoot/A/B", "mallory", Operation::Remove).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermDenied);
        registry.remove("/obix/deviceRoot/A/B", "alice", Operation::Remove).unwrap();
    }

    #[test]
    fn remove_rejects_nonempty_device() {
        let registry = DeviceRegistry::default();
        registry.add("/obix/deviceRoot/A".to_string(), "alice".to_string(), leaf("A"), None).unwrap();
        registry.add("/obix/deviceRoot/A/B".to_string(), "alice".to_string(), leaf("B"), None).unwrap();

        let err = registry.remove("/obix/deviceRoot/A", "alice", Operation::Remove).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeviceChildren);
    }

    #[test]
    fn copy_node_crosses_device_boundary() {
        let registry = DeviceRegistry::default();
        let a_root = leaf("A");
        let shared_child = leaf("shared");
        a_root.add_child(shared_child.clone());
        registry.add("/obix/deviceRoot/A".to_string(), "alice".to_string(), a_root, None).unwrap();

        let b_root = leaf("B");
        shared_child.add_child(b_root.clone());
        registry.add("/obix/deviceRoot/A/shared/B".to_string(), "bob".to_string(), b_root, None).unwrap();

        let top = registry.get("/obix/deviceRoot/A").unwrap();
        let copy = registry.copy_node(&top.subtree_root, CopyExclude::none()).unwrap();
        assert_eq!(copy.children().len(), 1);
        assert_eq!(copy.children()[0].children().len(), 1);
    }
}
