//! Request dispatch (spec §4.5): verb routing over GET/PUT/POST, resolved
//! against the object tree, device registry, watch registry and history
//! registry. Never propagates an `Err` past [`Dispatcher::handle`] — every
//! failure is turned into an `<err/>` contract node (spec §7: the server
//! never answers with an HTTP-level failure).

use std::sync::Arc;

use obix_model::node::{CopyExclude, Node, NodeType};
use obix_model::{contracts, path, ErrorKind, ObixError, Result};

use crate::device::access::Operation;
use crate::device::registry::DEVICE_ROOT;
use crate::device::DeviceRegistry;
use crate::history::HistoryRegistry;
use crate::tree::ObjectTree;
use crate::watch::WatchRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Put,
    Post,
}

pub struct Request {
    pub verb: Verb,
    pub href: String,
    pub requester_id: String,
    pub input: Option<Node>,
}

pub struct Dispatcher {
    pub tree: Arc<ObjectTree>,
    pub devices: Arc<DeviceRegistry>,
    pub watches: Arc<WatchRegistry>,
    pub histories: Arc<HistoryRegistry>,
}

impl Dispatcher {
    pub fn new(
        tree: Arc<ObjectTree>,
        devices: Arc<DeviceRegistry>,
        watches: Arc<WatchRegistry>,
        histories: Arc<HistoryRegistry>,
    ) -> Self {
        Self {
            tree,
            devices,
            watches,
            histories,
        }
    }

    /// Top-level entry point: never returns an error, only a response
    /// node (either the successful result or an `<err/>` contract).
    pub fn handle(&self, req: Request) -> Node {
        let href = req.href.clone();
        match self.try_handle(req) {
            Ok(node) => node,
            Err(err) => {
                let err = if err.href.is_none() {
                    err.with_href(href)
                } else {
                    err
                };
                self.tree.dump_error(err.kind, err.href.as_deref(), &err.message)
            }
        }
    }

    fn try_handle(&self, req: Request) -> Result<Node> {
        match req.verb {
            Verb::Get => self.handle_get(&req.href),
            Verb::Put => self.handle_put(&req),
            Verb::Post => self.handle_post(&req),
        }
    }

    fn resolve(&self, href: &str) -> Result<Node> {
        self.tree
            .get(href)
            .ok_or_else(|| ObixError::no_such_uri(format!("no object at '{href}'")))
    }

    fn handle_get(&self, href: &str) -> Result<Node> {
        match href {
            "/obix-dump" => return Ok(self.dump_tree()),
            "/obix-dev-dump" => return Ok(self.dump_device_hrefs()),
            "/obix-dev-cache-dump" => return Ok(self.dump_device_cache()),
            _ => {}
        }
        if href == DEVICE_ROOT {
            return Ok(self.dump_device_root_list());
        }
        let node = self.resolve(href)?;
        if path::is_ancestor_or_eq(DEVICE_ROOT, href) {
            self.devices.copy_node(&node, CopyExclude::read_response())
        } else {
            Ok(self.tree.copy(&node, CopyExclude::read_response()))
        }
    }

    /// `/obix-dump` (spec §2): mirrors the whole tree from root.
    fn dump_tree(&self) -> Node {
        self.tree.copy(&self.tree.root(), CopyExclude::read_response())
    }

    /// `/obix-dev-dump` (spec §2): every registered device href, as a list
    /// of `uri` values.
    fn dump_device_hrefs(&self) -> Node {
        let list = Node::new(NodeType::List, "obix-dev-dump");
        for href in self.devices.all_hrefs() {
            let uri = Node::new(NodeType::Uri, "");
            uri.set_val(href);
            list.add_child(uri);
        }
        list
    }

    /// `/obix-dev-cache-dump` (spec §2): the path-LRU contents in recency
    /// order, each entry the looked-up path paired with its owning device.
    fn dump_device_cache(&self) -> Node {
        let list = Node::new(NodeType::List, "obix-dev-cache-dump");
        for (path, device_href) in self.devices.cache_entries() {
            let entry = Node::new(NodeType::Str, "");
            entry.set_name(path);
            entry.set_val(device_href);
            list.add_child(entry);
        }
        list
    }

    /// GET on `/obix/deviceRoot` (spec §4.5): a list of `ref` nodes, one per
    /// direct top-level device, rather than the full subtree of every device.
    fn dump_device_root_list(&self) -> Node {
        let list = Node::new(NodeType::List, "deviceRoot");
        for href in self.devices.all_hrefs() {
            if let Some(device) = self.devices.get(&href) {
                if device.parent_href.as_deref() == Some(DEVICE_ROOT) {
                    list.add_child(device.ref_stub.deep_copy(CopyExclude::none()));
                }
            }
        }
        list
    }

    fn handle_put(&self, req: &Request) -> Result<Node> {
        let node = self.resolve(&req.href)?;
        if !node.writable() {
            return Err(ObixError::readonly_href(format!("'{}' is not writable", req.href)));
        }
        let input = req
            .input
            .as_ref()
            .ok_or_else(|| ObixError::no_input("PUT requires a body"))?;

        let device = self.devices.resolve(&req.href);
        let _guard = match &device {
            Some(d) => Some(d.gate.writer_entry()?),
            None => None,
        };

        node.set_val(input.val().unwrap_or_default());
        self.watches.notify_all(&node);
        if let Some(device) = &device {
            self.devices.persist(device).ok();
        }
        Ok(self.tree.copy(&node, CopyExclude::read_response()))
    }

    fn handle_post(&self, req: &Request) -> Result<Node> {
        let href = req.href.as_str();
        if href == "/obix/deviceRoot/signUp" {
            return self.sign_up(req);
        }
        if let Some(device_href) = href.strip_suffix("/signOff") {
            return self.sign_off(device_href, &req.requester_id);
        }
        if href == "/obix/watchService/make" {
            return self.watch_make(req);
        }
        if let Some((watch_href, op)) = split_last_segment(href) {
            if let Some(watch) = self.find_watch_by_href(watch_href) {
                return self.watch_op(&watch, op, req);
            }
        }
        if href == "/obix/historyService/get" {
            return self.history_get(req);
        }
        if let Some(history_href) = href.strip_suffix("/append") {
            return self.history_append(history_href, req);
        }
        if let Some(history_href) = href.strip_suffix("/query") {
            return self.history_query(history_href, req);
        }
        if href == "/obix/batch" {
            return self.batch(req);
        }
        Err(ObixError::no_op_node(format!("no operation at '{href}'")))
    }

    fn sign_up(&self, req: &Request) -> Result<Node> {
        if req.requester_id.is_empty() {
            return Err(ObixError::no_requester_id("signUp requires a non-empty requester id"));
        }
        let input = req
            .input
            .as_ref()
            .ok_or_else(|| ObixError::no_input("signUp requires a device body"))?;
        let name = input
            .name()
            .ok_or_else(|| ObixError::no_name("signUp body has no name"))?;
        let href = path::join(DEVICE_ROOT, &name);

        let subtree = input.deep_copy(CopyExclude::none());
        subtree.set_href(name);
        let _device = self.devices.add(href, req.requester_id.clone(), subtree.clone(), None)?;
        if let Some(parent) = self.tree.get(DEVICE_ROOT) {
            parent.add_child(subtree.clone());
        }
        Ok(self.tree.copy(&subtree, CopyExclude::read_response()))
    }

    fn sign_off(&self, device_href: &str, requester: &str) -> Result<Node> {
        if requester.is_empty() {
            return Err(ObixError::no_requester_id("signOff requires a non-empty requester id"));
        }
        let device = self.devices.remove(device_href, requester, Operation::Remove)?;
        let removed = device.subtree_root.deep_copy(CopyExclude::read_response());
        if let Some(parent) = device.subtree_root.parent() {
            parent.remove_child_identity(&device.subtree_root);
        }
        Ok(removed)
    }

    fn watch_make(&self, req: &Request) -> Result<Node> {
        let watch = crate::watch::WatchRegistry::make(&self.watches, req.requester_id.clone());
        let contract = self.tree.insert_template(crate::tree::templates::WATCH)?;
        contract.set_href(format!("watchService/watch{}", watch.id));
        Ok(contract)
    }

    fn find_watch_by_href(&self, href: &str) -> Option<Arc<crate::watch::Watch>> {
        let segment = path::last_segment(href);
        let id: u64 = segment.strip_prefix("watch")?.parse().ok()?;
        self.watches.get(id)
    }

    fn watch_op(&self, watch: &Arc<crate::watch::Watch>, op: &str, req: &Request) -> Result<Node> {
        if watch.requester_id != req.requester_id && !crate::device::access::is_subsystem(&req.requester_id) {
            return Err(ObixError::perm_denied(format!(
                "'{}' may not operate watch {}",
                req.requester_id, watch.id
            )));
        }
        self.watches.refresh_lease(watch);
        match op {
            "add" => {
                let input = req.input.as_ref().ok_or_else(|| ObixError::no_input("add requires WatchIn"))?;
                let hrefs = contracts::watch_in_hrefs(input)?;
                let mut out = Vec::new();
                for href in hrefs {
                    let node = self.resolve(&href)?;
                    watch.add_item(href.clone(), node.clone())?;
                    out.push((href, Some(node.deep_copy(CopyExclude::read_response()))));
                }
                Ok(contracts::watch_out(out))
            }
            "remove" => {
                let input = req
                    .input
                    .as_ref()
                    .ok_or_else(|| ObixError::no_input("remove requires WatchIn"))?;
                let hrefs = contracts::watch_in_hrefs(input)?;
                for href in &hrefs {
                    watch.remove_item(href);
                }
                Ok(contracts::watch_out(Vec::new()))
            }
            "pollChanges" => Ok(contracts::watch_out(watch.poll_changes())),
            "pollRefresh" => Ok(contracts::watch_out(watch.poll_refresh())),
            "delete" => {
                self.watches.delete(watch.id, &req.requester_id)?;
                Ok(Node::new(NodeType::Obj, ""))
            }
            _ => Err(ObixError::no_op_node(format!("unknown watch operation '{op}'"))),
        }
    }

    fn history_get(&self, req: &Request) -> Result<Node> {
        let input = req
            .input
            .as_ref()
            .ok_or_else(|| ObixError::history_devid("historyService.get requires a device id"))?;
        let device_href = input
            .val()
            .ok_or_else(|| ObixError::history_devid("missing device id value"))?;
        let _facility = self.histories.get_or_create(&device_href)?;
        let contract = self.tree.insert_template(crate::tree::templates::HISTORY_DEVICE)?;
        contract.set_href(history_contract_href(&device_href));
        Ok(contract)
    }

    fn history_append(&self, history_href: &str, req: &Request) -> Result<Node> {
        let device_href = history_device_href(history_href)?;
        let facility = self.histories.get_or_create(&device_href)?;
        let input = req
            .input
            .as_ref()
            .ok_or_else(|| ObixError::history_data("append requires records"))?;
        let records = contracts::history_append_in_records(input)?;
        facility.append(records)
    }

    fn history_query(&self, history_href: &str, req: &Request) -> Result<Node> {
        let device_href = history_device_href(history_href)?;
        let facility = self
            .histories
            .get(&device_href)
            .ok_or_else(|| ObixError::new(ErrorKind::HistoryEmpty, "device has no history records"))?;
        let filter = match &req.input {
            Some(input) => contracts::parse_history_filter(input)?,
            None => Default::default(),
        };
        let (prefix, records) = facility.query(&filter)?;
        let data = Node::new(obix_model::node::NodeType::List, "");
        data.set_name("data");
        for record in records {
            data.add_child(record.value);
        }
        prefix.add_child(data);
        Ok(prefix)
    }

    fn batch(&self, req: &Request) -> Result<Node> {
        let input = req
            .input
            .as_ref()
            .ok_or_else(|| ObixError::no_input("batch requires an obix:BatchIn list"))?;
        crate::batch::run(self, input, &req.requester_id)
    }
}

fn split_last_segment(href: &str) -> Option<(&str, &str)> {
    let idx = href.rfind('/')?;
    Some((&href[..idx], &href[idx + 1..]))
}

fn history_contract_href(device_href: &str) -> String {
    format!("historyService/histories{device_href}")
}

fn history_device_href(history_href: &str) -> Result<String> {
    history_href
        .strip_prefix("/obix/historyService/histories")
        .map(|s| s.to_string())
        .ok_or_else(|| ObixError::history_devid(format!("not a history href: '{history_href}'")))
}
