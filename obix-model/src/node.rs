//! The in-memory tree node (spec §3 "Tree node", §4.1).
//!
//! A [`Node`] is a cheap handle (`Arc`) to a mutex-guarded [`NodeData`].
//! Mutation is not self-synchronising: callers are expected to already hold
//! the writer gate of the owning device (spec §5) before calling any `set_*`
//! method. The `Mutex` here exists only so `Node` is `Send + Sync` across the
//! OS-thread pool that serves requests; it is not the concurrency control
//! point described in spec §5.

use std::sync::{Arc, Mutex, Weak};

/// Semantic type of a tree node (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Obj,
    Bool,
    Int,
    Real,
    Str,
    Enum,
    Abstime,
    Reltime,
    Uri,
    Op,
    List,
    Ref,
    /// A hidden marker node, e.g. a watch-item meta-marker (spec §3, §4.3).
    Meta,
}

impl NodeType {
    pub const fn tag(self) -> &'static str {
        match self {
            NodeType::Obj => "obj",
            NodeType::Bool => "bool",
            NodeType::Int => "int",
            NodeType::Real => "real",
            NodeType::Str => "str",
            NodeType::Enum => "enum",
            NodeType::Abstime => "abstime",
            NodeType::Reltime => "reltime",
            NodeType::Uri => "uri",
            NodeType::Op => "op",
            NodeType::List => "list",
            NodeType::Ref => "ref",
            NodeType::Meta => "meta",
        }
    }
}

#[derive(Debug)]
pub(crate) struct NodeData {
    pub node_type: NodeType,
    /// Single path segment; the root alone carries `"/"`.
    pub href: String,
    pub name: Option<String>,
    pub val: Option<String>,
    pub is: Option<String>,
    pub writable: bool,
    pub hidden: bool,
    pub of: Option<String>,
    /// Dispatcher handler id for `op` nodes (spec §4.5's hidden `meta
    /// op="<id>"` attribute, modelled directly rather than as a child).
    pub op_id: Option<u32>,
    /// Watch id this marker notifies, set only on `NodeType::Meta` nodes
    /// inserted by the Watch Subsystem (spec §3, §4.3).
    pub watch_marker: Option<u64>,
    pub children: Vec<Node>,
    pub parent: Option<Weak<Mutex<NodeData>>>,
}

/// A handle to a tree node. Clones share the same underlying node.
#[derive(Debug, Clone)]
pub struct Node(Arc<Mutex<NodeData>>);

/// Which kinds of children to drop while deep-copying a subtree (spec
/// §4.1's `copy(node, exclude)`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyExclude {
    pub hidden: bool,
    pub meta: bool,
}

impl CopyExclude {
    pub const fn read_response() -> Self {
        Self {
            hidden: true,
            meta: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            hidden: false,
            meta: false,
        }
    }
}

impl Node {
    pub fn new(node_type: NodeType, href: impl Into<String>) -> Self {
        Self(Arc::new(Mutex::new(NodeData {
            node_type,
            href: href.into(),
            name: None,
            val: None,
            is: None,
            writable: false,
            hidden: false,
            of: None,
            op_id: None,
            watch_marker: None,
            children: Vec::new(),
            parent: None,
        })))
    }

    pub fn root() -> Self {
        let root = Self::new(NodeType::Obj, "/");
        root.set_name("/");
        root
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NodeData> {
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn node_type(&self) -> NodeType {
        self.lock().node_type
    }

    pub fn href(&self) -> String {
        self.lock().href.clone()
    }

    pub fn set_href(&self, href: impl Into<String>) {
        self.lock().href = href.into();
    }

    pub fn name(&self) -> Option<String> {
        self.lock().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.lock().name = Some(name.into());
    }

    pub fn val(&self) -> Option<String> {
        self.lock().val.clone()
    }

    pub fn set_val(&self, val: impl Into<String>) {
        self.lock().val = Some(val.into());
    }

    pub fn is(&self) -> Option<String> {
        self.lock().is.clone()
    }

    pub fn set_is(&self, is: impl Into<String>) {
        self.lock().is = Some(is.into());
    }

    pub fn writable(&self) -> bool {
        self.lock().writable
    }

    pub fn set_writable(&self, writable: bool) {
        self.lock().writable = writable;
    }

    pub fn hidden(&self) -> bool {
        self.lock().hidden
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.lock().hidden = hidden;
    }

    pub fn of(&self) -> Option<String> {
        self.lock().of.clone()
    }

    pub fn set_of(&self, of: impl Into<String>) {
        self.lock().of = Some(of.into());
    }

    pub fn op_id(&self) -> Option<u32> {
        self.lock().op_id
    }

    pub fn set_op_id(&self, id: u32) {
        self.lock().op_id = Some(id);
    }

    pub fn watch_marker(&self) -> Option<u64> {
        self.lock().watch_marker
    }

    pub fn set_watch_marker(&self, watch_id: u64) {
        self.lock().watch_marker = Some(watch_id);
    }

    pub fn parent(&self) -> Option<Node> {
        self.lock().parent.as_ref().and_then(Weak::upgrade).map(Node)
    }

    pub fn children(&self) -> Vec<Node> {
        self.lock().children.clone()
    }

    /// Appends `child` as the last child, wiring its parent back-pointer.
    pub fn add_child(&self, child: Node) {
        child.0.lock().unwrap_or_else(|p| p.into_inner()).parent =
            Some(Arc::downgrade(&self.0));
        self.lock().children.push(child);
    }

    /// Removes and returns the direct child with the given href segment.
    pub fn remove_child_by_href(&self, href: &str) -> Option<Node> {
        let mut data = self.lock();
        let idx = data.children.iter().position(|c| c.href() == href)?;
        Some(data.children.remove(idx))
    }

    /// Removes a specific child by identity (used to unlink a watch marker).
    pub fn remove_child_identity(&self, target: &Node) -> bool {
        let mut data = self.lock();
        let idx = data.children.iter().position(|c| c.ptr_eq(target));
        if let Some(idx) = idx {
            data.children.remove(idx);
            true
        } else {
            false
        }
    }

    pub fn find_child(&self, href: &str) -> Option<Node> {
        self.lock().children.iter().find(|c| c.href() == href).cloned()
    }

    /// All `Meta` children carrying a watch marker.
    pub fn watch_markers(&self) -> Vec<(Node, u64)> {
        self.lock()
            .children
            .iter()
            .filter_map(|c| c.watch_marker().map(|id| (c.clone(), id)))
            .collect()
    }

    /// The absolute path of this node, reconstructed by walking parents
    /// (spec §3: "other nodes' paths are recovered by walking parents").
    pub fn full_href(&self) -> String {
        let mut segs = Vec::new();
        let mut cur = self.clone();
        loop {
            let href = cur.href();
            match cur.parent() {
                Some(p) => {
                    segs.push(href);
                    cur = p;
                }
                None => break,
            }
        }
        if segs.is_empty() {
            return "/".to_string();
        }
        segs.reverse();
        let mut out = String::new();
        for seg in segs {
            out.push('/');
            out.push_str(&seg);
        }
        out
    }

    /// Looks up a direct descendant by an absolute or relative path of
    /// segments below this node (used by [`crate::path::segments`]
    /// callers); walks one segment at a time, O(depth).
    pub fn get(&self, segments: &[&str]) -> Option<Node> {
        let mut cur = self.clone();
        for seg in segments {
            cur = cur.find_child(seg)?;
        }
        Some(cur)
    }

    /// Copies this node's own attributes into a fresh, childless node.
    pub fn shallow_copy(&self) -> Node {
        let data = self.lock();
        let copy = Node::new(data.node_type, data.href.clone());
        {
            let mut cd = copy.lock();
            cd.name = data.name.clone();
            cd.val = data.val.clone();
            cd.is = data.is.clone();
            cd.writable = data.writable;
            cd.hidden = data.hidden;
            cd.of = data.of.clone();
            cd.op_id = data.op_id;
        }
        copy
    }

    /// Deep-clones this subtree, honouring the exclusion mask. Does not
    /// cross device boundaries by itself — callers that must hand off
    /// reader gates between devices (spec §4.2 `copy_node`) walk the tree
    /// themselves and call this per-device-subtree.
    pub fn deep_copy(&self, exclude: CopyExclude) -> Node {
        let copy = self.shallow_copy();
        for child in self.children() {
            if exclude.hidden && child.hidden() {
                continue;
            }
            if exclude.meta && child.node_type() == NodeType::Meta {
                continue;
            }
            copy.add_child(child.deep_copy(exclude));
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_href_walks_parents() {
        let root = Node::root();
        let a = Node::new(NodeType::Obj, "A");
        root.add_child(a.clone());
        let n = Node::new(NodeType::Int, "n");
        a.add_child(n.clone());
        assert_eq!(n.full_href(), "/A/n");
        assert_eq!(a.full_href(), "/A");
        assert_eq!(root.full_href(), "/");
    }

    #[test]
    fn deep_copy_excludes_hidden_and_meta() {
        let root = Node::new(NodeType::Obj, "A");
        let visible = Node::new(NodeType::Int, "n");
        root.add_child(visible);
        let hidden = Node::new(NodeType::Int, "secret");
        hidden.set_hidden(true);
        root.add_child(hidden);
        let marker = Node::new(NodeType::Meta, "meta");
        marker.set_watch_marker(7);
        root.add_child(marker);

        let copy = root.deep_copy(CopyExclude::read_response());
        assert_eq!(copy.children().len(), 1);
        assert_eq!(copy.children()[0].href(), "n");
    }

    #[test]
    fn remove_child_identity_unlinks_marker() {
        let node = Node::new(NodeType::Int, "n");
        let marker = Node::new(NodeType::Meta, "meta");
        marker.set_watch_marker(1);
        node.add_child(marker.clone());
        assert!(node.remove_child_identity(&marker));
        assert!(node.watch_markers().is_empty());
    }
}
