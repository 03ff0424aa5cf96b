//! The Object Tree (spec §4.1): in-memory tree of typed nodes with path
//! lookup and template cloning.

pub mod templates;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use obix_model::node::{CopyExclude, Node, NodeType};
use obix_model::{path, xml, ErrorKind, ObixError, Result};

use tracing::info;

/// Owns the root of the tree plus the static template registry. Does not
/// itself implement any locking: device/watch/history subsystems gate
/// access to their own subtrees; the root and ordinary (non-device) nodes
/// are assumed stable after startup load.
pub struct ObjectTree {
    root: Node,
    templates: HashMap<String, Node>,
}

/// Sub-directory names skipped while walking on-disk trees (spec §6.3).
const BLACKLIST: &[&str] = &["lost+found"];

impl Default for ObjectTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectTree {
    pub fn new() -> Self {
        let root = Node::root();
        build_lobby(&root);
        Self {
            root,
            templates: templates::builtin(),
        }
    }

    pub fn root(&self) -> Node {
        self.root.clone()
    }

    /// O(depth) lookup by path segment (spec §4.1).
    pub fn get(&self, href: &str) -> Option<Node> {
        if href == "/" {
            return Some(self.root.clone());
        }
        if !path::is_valid_href(href) {
            return None;
        }
        let segs = path::segments(href);
        self.root.get(&segs)
    }

    /// Deep-clones `node`'s subtree, honouring the exclusion mask. This is
    /// the plain, non-device-crossing copy; the Device Subsystem wraps it
    /// with reader-gate handoff at device boundaries (spec §4.2).
    pub fn copy(&self, node: &Node, exclude: CopyExclude) -> Node {
        node.deep_copy(exclude)
    }

    /// Clones one of the eight static templates (spec §4.1).
    pub fn insert_template(&self, name: &str) -> Result<Node> {
        self.templates
            .get(name)
            .map(|n| n.deep_copy(CopyExclude::none()))
            .ok_or_else(|| ObixError::new(ErrorKind::Fatal, format!("unknown template '{name}'")))
    }

    /// Builds an `<err/>` contract node (spec §4.1 `dump_error`).
    pub fn dump_error(&self, kind: ErrorKind, href: Option<&str>, display: &str) -> Node {
        match self.insert_template(templates::ERROR) {
            Ok(node) => {
                node.set_is(kind.contract_uri());
                node.set_val(display.to_string());
                if let Some(href) = href {
                    node.set_href(href.to_string());
                }
                node
            }
            // Construction of the error node itself failed: fall back to
            // the preallocated fatal-error template exactly once (spec §7).
            Err(_) => self
                .templates
                .get(templates::FATAL_ERROR)
                .map(|n| n.deep_copy(CopyExclude::none()))
                .unwrap_or_else(|| Node::new(obix_model::node::NodeType::Obj, "")),
        }
    }

    /// Loads every `server_*.xml` file from `core_dir` then `sys_dir`,
    /// merging children of duplicate hrefs into the existing node (spec
    /// §4.1). Missing directories are tolerated (a fresh deployment may
    /// have none yet).
    pub fn load_bootstrap(&self, core_dir: &Path, sys_dir: &Path) -> Result<()> {
        for dir in [core_dir, sys_dir] {
            if !dir.is_dir() {
                continue;
            }
            let mut entries: Vec<_> = fs::read_dir(dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with("server_") && n.ends_with(".xml"))
                        .unwrap_or(false)
                })
                .collect();
            entries.sort();
            for path in entries {
                let text = fs::read_to_string(&path)?;
                let parsed = xml::parse_tree(&text)?;
                self.merge_into_root(parsed);
                info!(file = %path.display(), "loaded bootstrap fragment");
            }
        }
        Ok(())
    }

    /// Merges `incoming`'s children into the tree: a child whose href
    /// matches an existing child at the same path has its own children
    /// re-parented into the existing node; otherwise it is inserted fresh.
    fn merge_into_root(&self, incoming: Node) {
        merge_children(&self.root, &incoming);
    }

    /// Is `dir_name` excluded from on-disk directory walks (spec §6.3)?
    pub fn is_blacklisted(dir_name: &str) -> bool {
        BLACKLIST.contains(&dir_name)
    }
}

/// Builds the fixed `/obix/{deviceRoot,watchService,historyService,batch}`
/// skeleton every deployment exposes (spec §4 "Lobby"), so the Device,
/// Watch, History and Batch subsystems have somewhere in the tree to hang
/// their nodes off of.
fn build_lobby(root: &Node) {
    let obix = Node::new(NodeType::Obj, "obix");
    obix.set_name("obix");
    root.add_child(obix.clone());

    let device_root = Node::new(NodeType::List, "deviceRoot");
    device_root.set_name("deviceRoot");
    obix.add_child(device_root);

    let watch_service = Node::new(NodeType::Obj, "watchService");
    watch_service.set_name("watchService");
    let make_op = Node::new(NodeType::Op, "make");
    make_op.set_name("make");
    watch_service.add_child(make_op);
    obix.add_child(watch_service);

    let history_service = Node::new(NodeType::Obj, "historyService");
    history_service.set_name("historyService");
    let get_op = Node::new(NodeType::Op, "get");
    get_op.set_name("get");
    history_service.add_child(get_op);
    obix.add_child(history_service);

    let batch_op = Node::new(NodeType::Op, "batch");
    batch_op.set_name("batch");
    obix.add_child(batch_op);
}

fn merge_children(existing: &Node, incoming: &Node) {
    for child in incoming.children() {
        match existing.find_child(&child.href()) {
            Some(existing_child) => merge_children(&existing_child, &child),
            None => existing.add_child(child),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obix_model::node::NodeType;
    use std::io::Write;

    #[test]
    fn get_resolves_nested_path() {
        let tree = ObjectTree::new();
        let a = Node::new(NodeType::Obj, "A");
        tree.root().add_child(a.clone());
        let n = Node::new(NodeType::Int, "n");
        a.add_child(n);
        let found = tree.get("/A/n").unwrap();
        assert_eq!(found.href(), "n");
    }

    #[test]
    fn templates_clone_independent_copies() {
        let tree = ObjectTree::new();
        let w1 = tree.insert_template(templates::WATCH).unwrap();
        let w2 = tree.insert_template(templates::WATCH).unwrap();
        assert!(!w1.ptr_eq(&w2));
    }

    #[test]
    fn load_bootstrap_merges_duplicate_hrefs() {
        let dir = tempfile::tempdir().unwrap();
        let f1 = dir.path().join("server_a.xml");
        let mut file = std::fs::File::create(&f1).unwrap();
        write!(file, r#"<obj href="/"><obj href="shared" name="shared"><int href="x" name="x" val="1"/></obj></obj>"#).unwrap();
        let f2 = dir.path().join("server_b.xml");
        let mut file = std::fs::File::create(&f2).unwrap();
        write!(file, r#"<obj href="/"><obj href="shared" name="shared"><int href="y" name="y" val="2"/></obj></obj>"#).unwrap();

        let tree = ObjectTree::new();
        tree.load_bootstrap(dir.path(), Path::new("/nonexistent")).unwrap();

        let shared = tree.get("/shared").unwrap();
        assert_eq!(shared.children().len(), 2);
    }
}
