//! On-disk device persistence (spec §4.2 "Persistence format", §6.3).
//!
//! `<res>/devices/<seg1>/<seg2>/…/<name>/device.xml` holds the current
//! subtree without its descendant device subtrees; `meta.xml` holds
//! `{owner_id, href}`.

use std::fs;
use std::path::{Path, PathBuf};

use obix_model::node::{CopyExclude, Node, NodeType};
use obix_model::{xml, Result};

/// Maps an absolute device href (below `/obix/deviceRoot/`) to its
/// directory under `<res>/devices/...`.
pub fn device_dir(res_dir: &Path, href: &str) -> PathBuf {
    let mut dir = res_dir.join("devices");
    for seg in obix_model::path::segments(href) {
        dir.push(seg);
    }
    dir
}

pub struct MetaInfo {
    pub owner_id: String,
    pub href: String,
}

/// Writes `device.xml` (subtree excluding descendant device roots) and, if
/// absent, `meta.xml`.
pub fn create_files(
    dir: &Path,
    subtree: &Node,
    owner_id: &str,
    href: &str,
    device_hrefs: &[String],
) -> Result<()> {
    fs::create_dir_all(dir)?;
    write_device_xml(dir, subtree, href, device_hrefs)?;
    let meta_path = dir.join("meta.xml");
    if !meta_path.exists() {
        write_meta_xml(dir, owner_id, href)?;
    }
    Ok(())
}

/// Re-serialises `subtree` (whose absolute href is `href`) excluding any
/// descendant that is itself a registered device root, and writes it
/// atomically (write-then-rename).
pub fn write_device_xml(dir: &Path, subtree: &Node, href: &str, device_hrefs: &[String]) -> Result<()> {
    let copy = copy_excluding_devices(subtree, href, device_hrefs);
    let xml = xml::write_node(&copy)?;
    atomic_write(&dir.join("device.xml"), xml.as_bytes())
}

fn copy_excluding_devices(node: &Node, href: &str, device_hrefs: &[String]) -> Node {
    let copy = node.deep_copy(CopyExclude::none());
    // deep_copy already duplicated children; now prune any subtree whose
    // absolute href names a nested device.
    prune_device_subtrees(&copy, device_hrefs, href);
    copy
}

fn prune_device_subtrees(copy: &Node, device_hrefs: &[String], prefix: &str) {
    let children = copy.children();
    for child in &children {
        let child_path = obix_model::path::join(prefix, &child.href());
        if device_hrefs.iter().any(|h| h == &child_path) {
            copy.remove_child_identity(child);
        } else {
            prune_device_subtrees(child, device_hrefs, &child_path);
        }
    }
}

fn write_meta_xml(dir: &Path, owner_id: &str, href: &str) -> Result<()> {
    let meta = Node::new(NodeType::Obj, "");
    meta.set_of("nextdc:device-meta");

    let owner = Node::new(NodeType::Str, "");
    owner.set_name("owner_id");
    owner.set_val(owner_id.to_string());
    meta.add_child(owner);

    let href_node = Node::new(NodeType::Uri, "");
    href_node.set_val(href.to_string());
    meta.add_child(href_node);

    let xml = xml::write_node(&meta)?;
    atomic_write(&dir.join("meta.xml"), xml.as_bytes())
}

pub fn load_meta(dir: &Path) -> Result<MetaInfo> {
    let text = fs::read_to_string(dir.join("meta.xml"))?;
    let node = xml::parse_tree(&text)?;
    let mut owner_id = String::new();
    let mut href = String::new();
    for child in node.children() {
        match child.name().as_deref() {
            Some("owner_id") => owner_id = child.val().unwrap_or_default(),
            _ if child.node_type() == obix_model::node::NodeType::Uri => {
                href = child.val().unwrap_or_default();
            }
            _ => {}
        }
    }
    Ok(MetaInfo { owner_id, href })
}

pub fn load_device_xml(dir: &Path) -> Result<Node> {
    let text = fs::read_to_string(dir.join("device.xml"))?;
    xml::parse_tree(&text)
}

pub fn remove_files(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    Ok(())
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use obix_model::node::NodeType;

    #[test]
    fn create_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let subtree = Node::new(NodeType::Obj, "A");
        subtree.set_name("A");
        let child = Node::new(NodeType::Int, "n");
        child.set_name("n");
        child.set_val("0");
        subtree.add_child(child);

        create_files(dir.path(), &subtree, "alice", "/obix/deviceRoot/A", &[]).unwrap();
        assert!(dir.path().join("device.xml").exists());
        assert!(dir.path().join("meta.xml").exists());

        let meta = load_meta(dir.path()).unwrap();
        assert_eq!(meta.owner_id, "alice");
        assert_eq!(meta.href, "/obix/deviceRoot/A");

        let reloaded = load_device_xml(dir.path()).unwrap();
        assert_eq!(reloaded.children().len(), 1);
    }

    #[test]
    fn write_excludes_nested_device() {
        let dir = tempfile::tempdir().unwrap();
        let subtree = Node::new(NodeType::Obj, "A");
        let nested = Node::new(NodeType::Obj, "B");
        subtree.add_child(nested);

        write_device_xml(dir.path(), &subtree, "/A", &["/A/B".to_string()]).unwrap();
        let reloaded = load_device_xml(dir.path()).unwrap();
        assert!(reloaded.children().is_empty());
    }
}
