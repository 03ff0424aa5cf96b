//! XML encode/decode for the tree [`Node`] representation.
//!
//! spec §1 places the XML parser/DOM library itself out of scope ("the core
//! only requires the abstract operations listed in §4.1"); this module is
//! the thin adaptor that turns [`Node`] trees into the `quick-xml` events
//! those abstract operations need, so the engine above never touches a
//! parser API directly.

use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::{ObixError, Result};
use crate::node::{Node, NodeType};

fn tag_to_type(tag: &str) -> Option<NodeType> {
    Some(match tag {
        "obj" => NodeType::Obj,
        "bool" => NodeType::Bool,
        "int" => NodeType::Int,
        "real" => NodeType::Real,
        "str" => NodeType::Str,
        "enum" => NodeType::Enum,
        "abstime" => NodeType::Abstime,
        "reltime" => NodeType::Reltime,
        "uri" => NodeType::Uri,
        "op" => NodeType::Op,
        "list" => NodeType::List,
        "ref" => NodeType::Ref,
        "meta" => NodeType::Meta,
        _ => return None,
    })
}

/// Serialises a node (and its children, in order) to an XML string.
/// Callers that want hidden/meta children dropped should call
/// [`Node::deep_copy`] with the appropriate [`crate::node::CopyExclude`]
/// mask first; this function always emits what it is given.
pub fn write_node(node: &Node) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_node_into(&mut writer, node)
        .map_err(|e| ObixError::invalid_obj(format!("xml write failed: {e}")))?;
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes)
        .map_err(|e| ObixError::invalid_obj(format!("xml is not utf-8: {e}")))
}

fn write_node_into<W: std::io::Write>(
    writer: &mut Writer<W>,
    node: &Node,
) -> std::io::Result<()> {
    let tag = node.node_type().tag().to_string();
    let mut start = BytesStart::new(tag.clone());

    let href = node.href();
    if href != "/" {
        start.push_attribute(("href", href.as_str()));
    }
    if let Some(name) = node.name() {
        start.push_attribute(("name", name.as_str()));
    }
    if let Some(is) = node.is() {
        start.push_attribute(("is", is.as_str()));
    }
    if let Some(val) = node.val() {
        start.push_attribute(("val", val.as_str()));
    }
    if let Some(of) = node.of() {
        start.push_attribute(("of", of.as_str()));
    }
    if node.writable() {
        start.push_attribute(("writable", "true"));
    }
    if node.hidden() {
        start.push_attribute(("hidden", "true"));
    }
    if let Some(op_id) = node.op_id() {
        start.push_attribute(("op", op_id.to_string().as_str()));
    }
    if let Some(watch_id) = node.watch_marker() {
        start.push_attribute(("watch", watch_id.to_string().as_str()));
    }

    let children = node.children();
    if children.is_empty() {
        writer.write_event(Event::Empty(start))?;
    } else {
        writer.write_event(Event::Start(start))?;
        for child in &children {
            write_node_into(writer, child)?;
        }
        writer.write_event(Event::End(BytesEnd::new(tag)))?;
    }
    Ok(())
}

/// Parses a single XML document into one root [`Node`], discarding comments
/// (spec §4.1: "comments are discarded on load").
pub fn parse_tree(xml: &str) -> Result<Node> {
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| ObixError::invalid_obj(format!("xml parse error: {e}")))?
        {
            Event::Start(ref e) => {
                let node = node_from_start(e)?;
                if let Some(parent) = stack.last() {
                    parent.add_child(node.clone());
                } else {
                    root = Some(node.clone());
                }
                stack.push(node);
            }
            Event::Empty(ref e) => {
                let node = node_from_start(e)?;
                if let Some(parent) = stack.last() {
                    parent.add_child(node);
                } else {
                    root = Some(node);
                }
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Comment(_) => {}
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    root.ok_or_else(|| ObixError::invalid_obj("empty xml document"))
}

fn node_from_start(e: &BytesStart) -> Result<Node> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let node_type = tag_to_type(&tag)
        .ok_or_else(|| ObixError::invalid_obj(format!("unknown tag <{tag}>")))?;

    let node = Node::new(node_type, "");
    let mut href_set = false;
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value().unwrap_or_default().to_string();
        match key.as_str() {
            "href" => {
                node.set_href(value);
                href_set = true;
            }
            "name" => node.set_name(value),
            "is" => node.set_is(value),
            "val" => node.set_val(value),
            "of" => node.set_of(value),
            "writable" => node.set_writable(value == "true"),
            "hidden" => node.set_hidden(value == "true"),
            "op" => {
                if let Ok(id) = value.parse() {
                    node.set_op_id(id);
                }
            }
            "watch" => {
                if let Ok(id) = value.parse() {
                    node.set_watch_marker(id);
                }
            }
            _ => {}
        }
    }
    if !href_set {
        // A node without an explicit href is addressed by its `name`
        // (common for list items and anonymous children).
        if let Some(name) = node.name() {
            node.set_href(name);
        }
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    #[test]
    fn roundtrip_simple_node() {
        let root = Node::new(NodeType::Int, "n");
        root.set_name("n");
        root.set_val("7");
        root.set_writable(true);
        let xml = write_node(&root).unwrap();
        assert!(xml.contains("val=\"7\""));
        assert!(xml.contains("writable=\"true\""));

        let parsed = parse_tree(&xml).unwrap();
        assert_eq!(parsed.node_type(), NodeType::Int);
        assert_eq!(parsed.val().as_deref(), Some("7"));
    }

    #[test]
    fn roundtrip_nested_children() {
        let root = Node::new(NodeType::Obj, "A");
        root.set_name("A");
        let child = Node::new(NodeType::Int, "n");
        child.set_name("n");
        child.set_val("0");
        root.add_child(child);

        let xml = write_node(&root).unwrap();
        let parsed = parse_tree(&xml).unwrap();
        assert_eq!(parsed.children().len(), 1);
        assert_eq!(parsed.children()[0].href(), "n");
    }
}
