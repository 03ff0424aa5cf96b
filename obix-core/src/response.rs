//! Fragment-based streaming response model (spec §4.7).
//!
//! A history query response can carry thousands of data records; rather
//! than building one giant XML string in memory, [`render_chunks`] splits
//! a response node into its opening tag, one chunk per child (rendered
//! independently), and its closing tag, so the HTTP layer can write each
//! chunk to the wire as it is produced.

use obix_model::node::Node;
use obix_model::{xml, Result};

pub fn render_chunks(node: &Node) -> Result<Vec<String>> {
    let children = node.children();
    if children.is_empty() {
        return Ok(vec![xml::write_node(node)?]);
    }

    let (open, close) = open_close_tags(node)?;
    let mut chunks = Vec::with_capacity(children.len() + 2);
    chunks.push(open);
    for child in &children {
        chunks.push(xml::write_node(child)?);
    }
    chunks.push(close);
    Ok(chunks)
}

fn open_close_tags(node: &Node) -> Result<(String, String)> {
    let shallow = node.shallow_copy();
    let self_closed = xml::write_node(&shallow)?;
    let tag = node.node_type().tag();
    match self_closed.strip_suffix("/>") {
        Some(stripped) => Ok((format!("{stripped}>"), format!("</{tag}>"))),
        None => Ok((self_closed, String::new())),
    }
}
