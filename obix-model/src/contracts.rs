//! Stable oBIX contract shapes (spec §6.4) expressed as [`Node`] builders
//! and extractors, plus the `abstime` lexical form used throughout the
//! History Subsystem.

use chrono::{DateTime, Utc};

use crate::error::{ObixError, Result};
use crate::node::{Node, NodeType};
use crate::path;

pub const EPOCH_LEXICAL: &str = "1970-01-01T00:00:00Z";

pub fn parse_abstime(val: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(val)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ObixError::invalid_input(format!("bad abstime '{val}': {e}")))
}

pub fn format_abstime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Builds an `<err/>` contract node (spec §7).
pub fn err_node(err: &ObixError) -> Node {
    let node = Node::new(NodeType::Obj, "");
    node.set_is(err.kind.contract_uri());
    node.set_val(err.message.clone());
    if let Some(href) = &err.href {
        node.set_href(href.clone());
    }
    node.set_name("err");
    node
}

/// Extracts the ordered list of hrefs from an `obix:WatchIn` body:
/// `<obj is="obix:WatchIn"><list name="hrefs" of="obix:Uri">...`
pub fn watch_in_hrefs(input: &Node) -> Result<Vec<String>> {
    let list = input
        .children()
        .into_iter()
        .find(|c| c.name().as_deref() == Some("hrefs"))
        .ok_or_else(|| ObixError::invalid_input("WatchIn missing hrefs list"))?;
    let mut out = Vec::new();
    for uri in list.children() {
        let href = uri
            .val()
            .ok_or_else(|| ObixError::invalid_input("WatchIn uri missing val"))?;
        if !path::is_valid_href(&href) {
            return Err(ObixError::invalid_href(format!("bad href '{href}'")));
        }
        out.push(href);
    }
    Ok(out)
}

/// Builds an `obix:WatchOut` list node from `(href, value-node-or-none)`
/// pairs; a `None` value yields a null object (used on delete events).
pub fn watch_out(items: Vec<(String, Option<Node>)>) -> Node {
    let list = Node::new(NodeType::List, "");
    list.set_is("obix:WatchOut");
    list.set_name("values");
    for (href, value) in items {
        match value {
            Some(v) => {
                v.set_href(path::last_segment(&href).to_string());
                list.add_child(v);
            }
            None => {
                let null = Node::new(NodeType::Obj, path::last_segment(&href).to_string());
                null.set_is("obix:Nil");
                list.add_child(null);
            }
        }
    }
    list
}

/// Builds an `obix:BatchOut` list from handler results (already rendered
/// `Node`s, success or `<err/>`), in request order (spec §4.6, invariant 8).
pub fn batch_out(results: Vec<Node>) -> Node {
    let list = Node::new(NodeType::List, "");
    list.set_is("obix:BatchOut");
    for r in results {
        list.add_child(r);
    }
    list
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub limit: Option<i64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub format: Option<String>,
    pub compact: Option<bool>,
}

/// Parses an `obix:HistoryFilter` body (all fields optional, spec §4.4).
pub fn parse_history_filter(input: &Node) -> Result<HistoryFilter> {
    let mut filter = HistoryFilter::default();
    for child in input.children() {
        match child.name().as_deref() {
            Some("limit") => {
                let raw = child.val().unwrap_or_default();
                filter.limit = raw.parse::<i64>().ok();
            }
            Some("start") => {
                if let Some(v) = child.val() {
                    filter.start = Some(parse_abstime(&v)?);
                }
            }
            Some("end") => {
                if let Some(v) = child.val() {
                    filter.end = Some(parse_abstime(&v)?);
                }
            }
            Some("format") => filter.format = child.val(),
            Some("compact") => {
                filter.compact = child.val().map(|v| v == "true");
            }
            _ => {}
        }
    }
    Ok(filter)
}

/// Extracts `(timestamp, value)` pairs, in input order, from an
/// `obix:HistoryAppendIn` body: `<obj is="obix:HistoryAppendIn"><list
/// name="data" of="obix:HistoryRecord"><obj is="obix:HistoryRecord">
/// <abstime name="timestamp" val="…"/><… name="value" …/></obj>...`
pub fn history_append_in_records(input: &Node) -> Result<Vec<(DateTime<Utc>, Node)>> {
    let list = input
        .children()
        .into_iter()
        .find(|c| c.name().as_deref() == Some("data"))
        .ok_or_else(|| ObixError::history_data("HistoryAppendIn missing data list"))?;
    let mut out = Vec::new();
    for record in list.children() {
        let mut timestamp = None;
        let mut value = None;
        for field in record.children() {
            match field.name().as_deref() {
                Some("timestamp") => {
                    if let Some(v) = field.val() {
                        timestamp = Some(parse_abstime(&v)?);
                    }
                }
                Some("value") => value = Some(field),
                _ => {}
            }
        }
        let timestamp =
            timestamp.ok_or_else(|| ObixError::history_data("HistoryRecord missing timestamp"))?;
        let value = value.ok_or_else(|| ObixError::history_data("HistoryRecord missing value"))?;
        out.push((timestamp, value));
    }
    Ok(out)
}

/// Builds the `obix:HistoryAppendOut` result node.
pub fn history_append_out(
    num_added: i64,
    new_count: i64,
    new_start: &DateTime<Utc>,
    new_end: &DateTime<Utc>,
) -> Node {
    let obj = Node::new(NodeType::Obj, "");
    obj.set_is("obix:HistoryAppendOut");

    let added = Node::new(NodeType::Int, "");
    added.set_name("numAdded");
    added.set_val(num_added.to_string());
    obj.add_child(added);

    let count = Node::new(NodeType::Int, "");
    count.set_name("newCount");
    count.set_val(new_count.to_string());
    obj.add_child(count);

    let start = Node::new(NodeType::Abstime, "");
    start.set_name("newStart");
    start.set_val(format_abstime(new_start));
    obj.add_child(start);

    let end = Node::new(NodeType::Abstime, "");
    end.set_name("newEnd");
    end.set_val(format_abstime(new_end));
    obj.add_child(end);

    obj
}

/// Builds the prefix of an `obix:HistoryQueryOut` response: `{count, start,
/// end}`. The caller appends the `data` list (streamed separately, spec
/// §4.7) and the closing tag.
pub fn history_query_out_prefix(count: i64, start: &DateTime<Utc>, end: &DateTime<Utc>) -> Node {
    let obj = Node::new(NodeType::Obj, "");
    obj.set_is("obix:HistoryQueryOut");

    let count_node = Node::new(NodeType::Int, "");
    count_node.set_name("count");
    count_node.set_val(count.to_string());
    obj.add_child(count_node);

    let start_node = Node::new(NodeType::Abstime, "");
    start_node.set_name("start");
    start_node.set_val(format_abstime(start));
    obj.add_child(start_node);

    let end_node = Node::new(NodeType::Abstime, "");
    end_node.set_name("end");
    end_node.set_val(format_abstime(end));
    obj.add_child(end_node);

    obj
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abstime_roundtrip() {
        let dt = parse_abstime("2020-01-01T00:05:00Z").unwrap();
        assert_eq!(format_abstime(&dt), "2020-01-01T00:05:00Z");
    }

    #[test]
    fn watch_in_extracts_hrefs() {
        let input = Node::new(NodeType::Obj, "");
        input.set_is("obix:WatchIn");
        let list = Node::new(NodeType::List, "");
        list.set_name("hrefs");
        list.set_of("obix:Uri");
        let uri = Node::new(NodeType::Uri, "");
        uri.set_val("/obix/deviceRoot/A/n");
        list.add_child(uri);
        input.add_child(list);

        let hrefs = watch_in_hrefs(&input).unwrap();
        assert_eq!(hrefs, vec!["/obix/deviceRoot/A/n".to_string()]);
    }
}
