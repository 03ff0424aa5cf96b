//! Day-fragment files (spec §4.4 "Persistence format"): one file per
//! calendar day holding a concatenation of `<obj is="obix:HistoryRecord">
//! …</obj>\r\n` records in ascending timestamp order, appended with a
//! `sync_data` call per write standing in for the original's `O_SYNC` open
//! flag (`std::fs` has no portable equivalent of opening with `O_SYNC`
//! directly).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use obix_model::node::{Node, NodeType};
use obix_model::{xml, Result};

use obix_model::contracts::{format_abstime, parse_abstime};

pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub value: Node,
}

pub fn fragment_path(history_dir: &Path, date: NaiveDate) -> PathBuf {
    history_dir.join(format!("{}.fragment", date.format("%Y-%m-%d")))
}

/// Wraps `value` with its timestamp in an `obix:HistoryRecord` contract and
/// appends it to the day fragment for `record.timestamp`'s date, delimited
/// by `\r\n` and fsynced (spec §4.4 Layout: "`<obj is="obix:HistoryRecord">
/// …</obj>\r\n` serialisations").
pub fn append_record(history_dir: &Path, record: &Record) -> Result<()> {
    fs::create_dir_all(history_dir)?;
    let date = record.timestamp.date_naive();
    let path = fragment_path(history_dir, date);

    let wrapper = Node::new(NodeType::Obj, "");
    wrapper.set_is("obix:HistoryRecord");
    let ts_node = Node::new(NodeType::Abstime, "");
    ts_node.set_name("timestamp");
    ts_node.set_val(format_abstime(&record.timestamp));
    wrapper.add_child(ts_node);

    let value = record.value.shallow_copy();
    value.set_name("value");
    wrapper.add_child(value);

    let xml = xml::write_node(&wrapper)?;
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    write!(file, "{xml}\r\n")?;
    file.sync_data()?;
    Ok(())
}

/// Reads every record in the fragment for `date`, in file (append) order.
/// Returns an empty vector if no fragment exists for that day yet.
pub fn read_fragment(history_dir: &Path, date: NaiveDate) -> Result<Vec<Record>> {
    let path = fragment_path(history_dir, date);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(&path)?;
    let mut records = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let wrapper = xml::parse_tree(line)?;
        let mut timestamp = None;
        let mut value = None;
        for child in wrapper.children() {
            match child.name().as_deref() {
                Some("timestamp") => {
                    if let Some(val) = child.val() {
                        timestamp = parse_abstime(&val).ok();
                    }
                }
                Some("value") => value = Some(child),
                _ => {}
            }
        }
        if let (Some(timestamp), Some(value)) = (timestamp, value) {
            records.push(Record { timestamp, value });
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use obix_model::node::NodeType;

    #[test]
    fn append_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let value = Node::new(NodeType::Real, "");
        value.set_val("21.5");
        let ts = "2026-07-29T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        append_record(dir.path(), &Record { timestamp: ts, value }).unwrap();

        let records = read_fragment(dir.path(), ts.date_naive()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value.val().as_deref(), Some("21.5"));
    }

    #[test]
    fn missing_fragment_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let records = read_fragment(dir.path(), NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()).unwrap();
        assert!(records.is_empty());
    }
}
