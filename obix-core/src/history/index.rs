//! Per-device fragment index (spec §4.4 "index.xml"): which day fragments
//! exist, how many records each holds, and their timestamp span, so a
//! query can skip straight to the fragments that can possibly overlap its
//! `start`/`end` filter instead of scanning every fragment ever written.

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use obix_model::contracts::{format_abstime, parse_abstime};
use obix_model::node::{Node, NodeType};
use obix_model::{xml, Result};

#[derive(Debug, Clone)]
pub struct FragmentMeta {
    pub date: NaiveDate,
    pub count: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct Index {
    /// Ascending by date.
    pub fragments: Vec<FragmentMeta>,
}

impl Index {
    pub fn total_count(&self) -> u64 {
        self.fragments.iter().map(|f| f.count).sum()
    }

    pub fn overall_start(&self) -> Option<DateTime<Utc>> {
        self.fragments.first().map(|f| f.start)
    }

    pub fn overall_end(&self) -> Option<DateTime<Utc>> {
        self.fragments.last().map(|f| f.end)
    }

    /// Folds one freshly-appended record into the index, creating or
    /// extending the entry for its day.
    pub fn record_append(&mut self, date: NaiveDate, timestamp: DateTime<Utc>) {
        match self.fragments.iter_mut().find(|f| f.date == date) {
            Some(entry) => {
                entry.count += 1;
                if timestamp < entry.start {
                    entry.start = timestamp;
                }
                if timestamp > entry.end {
                    entry.end = timestamp;
                }
            }
            None => {
                self.fragments.push(FragmentMeta {
                    date,
                    count: 1,
                    start: timestamp,
                    end: timestamp,
                });
                self.fragments.sort_by_key(|f| f.date);
            }
        }
    }

    /// The fragments whose span can overlap `[start, end]` (either bound
    /// optional, meaning unbounded on that side).
    pub fn fragments_overlapping(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Vec<&FragmentMeta> {
        self.fragments
            .iter()
            .filter(|f| {
                let after_start = start.map(|s| f.end >= s).unwrap_or(true);
                let before_end = end.map(|e| f.start <= e).unwrap_or(true);
                after_start && before_end
            })
            .collect()
    }
}

pub fn index_path(history_dir: &Path) -> std::path::PathBuf {
    history_dir.join("index.xml")
}

pub fn load_index(history_dir: &Path) -> Result<Index> {
    let path = index_path(history_dir);
    if !path.exists() {
        return Ok(Index::default());
    }
    let text = fs::read_to_string(&path)?;
    let root = xml::parse_tree(&text)?;
    let mut fragments = Vec::new();
    for child in root.children() {
        let date = child
            .name()
            .and_then(|n| NaiveDate::parse_from_str(&n, "%Y_%m_%d").ok());
        let Some(date) = date else { continue };
        let mut count = 0u64;
        let mut start = None;
        let mut end = None;
        for field in child.children() {
            match field.name().as_deref() {
                Some("count") => count = field.val().and_then(|v| v.parse().ok()).unwrap_or(0),
                Some("start") => start = field.val().and_then(|v| parse_abstime(&v).ok()),
                Some("end") => end = field.val().and_then(|v| parse_abstime(&v).ok()),
                _ => {}
            }
        }
        if let (Some(start), Some(end)) = (start, end) {
            fragments.push(FragmentMeta { date, count, start, end });
        }
    }
    fragments.sort_by_key(|f| f.date);
    Ok(Index { fragments })
}

pub fn save_index(history_dir: &Path, index: &Index) -> Result<()> {
    fs::create_dir_all(history_dir)?;
    let root = Node::new(NodeType::Obj, "");
    root.set_is("obix:HistoryFileAbstract");
    for fragment in &index.fragments {
        let entry = Node::new(NodeType::Obj, "");
        entry.set_name(fragment.date.format("%Y_%m_%d").to_string());

        let count = Node::new(NodeType::Int, "");
        count.set_name("count");
        count.set_val(fragment.count.to_string());
        entry.add_child(count);

        let start = Node::new(NodeType::Abstime, "");
        start.set_name("start");
        start.set_val(format_abstime(&fragment.start));
        entry.add_child(start);

        let end = Node::new(NodeType::Abstime, "");
        end.set_name("end");
        end.set_val(format_abstime(&fragment.end));
        entry.add_child(end);

        root.add_child(entry);
    }
    let xml = xml::write_node(&root)?;
    let tmp = index_path(history_dir).with_extension("tmp");
    fs::write(&tmp, xml.as_bytes())?;
    fs::rename(&tmp, index_path(history_dir))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_append_creates_and_extends_entry() {
        let mut index = Index::default();
        let d = NaiveDate::from_ymd_opt(2026, 7, 29).unwrap();
        let t1 = "2026-07-29T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let t2 = "2026-07-29T09:00:00Z".parse::<DateTime<Utc>>().unwrap();
        index.record_append(d, t1);
        index.record_append(d, t2);
        assert_eq!(index.fragments.len(), 1);
        assert_eq!(index.fragments[0].count, 2);
        assert_eq!(index.fragments[0].end, t2);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::default();
        let d = NaiveDate::from_ymd_opt(2026, 7, 29).unwrap();
        let t1 = "2026-07-29T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
        index.record_append(d, t1);
        save_index(dir.path(), &index).unwrap();

        let reloaded = load_index(dir.path()).unwrap();
        assert_eq!(reloaded.fragments.len(), 1);
        assert_eq!(reloaded.fragments[0].count, 1);
    }
}
