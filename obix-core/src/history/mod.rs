//! The History Subsystem (spec §4.4): per-device append-only time-series
//! storage with an index for query pruning.

pub mod fragment;
pub mod index;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use obix_model::contracts::{self, HistoryFilter};
use obix_model::node::Node;
use obix_model::{ErrorKind, ObixError, Result};

use crate::sync::Gate;
use fragment::Record;
use index::Index;

/// One device's history store: its own gate (so appends and queries don't
/// race each other) plus its fragment index.
pub struct HistoryFacility {
    pub device_href: String,
    dir: PathBuf,
    gate: Gate,
    index: std::sync::Mutex<Index>,
}

impl HistoryFacility {
    fn load(device_href: String, dir: PathBuf) -> Result<Self> {
        let index = index::load_index(&dir)?;
        Ok(Self {
            device_href,
            dir,
            gate: Gate::new(),
            index: std::sync::Mutex::new(index),
        })
    }

    /// Appends `records` (each `(timestamp, value)`, parsed from the
    /// caller's own `<abstime name="timestamp">`), in input order, returning
    /// the `obix:HistoryAppendOut` contract (spec §4.4 `append`). Rejects
    /// with `ts-obsolete` — leaving the file and index untouched — if any
    /// record's timestamp is not strictly after the last record's, whether
    /// that's the facility's last persisted record or an earlier record in
    /// this same batch.
    pub fn append(&self, records: Vec<(DateTime<Utc>, Node)>) -> Result<Node> {
        if records.is_empty() {
            return Err(ObixError::new(ErrorKind::HistoryData, "append with no records"));
        }
        let _guard = self.gate.writer_entry()?;
        let mut index = self.index.lock().unwrap_or_else(|p| p.into_inner());

        let mut last = index.overall_end();
        for (timestamp, _) in &records {
            if let Some(last_ts) = last {
                if *timestamp <= last_ts {
                    return Err(ObixError::ts_obsolete(format!(
                        "record timestamp '{}' is not after last record timestamp '{}'",
                        contracts::format_abstime(timestamp),
                        contracts::format_abstime(&last_ts),
                    )));
                }
            }
            last = Some(*timestamp);
        }

        for (timestamp, value) in &records {
            fragment::append_record(
                &self.dir,
                &Record {
                    timestamp: *timestamp,
                    value: value.clone(),
                },
            )?;
            index.record_append(timestamp.date_naive(), *timestamp);
        }
        index::save_index(&self.dir, &index)?;

        let start = index.overall_start().unwrap_or_else(Utc::now);
        let end = index.overall_end().unwrap_or_else(Utc::now);
        Ok(contracts::history_append_out(
            records.len() as i64,
            index.total_count() as i64,
            &start,
            &end,
        ))
    }

    /// Runs a query (spec §4.4 `query`), returning the `HistoryQueryOut`
    /// prefix contract and the matching records in chronological order,
    /// honouring `limit` by truncating from the start.
    pub fn query(&self, filter: &HistoryFilter) -> Result<(Node, Vec<Record>)> {
        let _guard = self.gate.reader_entry()?;
        let index = self.index.lock().unwrap_or_else(|p| p.into_inner());
        if index.fragments.is_empty() {
            return Err(ObixError::new(ErrorKind::HistoryEmpty, "device has no history records"));
        }

        let overlapping = index.fragments_overlapping(filter.start, filter.end);
        let mut records = Vec::new();
        for meta in overlapping {
            for record in fragment::read_fragment(&self.dir, meta.date)? {
                if filter.start.map(|s| record.timestamp >= s).unwrap_or(true)
                    && filter.end.map(|e| record.timestamp <= e).unwrap_or(true)
                {
                    records.push(record);
                }
            }
        }
        records.sort_by_key(|r| r.timestamp);
        if let Some(limit) = filter.limit {
            if limit >= 0 && (limit as usize) < records.len() {
                records.truncate(limit as usize);
            }
        }

        let start = records.first().map(|r| r.timestamp).unwrap_or_else(Utc::now);
        let end = records.last().map(|r| r.timestamp).unwrap_or(start);
        let prefix = contracts::history_query_out_prefix(records.len() as i64, &start, &end);
        Ok((prefix, records))
    }

    pub fn record_count(&self) -> u64 {
        self.index.lock().unwrap_or_else(|p| p.into_inner()).total_count()
    }
}

/// Owns one [`HistoryFacility`] per device that has ever appended a
/// record, lazily created under `<res>/histories/<device-href>`.
pub struct HistoryRegistry {
    facilities: DashMap<String, Arc<HistoryFacility>>,
    res_dir: Option<PathBuf>,
}

impl HistoryRegistry {
    pub fn new(res_dir: Option<PathBuf>) -> Self {
        Self {
            facilities: DashMap::new(),
            res_dir,
        }
    }

    fn facility_dir(&self, device_href: &str) -> PathBuf {
        let base = self.res_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let mut dir = base_dir_for(&base);
        for seg in obix_model::path::segments(device_href) {
            dir.push(seg);
        }
        dir
    }

    pub fn get_or_create(&self, device_href: &str) -> Result<Arc<HistoryFacility>> {
        if let Some(existing) = self.facilities.get(device_href) {
            return Ok(existing.value().clone());
        }
        let dir = self.facility_dir(device_href);
        let facility = Arc::new(HistoryFacility::load(device_href.to_string(), dir)?);
        self.facilities
            .entry(device_href.to_string())
            .or_insert_with(|| facility.clone());
        Ok(facility)
    }

    pub fn get(&self, device_href: &str) -> Option<Arc<HistoryFacility>> {
        self.facilities.get(device_href).map(|e| e.value().clone())
    }
}

pub fn base_dir_for(res_dir: &Path) -> PathBuf {
    res_dir.join("histories")
}

#[cfg(test)]
mod tests {
    use super::*;
    use obix_model::node::NodeType;

    #[test]
    fn append_then_query_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HistoryRegistry::new(Some(dir.path().to_path_buf()));
        let facility = registry.get_or_create("/obix/deviceRoot/A").unwrap();

        let value = Node::new(NodeType::Real, "");
        value.set_val("21.5");
        let ts = "2026-07-29T12:00:00Z".parse().unwrap();
        facility.append(vec![(ts, value)]).unwrap();

        let (_prefix, records) = facility.query(&HistoryFilter::default()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn append_rejects_obsolete_timestamp_and_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HistoryRegistry::new(Some(dir.path().to_path_buf()));
        let facility = registry.get_or_create("/obix/deviceRoot/A").unwrap();

        let first = Node::new(NodeType::Real, "");
        first.set_val("1.0");
        facility
            .append(vec![("2020-01-02T00:00:00Z".parse().unwrap(), first)])
            .unwrap();

        let stale = Node::new(NodeType::Real, "");
        stale.set_val("2.0");
        let err = facility
            .append(vec![("2020-01-01T12:00:00Z".parse().unwrap(), stale)])
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TsObsolete);

        assert_eq!(facility.record_count(), 1);
    }

    #[test]
    fn query_with_no_records_is_history_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HistoryRegistry::new(Some(dir.path().to_path_buf()));
        let facility = registry.get_or_create("/obix/deviceRoot/A").unwrap();
        let err = facility.query(&HistoryFilter::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::HistoryEmpty);
    }

    #[test]
    fn query_limit_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let registry = HistoryRegistry::new(Some(dir.path().to_path_buf()));
        let facility = registry.get_or_create("/obix/deviceRoot/A").unwrap();
        for i in 0..5 {
            let value = Node::new(NodeType::Int, "");
            value.set_val(i.to_string());
            let ts = format!("2026-07-29T{i:02}:00:00Z").parse().unwrap();
            facility.append(vec![(ts, value)]).unwrap();
        }
        let filter = HistoryFilter {
            limit: Some(2),
            ..Default::default()
        };
        let (_prefix, records) = facility.query(&filter).unwrap();
        assert_eq!(records.len(), 2);
    }
}
