//! Server configuration (spec §6.2). The original loads these from an XML
//! config document; parsing arbitrary config XML is out of scope here, so
//! this is a plain struct populated from environment variables by
//! `obix-server`'s startup code, the same shape the teacher uses for its
//! own config (`ferrex_config`).

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Root resource directory holding `core/`, `sys/`, `devices/`,
    /// `histories/` (spec §6.3). `None` runs fully in memory (no
    /// persistence, no device backup, no history durability).
    pub res_dir: Option<PathBuf>,
    /// How often a device with unflushed writes is re-serialised to disk.
    pub backup_period: Duration,
    /// Default watch lease (spec §4.3).
    pub watch_lease: Duration,
    pub poll_wait_min: Duration,
    pub poll_wait_max: Duration,
    /// `/config/dev_table_size` (spec §6.2): initial capacity hint for the
    /// device hash map.
    pub dev_table_size: usize,
    /// `/config/dev_cache_size` (spec §6.2): capacity of the device path LRU.
    pub dev_cache_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            res_dir: None,
            backup_period: Duration::from_secs(300),
            watch_lease: crate::watch::DEFAULT_LEASE,
            poll_wait_min: crate::watch::DEFAULT_POLL_MIN,
            poll_wait_max: crate::watch::DEFAULT_POLL_MAX,
            dev_table_size: 4096,
            dev_cache_size: 512,
        }
    }
}

impl CoreConfig {
    pub fn core_dir(&self) -> Option<PathBuf> {
        self.res_dir.as_ref().map(|r| r.join("core"))
    }

    pub fn sys_dir(&self) -> Option<PathBuf> {
        self.res_dir.as_ref().map(|r| r.join("sys"))
    }
}
