//! The oBIX error taxonomy (spec §7).
//!
//! Every fallible core operation returns `Result<T>` with an [`ObixError`]
//! carrying a stable [`ErrorKind`]. The dispatcher never throws: handlers
//! turn an `Err` into an `<err/>` contract node via
//! [`ObixError::to_contract_uri`] rather than an HTTP-level failure.

use std::fmt;

pub type Result<T> = std::result::Result<T, ObixError>;

/// Stable error taxonomy, one entry per kind enumerated in spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoInput,
    NoHref,
    NoName,
    NoRequesterId,
    NoSuchUri,
    NoMem,
    NoOpNode,
    NoMetaNode,
    InvalidInput,
    InvalidHref,
    InvalidMeta,
    InvalidArgument,
    InvalidState,
    InvalidObj,
    TsCompare,
    TsObsolete,
    ReadonlyHref,
    PermDenied,
    DiskIo,
    DeviceConflictOwner,
    DeviceExists,
    DeviceOrphan,
    DeviceNoSuchUri,
    DeviceChildren,
    WatchNoSuchUri,
    WatchNoMonitoredUri,
    HistoryDevid,
    HistoryIo,
    HistoryData,
    HistoryEmpty,
    BatchRecursive,
    BatchHistory,
    BatchPollchanges,
    /// Returned exactly once when building an error contract itself fails
    /// (spec §7): the server is expected to be restarted after this.
    Fatal,
}

impl ErrorKind {
    /// The `is` attribute of the resulting `<err/>` contract.
    pub const fn contract_uri(self) -> &'static str {
        use ErrorKind::*;
        match self {
            NoInput => "obix:BadUriErr",
            NoHref => "obix:BadUriErr",
            NoName => "obix:BadUriErr",
            NoRequesterId => "obix:PermissionErr",
            NoSuchUri => "obix:BadUriErr",
            NoMem => "obix:UnsupportedErr",
            NoOpNode => "obix:BadUriErr",
            NoMetaNode => "obix:BadUriErr",
            InvalidInput => "obix:BadInputErr",
            InvalidHref => "obix:BadUriErr",
            InvalidMeta => "obix:BadInputErr",
            InvalidArgument => "obix:BadInputErr",
            InvalidState => "obix:PermissionErr",
            InvalidObj => "obix:BadInputErr",
            TsCompare => "obix:BadInputErr",
            TsObsolete => "obix:BadInputErr",
            ReadonlyHref => "obix:PermissionErr",
            PermDenied => "obix:PermissionErr",
            DiskIo => "obix:UnsupportedErr",
            DeviceConflictOwner => "obix:PermissionErr",
            DeviceExists => "obix:BadUriErr",
            DeviceOrphan => "obix:BadUriErr",
            DeviceNoSuchUri => "obix:BadUriErr",
            DeviceChildren => "obix:PermissionErr",
            WatchNoSuchUri => "obix:BadUriErr",
            WatchNoMonitoredUri => "obix:BadUriErr",
            HistoryDevid => "obix:BadUriErr",
            HistoryIo => "obix:UnsupportedErr",
            HistoryData => "obix:UnsupportedErr",
            HistoryEmpty => "obix:BadInputErr",
            BatchRecursive => "obix:BadInputErr",
            BatchHistory => "obix:BadInputErr",
            BatchPollchanges => "obix:BadInputErr",
            Fatal => "obix:UnsupportedErr",
        }
    }

    /// Short machine-stable name, used in logs and tests.
    pub const fn name(self) -> &'static str {
        use ErrorKind::*;
        match self {
            NoInput => "no-input",
            NoHref => "no-href",
            NoName => "no-name",
            NoRequesterId => "no-requester-id",
            NoSuchUri => "no-such-uri",
            NoMem => "no-mem",
            NoOpNode => "no-op-node",
            NoMetaNode => "no-meta-node",
            InvalidInput => "invalid-input",
            InvalidHref => "invalid-href",
            InvalidMeta => "invalid-meta",
            InvalidArgument => "invalid-argument",
            InvalidState => "invalid-state",
            InvalidObj => "invalid-obj",
            TsCompare => "ts-compare",
            TsObsolete => "ts-obsolete",
            ReadonlyHref => "readonly-href",
            PermDenied => "perm-denied",
            DiskIo => "disk-io",
            DeviceConflictOwner => "device-conflict-owner",
            DeviceExists => "device-exists",
            DeviceOrphan => "device-orphan",
            DeviceNoSuchUri => "device-no-such-uri",
            DeviceChildren => "device-children",
            WatchNoSuchUri => "watch-no-such-uri",
            WatchNoMonitoredUri => "watch-no-monitored-uri",
            HistoryDevid => "history-devid",
            HistoryIo => "history-io",
            HistoryData => "history-data",
            HistoryEmpty => "history-empty",
            BatchRecursive => "batch-recursive",
            BatchHistory => "batch-history",
            BatchPollchanges => "batch-pollchanges",
            Fatal => "fatal-error",
        }
    }
}

/// An oBIX error: a stable kind, the href it occurred at (if any), and a
/// human-readable display message destined for the `val` attribute of the
/// resulting `<err/>` contract.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}", kind = self.kind.name())]
pub struct ObixError {
    pub kind: ErrorKind,
    pub href: Option<String>,
    pub message: String,
}

impl ObixError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            href: None,
            message: message.into(),
        }
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! err_ctor {
    ($fn_name:ident, $kind:ident) => {
        impl ObixError {
            pub fn $fn_name(message: impl Into<String>) -> Self {
                Self::new(ErrorKind::$kind, message)
            }
        }
    };
}

err_ctor!(no_input, NoInput);
err_ctor!(no_href, NoHref);
err_ctor!(no_name, NoName);
err_ctor!(no_requester_id, NoRequesterId);
err_ctor!(no_such_uri, NoSuchUri);
err_ctor!(no_mem, NoMem);
err_ctor!(no_op_node, NoOpNode);
err_ctor!(no_meta_node, NoMetaNode);
err_ctor!(invalid_input, InvalidInput);
err_ctor!(invalid_href, InvalidHref);
err_ctor!(invalid_meta, InvalidMeta);
err_ctor!(invalid_argument, InvalidArgument);
err_ctor!(invalid_state, InvalidState);
err_ctor!(invalid_obj, InvalidObj);
err_ctor!(ts_compare, TsCompare);
err_ctor!(ts_obsolete, TsObsolete);
err_ctor!(readonly_href, ReadonlyHref);
err_ctor!(perm_denied, PermDenied);
err_ctor!(disk_io, DiskIo);
err_ctor!(device_conflict_owner, DeviceConflictOwner);
err_ctor!(device_exists, DeviceExists);
err_ctor!(device_orphan, DeviceOrphan);
err_ctor!(device_no_such_uri, DeviceNoSuchUri);
err_ctor!(device_children, DeviceChildren);
err_ctor!(watch_no_such_uri, WatchNoSuchUri);
err_ctor!(watch_no_monitored_uri, WatchNoMonitoredUri);
err_ctor!(history_devid, HistoryDevid);
err_ctor!(history_io, HistoryIo);
err_ctor!(history_data, HistoryData);
err_ctor!(history_empty, HistoryEmpty);
err_ctor!(batch_recursive, BatchRecursive);
err_ctor!(batch_history, BatchHistory);
err_ctor!(batch_pollchanges, BatchPollchanges);

impl From<std::io::Error> for ObixError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;
        // Disk-quota/out-of-space errors are mapped to `no-mem` (spec §7)
        // so that callers can retry policy-uniformly.
        const ENOSPC: i32 = 28;
        match err.kind() {
            IoKind::OutOfMemory => ObixError::no_mem(err.to_string()),
            _ if err.raw_os_error() == Some(ENOSPC) => {
                ObixError::no_mem(err.to_string())
            }
            _ => ObixError::disk_io(err.to_string()),
        }
    }
}
