//! The oBIX server engine: object tree, device/watch/history subsystems,
//! batch execution, request dispatch, and the concurrency fabric they all
//! sit on (spec §4, §5).

pub mod batch;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod history;
pub mod response;
pub mod server;
pub mod sync;
pub mod tree;
pub mod watch;

pub use config::CoreConfig;
pub use dispatcher::{Dispatcher, Request, Verb};
pub use server::Server;
