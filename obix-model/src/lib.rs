//! Shared vocabulary for the oBIX engine and its HTTP binding: the tree
//! [`Node`] type, the error taxonomy, path-safety checks, XML encode/decode,
//! and the stable oBIX contract shapes. No I/O, no locking policy — those
//! live in `obix-core`.

pub mod contracts;
pub mod error;
pub mod node;
pub mod path;
pub mod xml;

pub use error::{ErrorKind, ObixError, Result};
pub use node::{CopyExclude, Node, NodeType};
