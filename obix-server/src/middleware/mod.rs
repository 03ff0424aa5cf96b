pub mod requester;

pub use requester::{extract_requester, RequesterId};
