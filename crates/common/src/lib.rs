//! Error-context helpers and request-correlation utilities shared across
//! quartermaster crates.

pub mod error;
pub mod timing;

pub use {
    error::FromMessage,
    timing::{Stopwatch, new_request_id},
};
