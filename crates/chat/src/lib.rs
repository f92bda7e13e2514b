//! Chat intake: turns inbound gateway events into replies.
//!
//! The reply text itself comes from a [`Decider`]; this crate handles
//! filtering, context resolution, chunked dispatch and failure replies.

pub mod decider;
pub mod error;
pub mod intake;

pub use {
    decider::{Decider, EffectiveRequest},
    error::{Error, Result},
    intake::{APOLOGY_TEXT, GUIDANCE_TEXT, HELP_TEXT, IntakePipeline, Outcome},
};
