//! Discord gateway adapter built on serenity.

pub mod client;
pub mod handler;
pub mod outbound;

pub use {
    client::{DiscordConnector, DiscordSession},
    handler::DiscordHandler,
    outbound::DiscordOutbound,
};
