//! Chat gateway boundary.
//!
//! A gateway adapter (Discord today) converts platform events into
//! [`InboundEvent`]s and implements [`ChannelGateway`] for outbound traffic.
//! Replies longer than the platform limit go through [`chunking::split`].

pub mod chunking;
pub mod error;
pub mod gateway;
pub mod mentions;

pub use {
    error::{Error, Result},
    gateway::{
        BotIdentity, ChannelGateway, GatewayConnector, GatewaySession, InboundEvent, MessageRef,
    },
};
