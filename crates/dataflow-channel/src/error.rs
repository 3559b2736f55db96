//! Error types for channel handle acquisition.
//!
//! Data transfer itself never fails: `write` grows the ring instead and
//! `try_read` reports an empty channel with `None`.

use thiserror::Error;

/// Errors returned when acquiring a producer or consumer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The single producer slot of a one-producer channel is already taken.
    #[error("producer already claimed for this channel")]
    ProducerClaimed,

    /// The single consumer slot of a one-consumer channel is already taken.
    #[error("consumer already claimed for this channel")]
    ConsumerClaimed,
}
