// ABOUTME: Typed error taxonomy for the bridge core
// ABOUTME: Distinguishes recoverable lookup failures from fatal bootstrap errors

use thiserror::Error;

/// Errors the bridge core can surface to callers.
///
/// Anything not covered here travels as a plain `anyhow::Error`; these
/// variants exist so callers (and the supervisor) can match on the cases
/// that change control flow:
///
/// - `PersonNotFound` is recoverable and carries the query that missed.
/// - `Configuration` is a caller bug and is never retried.
/// - `DeviceRegistration` is fatal at startup - without a realtime endpoint
///   there is no service.
/// - `Transport` is always recoverable at the supervisor level and triggers
///   a full restart of the connect loop.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no person found for query {query}")]
    PersonNotFound { query: String },

    #[error("room {0} does not exist, or the bot does not have access")]
    RoomDoesNotExist(String),

    #[error("invalid identifier arguments: {0}")]
    Configuration(String),

    #[error("failed to register realtime device: {0}")]
    DeviceRegistration(String),

    #[error("realtime transport error: {0}")]
    Transport(String),
}
