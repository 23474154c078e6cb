//! Plain-text wire protocol spoken between agents and with the tracker.
//!
//! Every exchange uses one TCP connection: the client writes a single
//! space-separated request, half-closes its side, and reads the response
//! until the server closes the stream. Servers also accept a request ended
//! by a newline or followed by a short pause, for clients that keep their
//! side open. Parsing lives in [`MessageCodec`];
//! business logic only ever sees the tagged message types.

pub mod codec;
pub mod connection;
pub mod types;

pub use codec::MessageCodec;
pub use connection::{exchange, read_request, write_response};
pub use types::{DiscoveryPayload, PeerRequest, PeerResponse, TrackerRequest, TrackerResponse};

/// Errors produced while encoding or decoding protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Empty message")]
    EmptyMessage,

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("Missing {field} field in {command}")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },

    #[error("Invalid piece id: {value}")]
    InvalidPieceId { value: String },

    #[error("Invalid port: {value}")]
    InvalidPort { value: String },

    #[error("Unexpected response to {request}: {received}")]
    UnexpectedResponse {
        request: &'static str,
        received: String,
    },

    #[error("Message exceeds {limit} bytes")]
    MessageTooLarge { limit: usize },

    #[error("Malformed discovery payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("Message is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}
