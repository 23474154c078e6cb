//! Agent-side tracker client

use std::time::Duration;

use crate::piece::PieceSet;
use crate::protocol::{
    DiscoveryPayload, MessageCodec, ProtocolError, TrackerRequest, TrackerResponse, exchange,
};
use crate::{Result, SwarmError};

/// Talks to one tracker over short-lived connections.
#[derive(Debug, Clone)]
pub struct TrackerClient {
    address: String,
    timeout: Duration,
}

impl TrackerClient {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Announces the pieces held by the agent listening on `port`.
    ///
    /// # Errors
    ///
    /// - `SwarmError::TrackerRejected` - If the tracker answers `ERROR`
    /// - `SwarmError::PeerUnreachable` / `Timeout` - If the tracker cannot be reached
    pub async fn register(&self, port: u16, pieces: &PieceSet) -> Result<()> {
        let request = TrackerRequest::Register {
            port,
            pieces: pieces.clone(),
        };
        self.expect_ok(&request, "REGISTER").await
    }

    /// Asks for a peer sample and the globally rarest pieces.
    ///
    /// Passing the listen port lets the tracker leave the caller out of
    /// the sample.
    ///
    /// # Errors
    ///
    /// - `SwarmError::Protocol` - If the reply is not a discovery payload
    /// - `SwarmError::PeerUnreachable` / `Timeout` - If the tracker cannot be reached
    pub async fn discover(&self, port: Option<u16>) -> Result<DiscoveryPayload> {
        match self.send(&TrackerRequest::GetPeers { port }).await? {
            TrackerResponse::Peers(payload) => Ok(payload),
            other => Err(unexpected("GET_PEERS", &other)),
        }
    }

    /// Reports newly acquired pieces.
    ///
    /// # Errors
    ///
    /// - `SwarmError::TrackerRejected` - If the tracker answers `ERROR`
    /// - `SwarmError::PeerUnreachable` / `Timeout` - If the tracker cannot be reached
    pub async fn update_pieces(&self, port: Option<u16>, pieces: &PieceSet) -> Result<()> {
        let request = TrackerRequest::UpdatePieces {
            port,
            pieces: pieces.clone(),
        };
        self.expect_ok(&request, "UPDATE_BLOCKS").await
    }

    async fn expect_ok(&self, request: &TrackerRequest, verb: &'static str) -> Result<()> {
        match self.send(request).await? {
            TrackerResponse::Ok => Ok(()),
            other => Err(unexpected(verb, &other)),
        }
    }

    async fn send(&self, request: &TrackerRequest) -> Result<TrackerResponse> {
        let encoded = MessageCodec::encode_tracker_request(request);
        let reply = exchange(&self.address, &encoded, self.timeout).await?;
        Ok(MessageCodec::decode_tracker_response(&reply)?)
    }
}

fn unexpected(verb: &'static str, response: &TrackerResponse) -> SwarmError {
    match response {
        TrackerResponse::Error { reason } => SwarmError::TrackerRejected {
            reason: reason.clone(),
        },
        TrackerResponse::UnknownCommand => SwarmError::TrackerRejected {
            reason: format!("{verb} not understood"),
        },
        TrackerResponse::Ok => ProtocolError::UnexpectedResponse {
            request: verb,
            received: "OK".to_string(),
        }
        .into(),
        TrackerResponse::Peers(_) => ProtocolError::UnexpectedResponse {
            request: verb,
            received: "discovery payload".to_string(),
        }
        .into(),
    }
}
