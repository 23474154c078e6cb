//! Outbound queries to other agents' transfer servers

use std::time::Duration;

use bytes::Bytes;

use crate::piece::{PeerAddress, PieceId, PieceSet};
use crate::protocol::{MessageCodec, PeerRequest, PeerResponse, ProtocolError, exchange};
use crate::Result;

/// Issues one-shot peer protocol requests with per-kind timeouts.
#[derive(Debug, Clone)]
pub struct PeerClient {
    refresh_timeout: Duration,
    transfer_timeout: Duration,
}

impl PeerClient {
    pub fn new(refresh_timeout: Duration, transfer_timeout: Duration) -> Self {
        Self {
            refresh_timeout,
            transfer_timeout,
        }
    }

    /// Fetches the peer's piece listing.
    ///
    /// # Errors
    ///
    /// Returns the network or protocol error of the exchange.
    pub async fn list_pieces(&self, peer: &PeerAddress) -> Result<PieceSet> {
        match self
            .send(peer, PeerRequest::ListPieces, self.refresh_timeout)
            .await?
        {
            PeerResponse::Pieces(pieces) => Ok(pieces),
            other => Err(unexpected(PeerRequest::ListPieces, &other)),
        }
    }

    /// Asks whether the peer holds `piece`.
    ///
    /// # Errors
    ///
    /// Returns the network or protocol error of the exchange.
    pub async fn has_piece(&self, peer: &PeerAddress, piece: PieceId) -> Result<bool> {
        let request = PeerRequest::Have(piece);
        match self.send(peer, request, self.transfer_timeout).await? {
            PeerResponse::Have(held) => Ok(held),
            other => Err(unexpected(request, &other)),
        }
    }

    /// Downloads `piece`, or `None` when the peer answers `NOT_AVAILABLE`.
    ///
    /// # Errors
    ///
    /// Returns the network or protocol error of the exchange.
    pub async fn request_piece(&self, peer: &PeerAddress, piece: PieceId) -> Result<Option<Bytes>> {
        let request = PeerRequest::Request(piece);
        match self.send(peer, request, self.transfer_timeout).await? {
            PeerResponse::Payload(data) => Ok(Some(data)),
            PeerResponse::NotAvailable => Ok(None),
            other => Err(unexpected(request, &other)),
        }
    }

    async fn send(
        &self,
        peer: &PeerAddress,
        request: PeerRequest,
        timeout: Duration,
    ) -> Result<PeerResponse> {
        let encoded = MessageCodec::encode_peer_request(&request);
        let reply = exchange(&peer.connect_target(), &encoded, timeout).await?;
        tracing::trace!("{} {} answered with {} bytes", peer, request.verb(), reply.len());
        Ok(MessageCodec::decode_peer_response(&request, reply)?)
    }
}

fn unexpected(request: PeerRequest, response: &PeerResponse) -> crate::SwarmError {
    let received = match response {
        PeerResponse::UnknownCommand => "UNKNOWN_COMMAND",
        PeerResponse::NotAvailable => "NOT_AVAILABLE",
        PeerResponse::Pieces(_) => "piece listing",
        PeerResponse::Have(_) => "possession answer",
        PeerResponse::Payload(_) => "piece payload",
    };
    ProtocolError::UnexpectedResponse {
        request: request.verb(),
        received: received.to_string(),
    }
    .into()
}
