//! Tagged message types for the tracker and peer protocols.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::piece::{PeerAddress, PieceId, PieceSet};

/// Requests understood by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerRequest {
    /// `REGISTER <listenPort> <csvPieceIds-or-empty>`
    Register { port: u16, pieces: PieceSet },
    /// `GET_PEERS [<listenPort>]`
    ///
    /// The optional port lets the tracker recognize and exclude the requester.
    GetPeers { port: Option<u16> },
    /// `UPDATE_BLOCKS [<listenPort>] <csvPieceIds>`
    UpdatePieces { port: Option<u16>, pieces: PieceSet },
}

/// Tracker replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerResponse {
    Ok,
    Error { reason: String },
    Peers(DiscoveryPayload),
    UnknownCommand,
}

/// Answer to a discovery query: a peer sample and globally-rarest pieces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryPayload {
    pub peers: Vec<PeerAddress>,
    pub suggested_pieces: Vec<PieceId>,
}

/// Requests understood by a peer's transfer server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRequest {
    /// `GET_BLOCKS`
    ListPieces,
    /// `HAVE <id>`
    Have(PieceId),
    /// `REQUEST <id>`
    Request(PieceId),
}

impl PeerRequest {
    /// Protocol verb, used in logs and error messages.
    pub fn verb(&self) -> &'static str {
        match self {
            PeerRequest::ListPieces => "GET_BLOCKS",
            PeerRequest::Have(_) => "HAVE",
            PeerRequest::Request(_) => "REQUEST",
        }
    }
}

/// Transfer server replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerResponse {
    /// CSV of owned piece ids, empty when none
    Pieces(PieceSet),
    /// `YES` or `NO`
    Have(bool),
    /// Raw piece bytes, terminated by stream close
    Payload(Bytes),
    NotAvailable,
    UnknownCommand,
}
