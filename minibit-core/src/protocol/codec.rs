//! Text encoding and decoding for tracker and peer messages

use bytes::Bytes;

use super::ProtocolError;
use super::types::{DiscoveryPayload, PeerRequest, PeerResponse, TrackerRequest, TrackerResponse};
use crate::piece::{PieceId, PieceSet};

const REGISTER: &str = "REGISTER";
const GET_PEERS: &str = "GET_PEERS";
const UPDATE_BLOCKS: &str = "UPDATE_BLOCKS";
const GET_BLOCKS: &str = "GET_BLOCKS";
const HAVE: &str = "HAVE";
const REQUEST: &str = "REQUEST";

const OK: &str = "OK";
const ERROR: &str = "ERROR";
const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";
const YES: &str = "YES";
const NO: &str = "NO";
const NOT_AVAILABLE: &str = "NOT_AVAILABLE";

/// Message serialization for the MiniBit wire protocol.
pub struct MessageCodec;

impl MessageCodec {
    /// Serializes a tracker request.
    pub fn encode_tracker_request(request: &TrackerRequest) -> Vec<u8> {
        let text = match request {
            TrackerRequest::Register { port, pieces } => {
                format!("{REGISTER} {port} {}", Self::encode_piece_list(pieces))
            }
            TrackerRequest::GetPeers { port: Some(port) } => format!("{GET_PEERS} {port}"),
            TrackerRequest::GetPeers { port: None } => GET_PEERS.to_string(),
            TrackerRequest::UpdatePieces {
                port: Some(port),
                pieces,
            } => format!("{UPDATE_BLOCKS} {port} {}", Self::encode_piece_list(pieces)),
            TrackerRequest::UpdatePieces { port: None, pieces } => {
                format!("{UPDATE_BLOCKS} {}", Self::encode_piece_list(pieces))
            }
        };
        text.into_bytes()
    }

    /// Deserializes a tracker request.
    ///
    /// Fields are separated by single spaces, so `REGISTER 6001 ` carries an
    /// empty piece list while `REGISTER 6001` is missing the field entirely.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownCommand` - If the verb is not a tracker verb
    /// - `ProtocolError::MissingField` - If a required field is absent
    /// - `ProtocolError::InvalidPort` / `InvalidPieceId` - If a field does not parse
    pub fn decode_tracker_request(data: &[u8]) -> Result<TrackerRequest, ProtocolError> {
        let text = Self::message_text(data)?;
        let (verb, rest) = split_verb(text);

        match verb {
            REGISTER => {
                let fields = rest.unwrap_or_default();
                let Some((port, pieces)) = fields.split_once(' ') else {
                    let field = if fields.trim().is_empty() {
                        "port"
                    } else {
                        "piece list"
                    };
                    return Err(ProtocolError::MissingField {
                        command: REGISTER,
                        field,
                    });
                };
                if port.is_empty() {
                    return Err(ProtocolError::MissingField {
                        command: REGISTER,
                        field: "port",
                    });
                }
                Ok(TrackerRequest::Register {
                    port: parse_port(port)?,
                    pieces: Self::decode_piece_list(pieces)?,
                })
            }
            GET_PEERS => {
                let port = match rest.map(str::trim) {
                    Some(port) if !port.is_empty() => Some(parse_port(port)?),
                    _ => None,
                };
                Ok(TrackerRequest::GetPeers { port })
            }
            UPDATE_BLOCKS => {
                let fields = rest.ok_or(ProtocolError::MissingField {
                    command: UPDATE_BLOCKS,
                    field: "piece list",
                })?;
                match fields.split_once(' ') {
                    Some((port, pieces)) => Ok(TrackerRequest::UpdatePieces {
                        port: Some(parse_port(port)?),
                        pieces: Self::decode_piece_list(pieces)?,
                    }),
                    None => Ok(TrackerRequest::UpdatePieces {
                        port: None,
                        pieces: Self::decode_piece_list(fields)?,
                    }),
                }
            }
            "" => Err(ProtocolError::EmptyMessage),
            other => Err(ProtocolError::UnknownCommand {
                command: other.to_string(),
            }),
        }
    }

    /// Serializes a tracker reply. Discovery answers are JSON.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedPayload` - If the discovery payload cannot be serialized
    pub fn encode_tracker_response(response: &TrackerResponse) -> Result<Vec<u8>, ProtocolError> {
        let encoded = match response {
            TrackerResponse::Ok => OK.as_bytes().to_vec(),
            TrackerResponse::Error { reason } => format!("{ERROR} {reason}").into_bytes(),
            TrackerResponse::Peers(payload) => serde_json::to_vec(payload)?,
            TrackerResponse::UnknownCommand => UNKNOWN_COMMAND.as_bytes().to_vec(),
        };
        Ok(encoded)
    }

    /// Deserializes a tracker reply.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedPayload` - If a discovery answer is not valid JSON
    /// - `ProtocolError::UnexpectedResponse` - If the reply matches no known form
    pub fn decode_tracker_response(data: &[u8]) -> Result<TrackerResponse, ProtocolError> {
        let text = Self::message_text(data)?.trim();

        if text == OK {
            return Ok(TrackerResponse::Ok);
        }
        if text == UNKNOWN_COMMAND {
            return Ok(TrackerResponse::UnknownCommand);
        }
        if let Some(reason) = text.strip_prefix(ERROR) {
            return Ok(TrackerResponse::Error {
                reason: reason.trim().to_string(),
            });
        }
        if text.starts_with('{') {
            let payload: DiscoveryPayload = serde_json::from_str(text)?;
            return Ok(TrackerResponse::Peers(payload));
        }

        Err(ProtocolError::UnexpectedResponse {
            request: "tracker request",
            received: truncate_for_log(text),
        })
    }

    /// Serializes a peer request.
    pub fn encode_peer_request(request: &PeerRequest) -> Vec<u8> {
        match request {
            PeerRequest::ListPieces => GET_BLOCKS.as_bytes().to_vec(),
            PeerRequest::Have(piece) => format!("{HAVE} {piece}").into_bytes(),
            PeerRequest::Request(piece) => format!("{REQUEST} {piece}").into_bytes(),
        }
    }

    /// Deserializes a peer request.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownCommand` - If the verb is not a peer verb
    /// - `ProtocolError::MissingField` - If `HAVE`/`REQUEST` lack a piece id
    /// - `ProtocolError::InvalidPieceId` - If the piece id does not parse
    pub fn decode_peer_request(data: &[u8]) -> Result<PeerRequest, ProtocolError> {
        let text = Self::message_text(data)?.trim();
        let (verb, rest) = split_verb(text);

        match verb {
            GET_BLOCKS => Ok(PeerRequest::ListPieces),
            HAVE => Ok(PeerRequest::Have(parse_piece_field(HAVE, rest)?)),
            REQUEST => Ok(PeerRequest::Request(parse_piece_field(REQUEST, rest)?)),
            "" => Err(ProtocolError::EmptyMessage),
            other => Err(ProtocolError::UnknownCommand {
                command: other.to_string(),
            }),
        }
    }

    /// Serializes a peer reply. Piece payloads are sent raw.
    pub fn encode_peer_response(response: &PeerResponse) -> Bytes {
        match response {
            PeerResponse::Pieces(pieces) => Bytes::from(Self::encode_piece_list(pieces)),
            PeerResponse::Have(true) => Bytes::from_static(YES.as_bytes()),
            PeerResponse::Have(false) => Bytes::from_static(NO.as_bytes()),
            PeerResponse::Payload(data) => data.clone(),
            PeerResponse::NotAvailable => Bytes::from_static(NOT_AVAILABLE.as_bytes()),
            PeerResponse::UnknownCommand => Bytes::from_static(UNKNOWN_COMMAND.as_bytes()),
        }
    }

    /// Deserializes a peer reply in the context of the request that caused it.
    ///
    /// A `REQUEST` reply is raw bytes unless it is exactly `NOT_AVAILABLE`
    /// or `UNKNOWN_COMMAND`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnexpectedResponse` - If the reply does not fit the request
    /// - `ProtocolError::InvalidPieceId` - If a piece listing contains a bad id
    pub fn decode_peer_response(
        request: &PeerRequest,
        data: Bytes,
    ) -> Result<PeerResponse, ProtocolError> {
        if data.as_ref() == UNKNOWN_COMMAND.as_bytes() {
            return Ok(PeerResponse::UnknownCommand);
        }

        match request {
            PeerRequest::ListPieces => {
                let text = Self::message_text(&data)?.trim();
                Ok(PeerResponse::Pieces(Self::decode_piece_list(text)?))
            }
            PeerRequest::Have(_) => match Self::message_text(&data)?.trim() {
                YES => Ok(PeerResponse::Have(true)),
                NO => Ok(PeerResponse::Have(false)),
                other => Err(ProtocolError::UnexpectedResponse {
                    request: HAVE,
                    received: truncate_for_log(other),
                }),
            },
            PeerRequest::Request(_) => {
                if data.as_ref() == NOT_AVAILABLE.as_bytes() {
                    Ok(PeerResponse::NotAvailable)
                } else if data.is_empty() {
                    Err(ProtocolError::UnexpectedResponse {
                        request: REQUEST,
                        received: "empty payload".to_string(),
                    })
                } else {
                    Ok(PeerResponse::Payload(data))
                }
            }
        }
    }

    /// Formats a piece set as comma-separated ids in ascending order.
    pub fn encode_piece_list(pieces: &PieceSet) -> String {
        pieces
            .iter()
            .map(|piece| piece.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parses comma-separated piece ids; the empty string is the empty set.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidPieceId` - If any entry is not a non-negative integer
    pub fn decode_piece_list(text: &str) -> Result<PieceSet, ProtocolError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(PieceSet::new());
        }
        text.split(',').map(parse_piece_id).collect()
    }

    fn message_text(data: &[u8]) -> Result<&str, ProtocolError> {
        let text = std::str::from_utf8(data)?;
        Ok(text.trim_end_matches(['\r', '\n']))
    }
}

fn split_verb(text: &str) -> (&str, Option<&str>) {
    match text.split_once(' ') {
        Some((verb, rest)) => (verb, Some(rest)),
        None => (text, None),
    }
}

fn parse_port(value: &str) -> Result<u16, ProtocolError> {
    match value.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ProtocolError::InvalidPort {
            value: value.to_string(),
        }),
    }
}

fn parse_piece_id(value: &str) -> Result<PieceId, ProtocolError> {
    value
        .trim()
        .parse::<u32>()
        .map(PieceId::new)
        .map_err(|_| ProtocolError::InvalidPieceId {
            value: value.to_string(),
        })
}

fn parse_piece_field(command: &'static str, rest: Option<&str>) -> Result<PieceId, ProtocolError> {
    match rest.map(str::trim) {
        Some(value) if !value.is_empty() => parse_piece_id(value),
        _ => Err(ProtocolError::MissingField {
            command,
            field: "piece id",
        }),
    }
}

fn truncate_for_log(text: &str) -> String {
    text.chars().take(64).collect()
}
