//! Identifiers shared by the tracker and the peer agents.

use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Zero-based index of a piece within the shared content.
///
/// Piece numbering is dense: a swarm distributing `total` pieces uses
/// exactly the ids `0..total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PieceId(pub u32);

impl PieceId {
    /// Creates PieceId from zero-based index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying piece index as u32.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Checks whether this id falls inside a swarm of `total` pieces.
    pub fn is_within(self, total: u32) -> bool {
        self.0 < total
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pieces a peer currently holds. Ordered so listings are stable.
pub type PieceSet = BTreeSet<PieceId>;

/// Builds a piece set from raw indices.
pub fn piece_set<I>(indices: I) -> PieceSet
where
    I: IntoIterator<Item = u32>,
{
    indices.into_iter().map(PieceId::new).collect()
}

/// Stable identity of a peer: the host it runs on and its listen port.
///
/// This is not the transport address of an outbound connection, which uses
/// an ephemeral local port. Serialized as a `[host, port]` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "(String, u16)", into = "(String, u16)")]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Combines the host of a connection's source address with a declared
    /// listen port.
    pub fn from_source(source: SocketAddr, listen_port: u16) -> Self {
        Self::new(source.ip().to_string(), listen_port)
    }

    /// Connection target in `host:port` form, bracketing IPv6 hosts.
    pub fn connect_target(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<(String, u16)> for PeerAddress {
    fn from((host, port): (String, u16)) -> Self {
        Self { host, port }
    }
}

impl From<PeerAddress> for (String, u16) {
    fn from(address: PeerAddress) -> Self {
        (address.host, address.port)
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(address: SocketAddr) -> Self {
        Self::new(address.ip().to_string(), address.port())
    }
}
