//! MiniBit Core - tracker, peer agent and wire protocol
//!
//! This crate provides the building blocks of a small BitTorrent-style swarm:
//! a discovery tracker, autonomous peer agents that exchange pieces using a
//! rarest-first strategy and a choke/unchoke policy, and the plain-text wire
//! protocol both sides speak.

pub mod agent;
pub mod config;
pub mod piece;
pub mod protocol;
pub mod retry;
pub mod selection;
pub mod storage;
pub mod tracing_setup;
pub mod tracker;

// Re-export main types for convenient access
pub use agent::{DownloadOutcome, PeerAgent};
pub use config::{AgentConfig, SwarmConfig, TrackerConfig};
pub use piece::{PeerAddress, PieceId, PieceSet};
pub use protocol::ProtocolError;
pub use storage::{FilePieceStore, PieceCountDescriptor, PieceStore, StorageError};
pub use tracker::{Registry, TrackerClient, TrackerServer};

/// Errors that can bubble up from any MiniBit subsystem.
///
/// Network failures are converted into one of these variants at the
/// boundary where they occur, so loops and handlers can log and continue.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out during {operation} with {address}")]
    Timeout {
        operation: &'static str,
        address: String,
    },

    #[error("Peer {address} is unreachable: {reason}")]
    PeerUnreachable { address: String, reason: String },

    #[error("Tracker rejected request: {reason}")]
    TrackerRejected { reason: String },

    #[error("Bootstrap failed: {reason}")]
    BootstrapFailed { reason: String },
}

impl SwarmError {
    /// Checks if this error comes from the network rather than local state.
    ///
    /// Network errors are transient: the caller abandons the current peer or
    /// cycle and tries again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SwarmError::Io(_) | SwarmError::Timeout { .. } | SwarmError::PeerUnreachable { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SwarmError>;
