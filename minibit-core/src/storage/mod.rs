//! Storage layer for piece data.
//!
//! Defines the piece store interface the agent reads and writes through,
//! a file-based implementation, the shared piece-count descriptor, and the
//! splitting and pre-seeding steps that prepare a swarm run.

pub mod descriptor;
pub mod file_store;
pub mod seeding;
#[cfg(test)]
pub mod test_fixtures;

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
pub use descriptor::PieceCountDescriptor;
pub use file_store::FilePieceStore;
pub use seeding::{plan_distribution, seed_pieces, split_file};

use crate::piece::{PieceId, PieceSet};

/// Storage operations for one agent's pieces.
///
/// A piece is atomic: readers either see the complete piece or none of it.
#[async_trait]
pub trait PieceStore: Send + Sync {
    /// Lists the ids of every piece currently stored.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - If the store cannot be enumerated
    async fn list_pieces(&self) -> Result<PieceSet, StorageError>;

    /// Loads the bytes of one piece.
    ///
    /// # Errors
    ///
    /// - `StorageError::PieceNotFound` - If the piece is not stored
    /// - `StorageError::Io` - If reading failed
    async fn read_piece(&self, piece: PieceId) -> Result<Bytes, StorageError>;

    /// Persists the bytes of one piece, replacing any previous copy.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - If writing failed
    async fn write_piece(&self, piece: PieceId, data: &[u8]) -> Result<(), StorageError>;

    /// Concatenates pieces `0..total` into the reconstructed artifact.
    ///
    /// Does nothing and returns `false` unless every piece is stored.
    /// Calling it again after completion rewrites the same artifact.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - If reading pieces or writing the artifact failed
    async fn reconstruct(&self, total: u32) -> Result<bool, StorageError>;
}

/// Errors that occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Requested piece is not stored locally
    #[error("Piece {piece} not found")]
    PieceNotFound { piece: PieceId },

    /// Store holds no pieces yet
    #[error("No pieces found in {location}")]
    EmptyStore { location: String },

    /// Source payload to split has no content
    #[error("Source {path} is empty")]
    EmptySource { path: PathBuf },

    /// Piece-count descriptor has not been published yet
    #[error("Piece count descriptor {path} not found")]
    DescriptorMissing { path: PathBuf },

    /// Piece-count descriptor does not hold a positive integer
    #[error("Piece count descriptor {path} is malformed: {content:?}")]
    InvalidDescriptor { path: PathBuf, content: String },

    /// Standard I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
