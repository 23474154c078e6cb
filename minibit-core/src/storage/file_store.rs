//! Directory-backed piece store

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{PieceStore, StorageError};
use crate::piece::{PieceId, PieceSet};

const PIECE_PREFIX: &str = "piece_";
const TEMP_EXTENSION: &str = "tmp";

/// Stores each piece as `piece_<id>` inside one directory.
///
/// Writes go to a temporary file that is renamed into place, so a piece
/// is never observed half-written.
#[derive(Debug, Clone)]
pub struct FilePieceStore {
    directory: PathBuf,
    output: PathBuf,
}

impl FilePieceStore {
    /// Creates a store over `directory` reconstructing into `output`.
    pub fn new(directory: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            output: output.into(),
        }
    }

    /// Store layout used by the agents: `<root>/peer_<id>/`, reconstructing
    /// into `<root>/reconstructed_peer_<id>.bin`.
    pub fn for_peer(root: &Path, peer_id: u16) -> Self {
        Self::new(
            root.join(format!("peer_{peer_id}")),
            root.join(format!("reconstructed_peer_{peer_id}.bin")),
        )
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn piece_path(&self, piece: PieceId) -> PathBuf {
        self.directory.join(format!("{PIECE_PREFIX}{}", piece.as_u32()))
    }
}

/// Parses `piece_<id>`, ignoring temporary and unrelated files.
fn parse_piece_name(name: &str) -> Option<PieceId> {
    name.strip_prefix(PIECE_PREFIX)?
        .parse::<u32>()
        .ok()
        .map(PieceId::new)
}

#[async_trait]
impl PieceStore for FilePieceStore {
    async fn list_pieces(&self) -> Result<PieceSet, StorageError> {
        fs::create_dir_all(&self.directory).await?;

        let mut pieces = PieceSet::new();
        let mut entries = fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(piece) = entry.file_name().to_str().and_then(parse_piece_name) {
                pieces.insert(piece);
            }
        }
        Ok(pieces)
    }

    async fn read_piece(&self, piece: PieceId) -> Result<Bytes, StorageError> {
        match fs::read(self.piece_path(piece)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::PieceNotFound { piece }),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write_piece(&self, piece: PieceId, data: &[u8]) -> Result<(), StorageError> {
        fs::create_dir_all(&self.directory).await?;

        let final_path = self.piece_path(piece);
        let temp_path = final_path.with_extension(TEMP_EXTENSION);
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &final_path).await?;

        tracing::debug!("Stored piece {} ({} bytes)", piece, data.len());
        Ok(())
    }

    async fn reconstruct(&self, total: u32) -> Result<bool, StorageError> {
        let stored = self.list_pieces().await?;
        if total == 0 || (0..total).any(|index| !stored.contains(&PieceId::new(index))) {
            return Ok(false);
        }

        if let Some(parent) = self.output.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = self.output.with_extension(TEMP_EXTENSION);
        let mut file = fs::File::create(&temp_path).await?;
        for index in 0..total {
            let data = self.read_piece(PieceId::new(index)).await?;
            file.write_all(&data).await?;
        }
        file.flush().await?;
        drop(file);
        fs::rename(&temp_path, &self.output).await?;

        tracing::info!(
            "Reconstructed {} pieces into {}",
            total,
            self.output.display()
        );
        Ok(true)
    }
}
