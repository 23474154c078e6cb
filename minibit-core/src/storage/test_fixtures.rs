//! In-memory piece store for tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{PieceStore, StorageError};
use crate::piece::{PieceId, PieceSet};

/// Piece store kept entirely in memory.
///
/// Reconstruction stores the concatenated payload instead of writing a file.
#[derive(Debug, Default)]
pub struct MemoryPieceStore {
    pieces: Mutex<BTreeMap<PieceId, Bytes>>,
    reconstructed: Mutex<Option<Bytes>>,
}

impl MemoryPieceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-filled with `(index, data)` pairs.
    pub fn with_pieces<I, D>(pieces: I) -> Self
    where
        I: IntoIterator<Item = (u32, D)>,
        D: AsRef<[u8]>,
    {
        let store = Self::new();
        {
            let mut stored = store.pieces.lock();
            for (index, data) in pieces {
                stored.insert(PieceId::new(index), Bytes::copy_from_slice(data.as_ref()));
            }
        }
        store
    }

    /// Payload produced by the last successful reconstruction.
    pub fn reconstructed(&self) -> Option<Bytes> {
        self.reconstructed.lock().clone()
    }
}

#[async_trait]
impl PieceStore for MemoryPieceStore {
    async fn list_pieces(&self) -> Result<PieceSet, StorageError> {
        Ok(self.pieces.lock().keys().copied().collect())
    }

    async fn read_piece(&self, piece: PieceId) -> Result<Bytes, StorageError> {
        self.pieces
            .lock()
            .get(&piece)
            .cloned()
            .ok_or(StorageError::PieceNotFound { piece })
    }

    async fn write_piece(&self, piece: PieceId, data: &[u8]) -> Result<(), StorageError> {
        self.pieces
            .lock()
            .insert(piece, Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn reconstruct(&self, total: u32) -> Result<bool, StorageError> {
        let payload = {
            let pieces = self.pieces.lock();
            if total == 0 {
                return Ok(false);
            }
            let mut payload = Vec::new();
            for index in 0..total {
                match pieces.get(&PieceId::new(index)) {
                    Some(data) => payload.extend_from_slice(data),
                    None => return Ok(false),
                }
            }
            payload
        };

        *self.reconstructed.lock() = Some(Bytes::from(payload));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::piece_set;

    #[tokio::test]
    async fn test_memory_store_reconstructs_in_order() {
        let store = MemoryPieceStore::with_pieces([(1, "lo"), (0, "hel")]);

        assert_eq!(store.list_pieces().await.unwrap(), piece_set([0, 1]));
        assert!(!store.reconstruct(3).await.unwrap());
        assert!(store.reconstructed().is_none());

        assert!(store.reconstruct(2).await.unwrap());
        assert_eq!(store.reconstructed().unwrap().as_ref(), b"hello");
    }
}
