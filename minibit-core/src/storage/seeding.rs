//! Preparing a swarm run: splitting the source payload and pre-seeding
//! non-origin agents with random subsets of the origin's pieces.

use std::path::Path;

use rand::Rng;
use rand::seq::IteratorRandom;

use super::{PieceStore, StorageError};
use crate::piece::{PieceId, PieceSet};

/// Piece size used when none is configured.
pub const DEFAULT_PIECE_SIZE: usize = 1024;

/// Cuts `source` into consecutive pieces of `piece_size` bytes and stores
/// them as pieces `0..n`. The last piece may be shorter.
///
/// Returns the number of pieces written.
///
/// # Errors
///
/// - `StorageError::EmptySource` - If the source file has no content
/// - `StorageError::Io` - If reading the source or writing a piece failed
pub async fn split_file<S>(source: &Path, store: &S, piece_size: usize) -> Result<u32, StorageError>
where
    S: PieceStore + ?Sized,
{
    let data = tokio::fs::read(source).await?;
    if data.is_empty() {
        return Err(StorageError::EmptySource {
            path: source.to_path_buf(),
        });
    }

    let mut total = 0u32;
    for chunk in data.chunks(piece_size.max(1)) {
        store.write_piece(PieceId::new(total), chunk).await?;
        total += 1;
    }

    tracing::info!(
        "Split {} ({} bytes) into {} pieces",
        source.display(),
        data.len(),
        total
    );
    Ok(total)
}

/// Picks one random subset of `available` per target.
///
/// Each subset size is drawn uniformly from `min..=max` and clamped to the
/// number of available pieces.
pub fn plan_distribution<R>(
    available: &PieceSet,
    targets: usize,
    min: usize,
    max: usize,
    rng: &mut R,
) -> Vec<PieceSet>
where
    R: Rng + ?Sized,
{
    let high = max.max(min).min(available.len());
    let low = min.min(high);

    (0..targets)
        .map(|_| {
            let size = rng.random_range(low..=high);
            available
                .iter()
                .copied()
                .choose_multiple(&mut *rng, size)
                .into_iter()
                .collect()
        })
        .collect()
}

/// Copies `pieces` from the origin store into a target store.
///
/// # Errors
///
/// - `StorageError::PieceNotFound` - If the origin does not hold a piece
/// - `StorageError::Io` - If copying failed
pub async fn seed_pieces<O, T>(origin: &O, target: &T, pieces: &PieceSet) -> Result<(), StorageError>
where
    O: PieceStore + ?Sized,
    T: PieceStore + ?Sized,
{
    for piece in pieces {
        let data = origin.read_piece(*piece).await?;
        target.write_piece(*piece, &data).await?;
    }
    Ok(())
}
