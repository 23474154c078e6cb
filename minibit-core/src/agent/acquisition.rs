//! Acquisition loop: register, pick a peer, try to download one piece

use std::sync::Arc;

use rand::seq::IndexedRandom;

use super::AgentContext;
use crate::piece::{PeerAddress, PieceId, PieceSet};
use crate::storage::{PieceCountDescriptor, PieceStore};
use crate::{Result, SwarmError};

/// Result of one download attempt against a single peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// One piece was transferred and stored
    Downloaded(PieceId),
    /// The peer holds a wanted piece but is currently choked
    Choked,
    /// The peer holds none of the wanted pieces
    NothingAvailable,
}

enum Cycle {
    /// Wait the normal cycle delay and go again
    Continue,
    /// Nothing to do yet; wait the retry delay
    Idle,
    /// Acquisition is over for this agent
    Finished,
}

/// Runs acquisition cycles until the agent holds every piece.
///
/// The origin never finishes: it keeps registering so it stays
/// discoverable. Errors abandon the current cycle only.
pub(crate) async fn run_acquisition<S>(context: Arc<AgentContext<S>>)
where
    S: PieceStore + 'static,
{
    loop {
        let delay = match run_cycle(&context).await {
            Ok(Cycle::Continue) => context.config.cycle_delay,
            Ok(Cycle::Idle) => context.config.retry_delay,
            Ok(Cycle::Finished) => return,
            Err(e) => {
                log_failure("Acquisition cycle", &e);
                context.config.retry_delay
            }
        };
        tokio::time::sleep(delay).await;
    }
}

async fn run_cycle<S>(context: &AgentContext<S>) -> Result<Cycle>
where
    S: PieceStore,
{
    let total = context.state.lock().total;
    if total.is_none() {
        let descriptor = PieceCountDescriptor::new(context.config.descriptor_path());
        let total = descriptor.read().await?;
        context.state.lock().total = Some(total);
    }

    if context.state.lock().is_complete() {
        if context.config.origin {
            sync_with_tracker(context).await?;
            return Ok(Cycle::Continue);
        }
        // Best effort: completion does not wait on the tracker
        if let Err(e) = sync_with_tracker(context).await {
            log_failure("Final registration", &e);
        }
        reconstruct_if_complete(context).await?;
        tracing::info!("Peer {} holds every piece, acquisition finished", context.address);
        return Ok(Cycle::Finished);
    }

    sync_with_tracker(context).await?;

    let peer = {
        let state = context.state.lock();
        let known: Vec<&PeerAddress> = state.known_peers.iter().collect();
        known.choose(&mut rand::rng()).map(|peer| (*peer).clone())
    };
    let Some(peer) = peer else {
        tracing::info!("No known peers yet, waiting");
        return Ok(Cycle::Idle);
    };

    match try_download(context, &peer).await {
        Ok(outcome) => tracing::debug!("Attempt against {}: {:?}", peer, outcome),
        Err(e) => log_failure(&format!("Download from {peer}"), &e),
    }
    Ok(Cycle::Continue)
}

/// Registers the local pieces, then merges a discovery answer.
pub(crate) async fn sync_with_tracker<S>(context: &AgentContext<S>) -> Result<()>
where
    S: PieceStore,
{
    let port = context.address.port;
    let pieces = context.state.lock().pieces.clone();
    context.tracker.register(port, &pieces).await?;

    let payload = context.tracker.discover(Some(port)).await?;
    let added = context
        .state
        .lock()
        .merge_discovered(payload, &context.address);
    if added > 0 {
        tracing::info!("Discovered {} new peers", added);
    }
    Ok(())
}

/// Tries the candidate pieces in order against `peer`, stopping after the
/// first successful transfer.
///
/// A choked peer aborts the attempt as soon as it turns out to hold a
/// wanted piece. Network errors abort the attempt and are returned.
///
/// # Errors
///
/// - `SwarmError::PeerUnreachable` / `Timeout` / `Io` - If talking to the peer failed
/// - `SwarmError::Protocol` - If the peer answered out of protocol
/// - `SwarmError::Storage` - If the piece could not be stored
pub(crate) async fn try_download<S>(
    context: &AgentContext<S>,
    peer: &PeerAddress,
) -> Result<DownloadOutcome>
where
    S: PieceStore,
{
    let candidates = context.state.lock().download_candidates();

    for piece in candidates {
        if !context.peers.has_piece(peer, piece).await? {
            continue;
        }

        let unchoked = context.state.lock().choke.is_unchoked(peer);
        if !unchoked {
            tracing::info!("Peer {} holds piece {} but is choked", peer, piece);
            return Ok(DownloadOutcome::Choked);
        }

        let Some(data) = context.peers.request_piece(peer, piece).await? else {
            tracing::debug!("Peer {} no longer offers piece {}", peer, piece);
            continue;
        };

        context.store.write_piece(piece, &data).await?;
        context.state.lock().add_piece(piece);
        tracing::info!("Downloaded piece {} ({} bytes) from {}", piece, data.len(), peer);

        report_piece(context, piece).await;
        reconstruct_if_complete(context).await?;
        return Ok(DownloadOutcome::Downloaded(piece));
    }

    Ok(DownloadOutcome::NothingAvailable)
}

async fn report_piece<S>(context: &AgentContext<S>, piece: PieceId)
where
    S: PieceStore,
{
    let pieces = PieceSet::from([piece]);
    if let Err(e) = context
        .tracker
        .update_pieces(Some(context.address.port), &pieces)
        .await
    {
        tracing::debug!("Could not report piece {} to tracker: {}", piece, e);
    }
}

/// Network errors log as warnings, everything else as errors.
fn log_failure(action: &str, error: &SwarmError) {
    if error.is_transient() {
        tracing::warn!("{} failed, retrying later: {}", action, error);
    } else {
        tracing::error!("{} failed: {}", action, error);
    }
}

/// Reassembles the payload once every piece is owned. Safe to repeat.
pub(crate) async fn reconstruct_if_complete<S>(context: &AgentContext<S>) -> Result<bool>
where
    S: PieceStore,
{
    let total = {
        let state = context.state.lock();
        match state.total {
            Some(total) if state.is_complete() => total,
            _ => return Ok(false),
        }
    };

    let written = context
        .store
        .reconstruct(total)
        .await
        .map_err(SwarmError::from)?;
    if written {
        tracing::info!("Peer {} reconstructed the full payload", context.address);
    }
    Ok(written)
}
