//! Periodic choke scheduling

use std::sync::Arc;

use futures::future::join_all;
use tokio::time::MissedTickBehavior;

use super::AgentContext;
use crate::selection::ChokeState;
use crate::storage::PieceStore;

/// Runs one scheduling round per choke interval until aborted.
pub(crate) async fn run_choke_loop<S>(context: Arc<AgentContext<S>>)
where
    S: PieceStore + 'static,
{
    let mut interval = tokio::time::interval(context.config.choke_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let state = run_round(&context).await;
        tracing::debug!(
            "Unchoked {:?}, optimistic {:?}, {} choked",
            state.fixed_unchoked,
            state.optimistic,
            state.choked.len()
        );
    }
}

/// Refreshes every known peer's listing, then rebuilds the choke partition.
///
/// Listings are fetched concurrently without holding the lock. A peer whose
/// refresh fails is forgotten before scoring.
pub(crate) async fn run_round<S>(context: &AgentContext<S>) -> ChokeState
where
    S: PieceStore,
{
    let known: Vec<_> = context.state.lock().known_peers.iter().cloned().collect();

    let listings = join_all(known.into_iter().map(|peer| async move {
        let result = context.peers.list_pieces(&peer).await;
        (peer, result)
    }))
    .await;

    let mut state = context.state.lock();
    for (peer, result) in listings {
        match result {
            Ok(pieces) => state.record_listing(peer, pieces),
            Err(e) => {
                if e.is_transient() {
                    tracing::info!("Refresh of {} failed, forgetting it: {}", peer, e);
                } else {
                    tracing::warn!("Peer {} answered out of protocol, forgetting it: {}", peer, e);
                }
                state.forget_peer(&peer);
            }
        }
    }
    state.reschedule(context.config.max_fixed_unchoked, &mut rand::rng());
    state.choke.clone()
}
