//! Lock-guarded peer directory owned by one tracker process

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use rand::Rng;
use rand::seq::IteratorRandom;

use crate::config::TrackerConfig;
use crate::piece::{PeerAddress, PieceId, PieceSet};
use crate::protocol::DiscoveryPayload;
use crate::selection::piece_frequencies;

#[derive(Debug, Clone)]
struct RegisteredPeer {
    pieces: PieceSet,
    last_seen: Instant,
}

/// Maps peer addresses to the pieces they last reported.
///
/// Every method takes the single lock for its whole duration, so no caller
/// observes a partially applied mutation. With a peer TTL configured, stale
/// entries are evicted at the start of every call.
#[derive(Debug)]
pub struct Registry {
    peers: Mutex<HashMap<PeerAddress, RegisteredPeer>>,
    sample_size: usize,
    suggestion_count: usize,
    peer_ttl: Option<Duration>,
}

impl Registry {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            sample_size: config.sample_size,
            suggestion_count: config.suggestion_count,
            peer_ttl: config.peer_ttl,
        }
    }

    /// Inserts or overwrites the entry for `peer`.
    pub fn register(&self, peer: PeerAddress, pieces: PieceSet) {
        let mut peers = self.live_peers();
        let replaced = peers
            .insert(
                peer.clone(),
                RegisteredPeer {
                    pieces,
                    last_seen: Instant::now(),
                },
            )
            .is_some();

        if replaced {
            tracing::debug!("Refreshed registration of {}", peer);
        } else {
            tracing::info!("New peer registered: {} ({} known)", peer, peers.len());
        }
    }

    /// Adds `pieces` to the entry for `peer`, creating the entry if needed.
    pub fn update_pieces(&self, peer: PeerAddress, pieces: &PieceSet) {
        let mut peers = self.live_peers();
        let entry = peers.entry(peer).or_insert_with(|| RegisteredPeer {
            pieces: PieceSet::new(),
            last_seen: Instant::now(),
        });
        entry.pieces.extend(pieces.iter().copied());
        entry.last_seen = Instant::now();
    }

    /// Samples peers other than `requester` and suggests the rarest pieces.
    pub fn discover(&self, requester: Option<&PeerAddress>) -> DiscoveryPayload {
        self.discover_with(requester, &mut rand::rng())
    }

    /// [`Registry::discover`] with an explicit random source.
    ///
    /// Up to `sample_size` peers are drawn uniformly. Suggestions count each
    /// piece across every registered peer and keep the least common ones,
    /// ties broken by ascending piece id.
    pub fn discover_with<R>(&self, requester: Option<&PeerAddress>, rng: &mut R) -> DiscoveryPayload
    where
        R: Rng + ?Sized,
    {
        let peers = self.live_peers();

        let mut sample: Vec<PeerAddress> = peers
            .keys()
            .filter(|peer| Some(*peer) != requester)
            .cloned()
            .choose_multiple(rng, self.sample_size);
        sample.sort();

        let frequency = piece_frequencies(peers.values().map(|entry| &entry.pieces));
        let mut counted: Vec<(PieceId, usize)> = frequency.into_iter().collect();
        counted.sort_by_key(|(piece, count)| (*count, *piece));

        DiscoveryPayload {
            peers: sample,
            suggested_pieces: counted
                .into_iter()
                .take(self.suggestion_count)
                .map(|(piece, _)| piece)
                .collect(),
        }
    }

    /// Pieces last reported by `peer`.
    pub fn pieces_of(&self, peer: &PeerAddress) -> Option<PieceSet> {
        self.live_peers().get(peer).map(|entry| entry.pieces.clone())
    }

    pub fn len(&self) -> usize {
        self.live_peers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_peers(&self) -> MutexGuard<'_, HashMap<PeerAddress, RegisteredPeer>> {
        let mut peers = self.peers.lock();
        if let Some(ttl) = self.peer_ttl {
            evict_stale(&mut peers, ttl);
        }
        peers
    }
}

fn evict_stale(peers: &mut HashMap<PeerAddress, RegisteredPeer>, ttl: Duration) {
    peers.retain(|peer, entry| {
        let alive = entry.last_seen.elapsed() <= ttl;
        if !alive {
            tracing::info!("Evicting {} after {:?} without contact", peer, ttl);
        }
        alive
    });
}
