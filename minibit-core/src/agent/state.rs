//! Mutable agent state guarded by the agent's lock

use std::collections::{BTreeSet, HashMap};

use rand::Rng;

use crate::piece::{PeerAddress, PieceId, PieceSet};
use crate::protocol::DiscoveryPayload;
use crate::selection::{ChokeState, rarest_first, schedule_round};

/// Everything the agent's loops and handlers coordinate through.
///
/// Helpers take `&self`/`&mut self` on the already locked state, so one
/// decision never needs the lock twice.
#[derive(Debug, Default)]
pub struct AgentState {
    /// Pieces stored locally; only ever grows
    pub pieces: PieceSet,
    /// Peers learned from the tracker and not yet found unreachable
    pub known_peers: BTreeSet<PeerAddress>,
    /// Last piece listing observed for each known peer
    pub peer_pieces: HashMap<PeerAddress, PieceSet>,
    /// Partition from the latest scheduling round
    pub choke: ChokeState,
    /// Globally rare pieces suggested by the tracker
    pub suggested: Vec<PieceId>,
    /// Piece count of the swarm once learned
    pub total: Option<u32>,
}

impl AgentState {
    pub fn new(pieces: PieceSet, total: Option<u32>) -> Self {
        Self {
            pieces,
            total,
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total
            .is_some_and(|total| (0..total).all(|index| self.pieces.contains(&PieceId::new(index))))
    }

    /// Missing pieces, rarest first across the current peer knowledge.
    pub fn rarest_missing(&self) -> Vec<PieceId> {
        match self.total {
            Some(total) => rarest_first(total, &self.pieces, self.peer_pieces.values()),
            None => Vec::new(),
        }
    }

    /// Pieces to try in one download attempt.
    ///
    /// Tracker suggestions that are still missing come first, then the
    /// rest of the rarest-first ordering.
    pub fn download_candidates(&self) -> Vec<PieceId> {
        let Some(total) = self.total else {
            return Vec::new();
        };

        let mut candidates: Vec<PieceId> = Vec::new();
        for piece in &self.suggested {
            if piece.is_within(total) && !self.pieces.contains(piece) && !candidates.contains(piece)
            {
                candidates.push(*piece);
            }
        }
        for piece in self.rarest_missing() {
            if !candidates.contains(&piece) {
                candidates.push(piece);
            }
        }
        candidates
    }

    /// Folds a discovery answer into the known peers, skipping `own`.
    ///
    /// Returns the number of peers that were not known before.
    pub fn merge_discovered(&mut self, payload: DiscoveryPayload, own: &PeerAddress) -> usize {
        let mut added = 0;
        for peer in payload.peers {
            if &peer != own && self.known_peers.insert(peer) {
                added += 1;
            }
        }
        self.suggested = payload.suggested_pieces;
        added
    }

    /// Stores a fresh piece listing for a known peer.
    pub fn record_listing(&mut self, peer: PeerAddress, pieces: PieceSet) {
        if self.known_peers.contains(&peer) {
            self.peer_pieces.insert(peer, pieces);
        }
    }

    /// Removes a peer from every view of the swarm.
    pub fn forget_peer(&mut self, peer: &PeerAddress) {
        self.known_peers.remove(peer);
        self.peer_pieces.remove(peer);
        self.choke.forget(peer);
    }

    /// Adds a downloaded piece. Returns false if it was already owned.
    pub fn add_piece(&mut self, piece: PieceId) -> bool {
        self.pieces.insert(piece)
    }

    /// Replaces the choke partition using the current knowledge.
    pub fn reschedule<R>(&mut self, max_fixed: usize, rng: &mut R)
    where
        R: Rng + ?Sized,
    {
        let rarest = self.rarest_missing();
        self.choke = schedule_round(
            &self.known_peers,
            &self.peer_pieces,
            &rarest,
            max_fixed,
            rng,
        );
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::piece::piece_set;

    fn peer(port: u16) -> PeerAddress {
        PeerAddress::new("127.0.0.1", port)
    }

    fn ids(raw: &[u32]) -> Vec<PieceId> {
        raw.iter().copied().map(PieceId::new).collect()
    }

    #[test]
    fn test_completion_needs_every_piece() {
        assert!(!AgentState::new(piece_set(0..4), None).is_complete());
        assert!(!AgentState::new(piece_set([0, 1, 3]), Some(4)).is_complete());
        assert!(AgentState::new(piece_set(0..4), Some(4)).is_complete());
    }

    #[test]
    fn test_single_missing_piece_ranks_first() {
        let mut state = AgentState::new(piece_set([0, 1, 3]), Some(4));
        state.known_peers = [peer(6001), peer(6002)].into_iter().collect();
        state.peer_pieces.insert(peer(6001), piece_set([2]));
        state.peer_pieces.insert(peer(6002), piece_set([0, 1]));

        assert_eq!(state.rarest_missing(), ids(&[2]));
    }

    #[test]
    fn test_candidates_put_suggestions_first() {
        let mut state = AgentState::new(piece_set([0]), Some(6));
        state.known_peers.insert(peer(6001));
        state.peer_pieces.insert(peer(6001), piece_set([1, 2]));
        state.suggested = ids(&[2, 0, 9, 2]);

        assert_eq!(state.download_candidates(), ids(&[2, 3, 4, 5, 1]));
    }

    #[test]
    fn test_merge_skips_own_address_and_keeps_existing() {
        let own = peer(6000);
        let mut state = AgentState::new(PieceSet::new(), Some(2));
        state.known_peers.insert(peer(6001));

        let added = state.merge_discovered(
            DiscoveryPayload {
                peers: vec![own.clone(), peer(6001), peer(6002)],
                suggested_pieces: ids(&[1]),
            },
            &own,
        );

        assert_eq!(added, 1);
        assert_eq!(
            state.known_peers,
            [peer(6001), peer(6002)].into_iter().collect()
        );
        assert_eq!(state.suggested, ids(&[1]));
    }

    #[test]
    fn test_forget_peer_clears_all_views() {
        let mut state = AgentState::new(PieceSet::new(), Some(3));
        state.known_peers = [peer(6001), peer(6002)].into_iter().collect();
        state.record_listing(peer(6001), piece_set([0]));
        state.record_listing(peer(6002), piece_set([1]));
        state.reschedule(4, &mut ChaCha8Rng::seed_from_u64(3));
        assert!(state.choke.is_unchoked(&peer(6001)));

        state.forget_peer(&peer(6001));

        assert!(!state.known_peers.contains(&peer(6001)));
        assert!(!state.peer_pieces.contains_key(&peer(6001)));
        assert!(!state.choke.is_unchoked(&peer(6001)));
    }

    #[test]
    fn test_listing_for_forgotten_peer_is_dropped() {
        let mut state = AgentState::new(PieceSet::new(), Some(3));
        state.record_listing(peer(6009), piece_set([0]));
        assert!(state.peer_pieces.is_empty());
    }
}
