//! Choke/unchoke scheduling.
//!
//! Each round scores every known peer by how many of the agent's rarest
//! missing pieces it holds, unchokes the best scorers, and adds one random
//! optimistic unchoke from the rest. The previous round's state is discarded.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use rand::Rng;
use rand::seq::IndexedRandom;

use crate::piece::{PeerAddress, PieceId, PieceSet};

/// Maximum peers unchoked by score in one round.
pub const MAX_FIXED_UNCHOKED: usize = 4;

/// Partition of known peers for one scheduling round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChokeState {
    /// Top scorers of the round
    pub fixed_unchoked: BTreeSet<PeerAddress>,
    /// One randomly chosen peer outside the top scorers
    pub optimistic: Option<PeerAddress>,
    /// Every other known peer
    pub choked: BTreeSet<PeerAddress>,
}

impl ChokeState {
    /// Fixed and optimistic unchokes together.
    pub fn unchoked(&self) -> BTreeSet<PeerAddress> {
        let mut unchoked = self.fixed_unchoked.clone();
        unchoked.extend(self.optimistic.iter().cloned());
        unchoked
    }

    pub fn is_unchoked(&self, peer: &PeerAddress) -> bool {
        self.fixed_unchoked.contains(peer) || self.optimistic.as_ref() == Some(peer)
    }

    /// Drops a peer that left the swarm from whichever side it is on.
    pub fn forget(&mut self, peer: &PeerAddress) {
        self.fixed_unchoked.remove(peer);
        self.choked.remove(peer);
        if self.optimistic.as_ref() == Some(peer) {
            self.optimistic = None;
        }
    }
}

/// Weighted count of rare pieces a peer holds.
///
/// A piece at position `i` of the rarest-first ordering contributes
/// `rarest.len() - i`, so rarer pieces weigh more. Pieces outside the
/// ordering (already owned, or out of range) contribute nothing.
pub fn score_peer(pieces: &PieceSet, rarest: &[PieceId]) -> u64 {
    let len = rarest.len();
    rarest
        .iter()
        .enumerate()
        .filter(|(_, piece)| pieces.contains(piece))
        .map(|(index, _)| (len - index) as u64)
        .sum()
}

/// Computes a fresh choke partition of `known`.
///
/// Peers are sorted by descending score (ties by ascending address); the
/// first `max_fixed` become fixed unchokes. One peer is then drawn uniformly
/// from the remainder as the optimistic unchoke. Known peers without a
/// knowledge entry score zero.
pub fn schedule_round<R>(
    known: &BTreeSet<PeerAddress>,
    knowledge: &HashMap<PeerAddress, PieceSet>,
    rarest: &[PieceId],
    max_fixed: usize,
    rng: &mut R,
) -> ChokeState
where
    R: Rng + ?Sized,
{
    let empty = PieceSet::new();
    let mut scored: Vec<(&PeerAddress, u64)> = known
        .iter()
        .map(|peer| {
            let pieces = knowledge.get(peer).unwrap_or(&empty);
            (peer, score_peer(pieces, rarest))
        })
        .collect();
    scored.sort_by(|(peer_a, score_a), (peer_b, score_b)| {
        Reverse(score_a)
            .cmp(&Reverse(score_b))
            .then_with(|| peer_a.cmp(peer_b))
    });

    let split = max_fixed.min(scored.len());
    let (top, rest) = scored.split_at(split);

    let fixed_unchoked: BTreeSet<PeerAddress> =
        top.iter().map(|(peer, _)| (*peer).clone()).collect();
    let optimistic = rest.choose(rng).map(|(peer, _)| (*peer).clone());

    let choked = rest
        .iter()
        .map(|(peer, _)| (*peer).clone())
        .filter(|peer| optimistic.as_ref() != Some(peer))
        .collect();

    ChokeState {
        fixed_unchoked,
        optimistic,
        choked,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
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
    fn test_score_weights_rarer_pieces_higher() {
        let rarest = ids(&[7, 3, 5]);
        assert_eq!(score_peer(&piece_set([7]), &rarest), 3);
        assert_eq!(score_peer(&piece_set([5]), &rarest), 1);
        assert_eq!(score_peer(&piece_set([7, 3, 5]), &rarest), 6);
        assert_eq!(score_peer(&piece_set([0, 1]), &rarest), 0);
    }

    #[test]
    fn test_top_scorers_become_fixed_unchokes() {
        let rarest = ids(&[0, 1, 2, 3, 4, 5]);
        let known: BTreeSet<_> = (6001..=6006).map(peer).collect();
        let knowledge: HashMap<_, _> = [
            (peer(6001), piece_set([0, 1, 2])),
            (peer(6002), piece_set([0])),
            (peer(6003), piece_set([5])),
            (peer(6004), piece_set([1, 2])),
            (peer(6005), piece_set([3])),
            (peer(6006), PieceSet::new()),
        ]
        .into_iter()
        .collect();

        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let state = schedule_round(&known, &knowledge, &rarest, 4, &mut rng);

        let expected: BTreeSet<_> = [6001, 6002, 6004, 6005].into_iter().map(peer).collect();
        assert_eq!(state.fixed_unchoked, expected);

        let optimistic = state.optimistic.clone().expect("remainder is not empty");
        assert!(optimistic == peer(6003) || optimistic == peer(6006));
        assert_eq!(state.choked.len(), 1);
        assert!(!state.choked.contains(&optimistic));
    }

    #[test]
    fn test_few_peers_leave_no_optimistic_pick() {
        let known: BTreeSet<_> = [peer(6001), peer(6002)].into_iter().collect();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let state = schedule_round(&known, &HashMap::new(), &[], 4, &mut rng);
        assert_eq!(state.fixed_unchoked, known);
        assert!(state.optimistic.is_none());
        assert!(state.choked.is_empty());
    }

    #[test]
    fn test_empty_swarm_yields_empty_state() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let state = schedule_round(&BTreeSet::new(), &HashMap::new(), &[], 4, &mut rng);
        assert_eq!(state, ChokeState::default());
    }

    #[test]
    fn test_forget_removes_peer_everywhere() {
        let mut state = ChokeState {
            fixed_unchoked: [peer(6001)].into_iter().collect(),
            optimistic: Some(peer(6002)),
            choked: [peer(6003)].into_iter().collect(),
        };
        state.forget(&peer(6002));
        state.forget(&peer(6003));
        assert!(state.optimistic.is_none());
        assert!(state.choked.is_empty());
        assert!(state.is_unchoked(&peer(6001)));
    }

    proptest! {
        #[test]
        fn prop_partition_invariants(
            holdings in proptest::collection::vec(
                proptest::collection::btree_set(0u32..12, 0..12),
                0..12,
            ),
            rarest in proptest::collection::vec(0u32..12, 0..12),
            seed in any::<u64>(),
        ) {
            let known: BTreeSet<_> = (0..holdings.len() as u16).map(|i| peer(7000 + i)).collect();
            let knowledge: HashMap<_, _> = holdings
                .iter()
                .enumerate()
                .map(|(i, set)| (peer(7000 + i as u16), piece_set(set.iter().copied())))
                .collect();
            let rarest = ids(&rarest);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);

            let state = schedule_round(&known, &knowledge, &rarest, MAX_FIXED_UNCHOKED, &mut rng);
            let unchoked = state.unchoked();

            prop_assert!(unchoked.is_disjoint(&state.choked));
            let union: BTreeSet<_> = unchoked.union(&state.choked).cloned().collect();
            prop_assert_eq!(union, known.clone());
            prop_assert!(state.fixed_unchoked.len() <= MAX_FIXED_UNCHOKED);
            if let Some(optimistic) = &state.optimistic {
                prop_assert!(!state.fixed_unchoked.contains(optimistic));
            }
            if known.len() > MAX_FIXED_UNCHOKED {
                prop_assert!(state.optimistic.is_some());
            }
        }
    }
}
