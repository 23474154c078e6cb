//! Rarest-first ordering of missing pieces.
//!
//! Frequencies are re-derived on every call from the agent's current peer
//! knowledge; nothing is cached between rounds.

use std::collections::HashMap;

use crate::piece::{PieceId, PieceSet};

/// A missing piece together with the number of known peers holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedPiece {
    pub piece: PieceId,
    pub frequency: usize,
}

/// Counts how many of the given piece sets contain each piece.
pub fn piece_frequencies<'a, I>(knowledge: I) -> HashMap<PieceId, usize>
where
    I: IntoIterator<Item = &'a PieceSet>,
{
    let mut frequency = HashMap::new();
    for pieces in knowledge {
        for piece in pieces {
            *frequency.entry(*piece).or_insert(0) += 1;
        }
    }
    frequency
}

/// Ranks every piece in `0..total` not in `owned`, rarest first.
///
/// Pieces no known peer holds have frequency 0 and come first. Equal
/// frequencies are ordered by ascending piece id so the result is
/// reproducible.
pub fn rank_missing<'a, I>(total: u32, owned: &PieceSet, knowledge: I) -> Vec<RankedPiece>
where
    I: IntoIterator<Item = &'a PieceSet>,
{
    let frequency = piece_frequencies(knowledge);

    let mut ranked: Vec<RankedPiece> = (0..total)
        .map(PieceId::new)
        .filter(|piece| !owned.contains(piece))
        .map(|piece| RankedPiece {
            piece,
            frequency: frequency.get(&piece).copied().unwrap_or(0),
        })
        .collect();

    ranked.sort_by_key(|ranked| (ranked.frequency, ranked.piece));
    ranked
}

/// Missing pieces in rarest-first order.
pub fn rarest_first<'a, I>(total: u32, owned: &PieceSet, knowledge: I) -> Vec<PieceId>
where
    I: IntoIterator<Item = &'a PieceSet>,
{
    rank_missing(total, owned, knowledge)
        .into_iter()
        .map(|ranked| ranked.piece)
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::piece::piece_set;

    #[test]
    fn test_unseen_pieces_rank_first() {
        let owned = piece_set([0]);
        let knowledge = [piece_set([1, 2]), piece_set([1])];

        let order = rarest_first(4, &owned, &knowledge);
        assert_eq!(order, vec![PieceId::new(3), PieceId::new(2), PieceId::new(1)]);
    }

    #[test]
    fn test_owned_pieces_excluded() {
        // Four pieces, piece 2 missing, one of two peers holds it
        let owned = piece_set([0, 1, 3]);
        let knowledge = [piece_set([2]), piece_set([0, 1])];

        let ranked = rank_missing(4, &owned, &knowledge);
        assert_eq!(
            ranked,
            vec![RankedPiece {
                piece: PieceId::new(2),
                frequency: 1,
            }]
        );
    }

    #[test]
    fn test_ties_broken_by_piece_id() {
        let owned = PieceSet::new();
        let knowledge = [piece_set([0, 1, 2, 3])];

        let order = rarest_first(4, &owned, &knowledge);
        assert_eq!(order, (0..4).map(PieceId::new).collect::<Vec<_>>());
    }

    #[test]
    fn test_complete_agent_has_nothing_to_rank() {
        let owned = piece_set(0..5);
        assert!(rarest_first(5, &owned, &[piece_set([1, 2])]).is_empty());
        assert!(rarest_first(0, &PieceSet::new(), &Vec::<PieceSet>::new()).is_empty());
    }

    #[test]
    fn test_out_of_range_pieces_ignored() {
        let knowledge = [piece_set([0, 9, 10])];
        let ranked = rank_missing(2, &PieceSet::new(), &knowledge);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].piece, PieceId::new(1));
        assert_eq!(ranked[0].frequency, 0);
        assert_eq!(ranked[1].frequency, 1);
    }

    fn arbitrary_knowledge() -> impl Strategy<Value = (u32, PieceSet, Vec<PieceSet>)> {
        (1u32..40).prop_flat_map(|total| {
            let set = proptest::collection::btree_set(0..total, 0..total as usize)
                .prop_map(|ids| ids.into_iter().map(PieceId::new).collect::<PieceSet>());
            (
                Just(total),
                set.clone(),
                proptest::collection::vec(set, 0..8),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_ordering_is_non_decreasing((total, owned, knowledge) in arbitrary_knowledge()) {
            let ranked = rank_missing(total, &owned, &knowledge);

            for pair in ranked.windows(2) {
                prop_assert!(pair[0].frequency <= pair[1].frequency);
            }
            if let Some(first_seen) = ranked.iter().position(|r| r.frequency > 0) {
                prop_assert!(ranked[first_seen..].iter().all(|r| r.frequency > 0));
            }
        }

        #[test]
        fn prop_ranks_exactly_the_missing_pieces((total, owned, knowledge) in arbitrary_knowledge()) {
            let ranked = rank_missing(total, &owned, &knowledge);

            prop_assert_eq!(ranked.len(), total as usize - owned.len());
            for entry in &ranked {
                prop_assert!(!owned.contains(&entry.piece));
                prop_assert!(entry.piece.is_within(total));
                let holders = knowledge.iter().filter(|set| set.contains(&entry.piece)).count();
                prop_assert_eq!(entry.frequency, holders);
            }
        }
    }
}
