//! Piece and peer selection algorithms.
//!
//! Both are pure computations over a snapshot of what the agent knows:
//! [`rarity`] orders missing pieces rarest-first, [`choke`] partitions known
//! peers into unchoked and choked for one scheduling round.

pub mod choke;
pub mod rarity;

pub use choke::{ChokeState, MAX_FIXED_UNCHOKED, schedule_round, score_peer};
pub use rarity::{RankedPiece, piece_frequencies, rank_missing, rarest_first};
