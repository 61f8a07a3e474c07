use std::cmp::Ordering;

use crate::session::{PendingAnswer, PlayerScore};

/// Base award table: rank 0 earns 5, rank 1 earns 3, rank 2 earns 1.
pub const AWARDS: [u32; 3] = [5, 3, 1];

/// Points for one rank. The table is truncated to the declared player
/// count, so a two-player game pays only ranks 0 and 1 and a one-player
/// game pays only rank 0. Ranks past the table earn nothing.
pub fn award_for_rank(rank: usize, player_count: u64) -> u32 {
    if (rank as u64) >= player_count {
        return 0;
    }
    AWARDS.get(rank).copied().unwrap_or(0)
}

/// Order a round's answers for the award pass: elapsed time ascending,
/// ties broken by arrival order (the input is arrival-ordered and the
/// sort is stable).
pub fn rank_round(mut entries: Vec<PendingAnswer>) -> Vec<PendingAnswer> {
    entries.sort_by(|a, b| a.elapsed.partial_cmp(&b.elapsed).unwrap_or(Ordering::Equal));
    entries
}

/// Final standings: score descending, ties stable by first-scored order.
pub fn standings(scores: &[PlayerScore]) -> Vec<PlayerScore> {
    let mut out = scores.to_vec();
    out.sort_by(|a, b| b.points.cmp(&a.points));
    out
}
