// Display ordering for leaderboards.
//
// The store keeps leaderboards exactly as the coordinator sent them. Ranking
// is derived on read: a stable descending sort by score, so equal scores keep
// their arrival order, numbered from 1 with no shared ranks.

use scribble_protocol::LeaderboardEntry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RankedEntry<'a> {
    pub rank: usize,
    pub name: &'a str,
    pub score: i64,
}

pub fn rank(entries: &[LeaderboardEntry]) -> Vec<RankedEntry<'_>> {
    let mut sorted: Vec<&LeaderboardEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.score.cmp(&a.score));
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, entry)| RankedEntry {
            rank: i + 1,
            name: &entry.name,
            score: entry.score,
        })
        .collect()
}

/// The top-ranked entry, if any.
pub fn winner(entries: &[LeaderboardEntry]) -> Option<RankedEntry<'_>> {
    rank(entries).into_iter().next()
}
