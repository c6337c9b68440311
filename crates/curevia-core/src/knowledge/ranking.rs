//! Trending promotion of cached entries

use super::store::KnowledgeEntry;

const DAY_SECS: i64 = 86_400;

/// 3 when used within a day, 2 within a week, 1 within thirty days
pub fn recency_bonus(last_used_at: i64, now: i64) -> u32 {
    let age = (now - last_used_at).max(0);
    if age < DAY_SECS {
        3
    } else if age < 7 * DAY_SECS {
        2
    } else if age < 30 * DAY_SECS {
        1
    } else {
        0
    }
}

/// `upvotes × 10 + recency_bonus`
pub fn trending_score(votes: u32, last_used_at: i64, now: i64) -> u32 {
    votes.saturating_mul(10).saturating_add(recency_bonus(last_used_at, now))
}

/// Highest-scoring entries first, ties broken by most recent use
pub fn top_trending(mut entries: Vec<KnowledgeEntry>, now: i64, limit: usize) -> Vec<KnowledgeEntry> {
    entries.sort_by(|a, b| {
        trending_score(b.votes, b.last_used_at, now)
            .cmp(&trending_score(a.votes, a.last_used_at, now))
            .then(b.last_used_at.cmp(&a.last_used_at))
            .then(a.id.cmp(&b.id))
    });
    entries.truncate(limit);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;

    fn entry(id: i64, votes: u32, last_used_at: i64) -> KnowledgeEntry {
        KnowledgeEntry {
            id,
            language: Language::Sv,
            question: format!("q{id}"),
            answer: format!("a{id}"),
            embedding: vec![1.0],
            votes,
            last_used_at,
        }
    }

    #[test]
    fn test_recency_buckets() {
        let now = 100 * DAY_SECS;
        assert_eq!(recency_bonus(now - 3600, now), 3);
        assert_eq!(recency_bonus(now - 3 * DAY_SECS, now), 2);
        assert_eq!(recency_bonus(now - 10 * DAY_SECS, now), 1);
        assert_eq!(recency_bonus(now - 31 * DAY_SECS, now), 0);
        assert_eq!(trending_score(2, now, now), 23);
    }

    #[test]
    fn test_votes_outrank_recency() {
        let now = 100 * DAY_SECS;
        let ranked = top_trending(
            vec![
                entry(1, 0, now),
                entry(2, 1, now - 60 * DAY_SECS),
                entry(3, 0, now - 2 * DAY_SECS),
            ],
            now,
            2,
        );
        let ids: Vec<i64> = ranked.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }
}
