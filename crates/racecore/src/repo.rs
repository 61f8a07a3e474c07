use async_trait::async_trait;

use crate::session::Difficulty;

/// Served when the sentence store is empty or unreachable; the game keeps
/// going instead of crashing the session.
pub const FALLBACK_SENTENCE: &str = "the quick brown fox jumps over the lazy dog";

#[derive(Debug, Clone, PartialEq)]
pub struct BestTime {
    pub sentence: String,
    pub player: String,
    pub elapsed: f64,
}

/// Narrow query surface over the persistent store.
///
/// `insert_if_faster` must be a single transactional step: two channels can
/// race on the same sentence, and a read-then-write pair would let a slower
/// time overwrite a faster one.
#[async_trait]
pub trait SentenceRepository: Send + Sync {
    /// A random practice sentence for the tier, if the store has any.
    async fn random_sentence(&self, tier: Difficulty) -> anyhow::Result<Option<String>>;

    /// Record `elapsed` for `sentence` if it beats the stored best.
    /// Returns true when a new record row was appended.
    async fn insert_if_faster(
        &self,
        sentence: &str,
        player: &str,
        elapsed: f64,
    ) -> anyhow::Result<bool>;

    /// Per-sentence best times, ascending, at most `limit` rows.
    async fn best_times(&self, limit: u32) -> anyhow::Result<Vec<BestTime>>;
}
