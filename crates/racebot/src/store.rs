//! Sqlite-backed sentence and best-time store.
//!
//! Schema:
//! - `sentences(id, sentence, type)` where type is the difficulty tier 0..2
//! - `results(id, player, sentence_id, time_taken, timestamp)` append-only;
//!   "best" is the per-sentence minimum computed at query time.

use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use racecore::repo::{BestTime, SentenceRepository};
use racecore::session::Difficulty;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .with_context(|| format!("parse sqlite path {path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .with_context(|| format!("open sqlite db {path}"))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database. One connection only: each in-memory sqlite
    /// connection is its own database.
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("open in-memory sqlite db")?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sentences (\
                 id INTEGER PRIMARY KEY AUTOINCREMENT,\
                 sentence TEXT NOT NULL,\
                 type INTEGER NOT NULL\
             )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS results (\
                 id INTEGER PRIMARY KEY AUTOINCREMENT,\
                 player TEXT NOT NULL,\
                 sentence_id INTEGER,\
                 time_taken REAL,\
                 timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,\
                 FOREIGN KEY (sentence_id) REFERENCES sentences(id)\
             )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_sentence(&self, sentence: &str, tier: i64) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "INSERT INTO sentences (sentence, type) \
             SELECT ?1, ?2 \
             WHERE NOT EXISTS (SELECT 1 FROM sentences WHERE sentence = ?1 AND type = ?2)",
        )
        .bind(sentence)
        .bind(tier)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Load sentences from a seed file: one `tier<TAB>sentence` row per
    /// line, `#` comments and blank lines skipped, duplicates ignored.
    pub async fn seed_from_file(&self, path: &Path) -> anyhow::Result<usize> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read seed file {}", path.display()))?;
        self.seed_from_str(&text).await
    }

    pub async fn seed_from_str(&self, text: &str) -> anyhow::Result<usize> {
        let mut added = 0;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((tier, sentence)) = line.split_once('\t') else {
                continue;
            };
            let Ok(tier) = tier.trim().parse::<i64>() else {
                continue;
            };
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            if self.add_sentence(sentence, tier).await? {
                added += 1;
            }
        }
        Ok(added)
    }
}

#[async_trait]
impl SentenceRepository for SqliteStore {
    async fn random_sentence(&self, tier: Difficulty) -> anyhow::Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT sentence FROM sentences WHERE type = ?1 ORDER BY RANDOM() LIMIT 1",
        )
        .bind(tier.tier())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(s,)| s))
    }

    /// Single-statement compare-and-insert: the row only lands when no
    /// faster-or-equal time exists, so concurrent channels racing on the
    /// same sentence cannot interleave a read-then-write.
    async fn insert_if_faster(
        &self,
        sentence: &str,
        player: &str,
        elapsed: f64,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "INSERT INTO results (player, sentence_id, time_taken) \
             SELECT ?1, s.id, ?3 FROM sentences s \
             WHERE s.sentence = ?2 \
               AND NOT EXISTS (\
                   SELECT 1 FROM results r \
                   WHERE r.sentence_id = s.id AND r.time_taken <= ?3\
               ) \
             LIMIT 1",
        )
        .bind(player)
        .bind(sentence)
        .bind(elapsed)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn best_times(&self, limit: u32) -> anyhow::Result<Vec<BestTime>> {
        let rows: Vec<(String, String, f64)> = sqlx::query_as(
            "SELECT s.sentence, r.player, MIN(r.time_taken) AS best_time \
             FROM results r \
             JOIN sentences s ON r.sentence_id = s.id \
             GROUP BY r.sentence_id \
             ORDER BY best_time ASC \
             LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(sentence, player, elapsed)| BestTime {
                sentence,
                player,
                elapsed,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENT: &str = "sphinx of black quartz, judge my vow";

    async fn store_with_sentence() -> SqliteStore {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.add_sentence(SENT, 0).await.unwrap();
        store
    }

    #[tokio::test]
    async fn slower_or_equal_times_never_change_the_best() {
        let store = store_with_sentence().await;

        assert!(store.insert_if_faster(SENT, "alice", 5.0).await.unwrap());
        assert!(!store.insert_if_faster(SENT, "bob", 6.0).await.unwrap());
        assert!(!store.insert_if_faster(SENT, "bob", 5.0).await.unwrap());
        assert!(store.insert_if_faster(SENT, "bob", 4.5).await.unwrap());

        let best = store.best_times(10).await.unwrap();
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].player, "bob");
        assert!((best[0].elapsed - 4.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unknown_sentence_records_nothing() {
        let store = store_with_sentence().await;
        assert!(!store
            .insert_if_faster("no such prompt", "alice", 1.0)
            .await
            .unwrap());
        assert!(store.best_times(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn random_sentence_respects_tier() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        store.add_sentence("easy one", 0).await.unwrap();

        let got = store
            .random_sentence(Difficulty::Beginner)
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some("easy one"));
        assert_eq!(
            store.random_sentence(Difficulty::Advanced).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn best_times_order_ascending_with_limit() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        for (i, s) in ["aa", "bb", "cc"].iter().enumerate() {
            store.add_sentence(s, 0).await.unwrap();
            store
                .insert_if_faster(s, "p", 3.0 - i as f64)
                .await
                .unwrap();
        }

        let best = store.best_times(2).await.unwrap();
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].sentence, "cc");
        assert_eq!(best[1].sentence, "bb");
    }

    #[tokio::test]
    async fn seeding_skips_duplicates_and_junk() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let seed = "# comment\n0\tfirst sentence\n1\tsecond sentence\nnot a row\n0\tfirst sentence\n";
        assert_eq!(store.seed_from_str(seed).await.unwrap(), 2);
        assert_eq!(store.seed_from_str(seed).await.unwrap(), 0);
    }
}
