//! Weight Store
//!
//! Holds the current per-category signal weights behind snapshot
//! semantics: readers clone an `Arc` and keep an immutable view for the
//! duration of a recommendation, the learning engine is the sole writer
//! and swaps the whole vector in one step. Weights and the append-only
//! adjustment log persist to SQLite; the vector is reconstructible from
//! defaults by replaying the log.

use std::sync::{Arc, RwLock};

use advisor_core::{LearningAdjustment, SignalCategory, WeightVector};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

#[derive(Debug, FromRow)]
struct WeightRow {
    category: String,
    weight: f64,
}

#[derive(Debug, FromRow)]
struct AdjustmentRow {
    category: String,
    delta: f64,
    reason: String,
    applied_at: String,
}

impl AdjustmentRow {
    fn into_adjustment(self) -> Option<LearningAdjustment> {
        let category = SignalCategory::parse(&self.category)?;
        Some(LearningAdjustment {
            category,
            delta: self.delta,
            reason: self.reason,
            applied_at: self
                .applied_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

pub struct WeightStore {
    pool: SqlitePool,
    current: RwLock<Arc<WeightVector>>,
}

impl WeightStore {
    /// Create tables and load the persisted vector, seeding defaults on
    /// first run. The only blocking I/O outside a learning commit.
    pub async fn open(pool: SqlitePool) -> Result<Self> {
        Self::init_tables(&pool).await?;

        let rows: Vec<WeightRow> =
            sqlx::query_as("SELECT category, weight FROM signal_weights")
                .fetch_all(&pool)
                .await?;

        let mut vector = WeightVector::default();
        if rows.is_empty() {
            let mut conn = pool.acquire().await?;
            persist_weights(&mut conn, &vector).await?;
            tracing::info!("Seeded default signal weights");
        } else {
            for row in rows {
                match SignalCategory::parse(&row.category) {
                    Some(cat) => vector.set(cat, row.weight),
                    None => tracing::warn!("Skipping unknown weight category '{}'", row.category),
                }
            }
        }

        // Version tracks the length of the audit log, so a reloaded
        // store continues the same sequence.
        let (log_len,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM learning_adjustments")
            .fetch_one(&pool)
            .await?;
        vector.version = log_len as u64;

        tracing::info!(
            "Weight store loaded at version {}: {:?}",
            vector.version,
            vector.weights
        );

        Ok(Self {
            pool,
            current: RwLock::new(Arc::new(vector)),
        })
    }

    async fn init_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS signal_weights (
                category TEXT PRIMARY KEY,
                weight REAL NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS learning_adjustments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                delta REAL NOT NULL,
                reason TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Immutable view of the current weights. Concurrent recommendation
    /// calls each hold their own snapshot and never observe a partially
    /// applied learning update.
    pub fn snapshot(&self) -> Arc<WeightVector> {
        self.current.read().expect("weight lock poisoned").clone()
    }

    /// Swap in a new vector. Called by the learning engine after its
    /// transaction has committed; whole-vector swap, never
    /// field-by-field mutation.
    pub fn install(&self, vector: WeightVector) {
        let mut guard = self.current.write().expect("weight lock poisoned");
        tracing::debug!(
            "Installing weight vector version {} (was {})",
            vector.version,
            guard.version
        );
        *guard = Arc::new(vector);
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Read back the audit log, oldest first
    pub async fn adjustment_log(&self, limit: i64) -> Result<Vec<LearningAdjustment>> {
        let rows: Vec<AdjustmentRow> = sqlx::query_as(
            "SELECT category, delta, reason, applied_at
             FROM learning_adjustments
             ORDER BY id ASC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(|r| r.into_adjustment()).collect())
    }
}

/// Append audit rows inside the caller's transaction. Runs before the
/// weight upsert so a commit always carries the log for what it applied.
pub async fn append_adjustments(
    conn: &mut SqliteConnection,
    adjustments: &[LearningAdjustment],
) -> Result<()> {
    for adj in adjustments {
        sqlx::query(
            "INSERT INTO learning_adjustments (category, delta, reason, applied_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(adj.category.as_str())
        .bind(adj.delta)
        .bind(&adj.reason)
        .bind(adj.applied_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Upsert the full vector inside the caller's transaction
pub async fn persist_weights(conn: &mut SqliteConnection, vector: &WeightVector) -> Result<()> {
    for (category, weight) in &vector.weights {
        sqlx::query(
            "INSERT INTO signal_weights (category, weight, updated_at)
             VALUES (?, ?, datetime('now'))
             ON CONFLICT(category) DO UPDATE SET
                 weight = excluded.weight,
                 updated_at = excluded.updated_at",
        )
        .bind(category.as_str())
        .bind(*weight)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Rebuild a vector from a starting point by replaying the ordered
/// adjustment log, clamping after each delta with the same bounds the
/// writer used. Recovery path when the weights table is lost.
pub fn replay(
    start: &WeightVector,
    adjustments: &[LearningAdjustment],
    floor: f64,
    ceiling: f64,
) -> WeightVector {
    let mut vector = start.clone();
    for adj in adjustments {
        let next = (vector.weight_of(adj.category) + adj.delta).clamp(floor, ceiling);
        vector.set(adj.category, next);
    }
    vector.version = start.version + adjustments.len() as u64;
    vector
}
