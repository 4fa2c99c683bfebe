//! Learning Engine
//!
//! Batch pass over labeled watch entries that reinforces or penalizes
//! the weight of every category that contributed to each recommendation.
//! Audit rows are written before the vector inside a single transaction
//! (log-then-apply), entries are marked consumed in the same commit, and
//! the in-memory snapshot is swapped only after the commit succeeds.
//! A failed pass leaves nothing behind and a retry is always safe.

use std::sync::Arc;

use advisor_core::{EngineConfig, LearningAdjustment, WatchEntry, WatchOutcome};
use anyhow::Result;
use chrono::Utc;
use tokio::sync::Mutex;
use weight_store::{append_adjustments, persist_weights, WeightStore};

pub struct LearningEngine {
    config: EngineConfig,
    store: Arc<WeightStore>,
    /// Serializes learning passes; adjustments are not
    /// commutative-safe relative to the audit log
    pass_lock: Mutex<()>,
}

impl LearningEngine {
    pub fn new(store: Arc<WeightStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<WeightStore>, config: EngineConfig) -> Self {
        Self {
            config,
            store,
            pass_lock: Mutex::new(()),
        }
    }

    /// Run one learning pass over labeled entries.
    ///
    /// Per contributing category: `delta = learning_rate * contribution`
    /// for a correct outcome, negated for an incorrect one, with the
    /// result clamped into the configured floor/ceiling. Pending and
    /// already-consumed entries are skipped; expired entries are
    /// consumed without an adjustment since they carry no correctness
    /// signal. Returns the adjustments the pass produced.
    pub async fn learn(&self, entries: &[WatchEntry]) -> Result<Vec<LearningAdjustment>> {
        self.config.validate()?;

        let _pass = self.pass_lock.lock().await;

        let snapshot = self.store.snapshot();
        let mut working = (*snapshot).clone();
        let mut adjustments: Vec<LearningAdjustment> = Vec::new();
        let mut consumed_ids: Vec<i64> = Vec::new();

        for entry in entries {
            if !entry.outcome.is_terminal() {
                tracing::debug!("Entry {} is still pending, skipping", entry.id);
                continue;
            }
            if entry.consumed || self.already_consumed(entry.id).await? {
                tracing::debug!("Entry {} already consumed, skipping", entry.id);
                continue;
            }
            if entry.outcome == WatchOutcome::Expired {
                consumed_ids.push(entry.id);
                continue;
            }

            let reinforcement = match entry.outcome {
                WatchOutcome::Correct => 1.0,
                WatchOutcome::Incorrect => -1.0,
                _ => unreachable!("terminal non-expired outcome"),
            };

            for contribution in &entry.recommendation.reasoning {
                if contribution.contribution == 0.0 {
                    continue;
                }

                let delta = self.config.learning_rate * contribution.contribution * reinforcement;
                let next = (working.weight_of(contribution.category) + delta)
                    .clamp(self.config.weight_floor, self.config.weight_ceiling);
                working.set(contribution.category, next);

                adjustments.push(LearningAdjustment {
                    category: contribution.category,
                    delta,
                    reason: format!(
                        "entry {} ({}) {}",
                        entry.id,
                        entry.symbol,
                        entry.outcome.as_str()
                    ),
                    applied_at: Utc::now(),
                });
            }

            consumed_ids.push(entry.id);
        }

        if consumed_ids.is_empty() {
            tracing::debug!("Learning pass had nothing to consume");
            return Ok(Vec::new());
        }

        working.version = snapshot.version + adjustments.len() as u64;

        // One transaction: audit rows, then the vector, then the
        // consumed markers. All or nothing.
        let mut tx = self.store.pool().begin().await?;
        append_adjustments(&mut tx, &adjustments).await?;
        persist_weights(&mut tx, &working).await?;
        for entry_id in &consumed_ids {
            sqlx::query("UPDATE watch_entries SET consumed = 1 WHERE id = ?")
                .bind(entry_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.store.install(working);

        tracing::info!(
            "Learning pass consumed {} entries, applied {} adjustments",
            consumed_ids.len(),
            adjustments.len()
        );

        Ok(adjustments)
    }

    /// The caller's entry structs may be stale; the stored marker is
    /// authoritative, so a replayed batch can never double-apply.
    async fn already_consumed(&self, entry_id: i64) -> Result<bool> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT consumed FROM watch_entries WHERE id = ?")
                .bind(entry_id)
                .fetch_optional(self.store.pool())
                .await?;
        Ok(matches!(row, Some((true,))))
    }
}
