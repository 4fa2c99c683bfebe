//! Outcome Tracker
//!
//! Records recommendations on a watchlist together with the price at
//! recommendation time, then labels them against later prices. Labeling
//! is directional only; the learning engine needs a correct/incorrect
//! signal, not a profit magnitude.

use advisor_core::{
    AdvisorError, EngineConfig, PerformanceSummary, QuoteProvider, Recommendation,
    SignalContribution, TradeAction, WatchEntry, WatchOutcome,
};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, FromRow)]
struct EntryRow {
    id: i64,
    symbol: String,
    action: String,
    composite_score: f64,
    confidence: f64,
    target_price: f64,
    stop_loss: f64,
    reference_price: f64,
    reasoning: String,
    degenerate: bool,
    recommended_at: String,
    added_at: String,
    last_checked_price: Option<f64>,
    outcome: String,
    consumed: bool,
    labeled_at: Option<String>,
}

impl EntryRow {
    fn into_entry(self) -> Option<WatchEntry> {
        let action = TradeAction::parse(&self.action)?;
        let outcome = WatchOutcome::parse(&self.outcome)?;
        let reasoning: Vec<SignalContribution> =
            serde_json::from_str(&self.reasoning).unwrap_or_default();

        Some(WatchEntry {
            id: self.id,
            symbol: self.symbol.clone(),
            recommendation: Recommendation {
                symbol: self.symbol,
                action,
                composite_score: self.composite_score,
                confidence: self.confidence,
                target_price: self.target_price,
                stop_loss: self.stop_loss,
                reasoning,
                reference_price: self.reference_price,
                degenerate: self.degenerate,
                created_at: self
                    .recommended_at
                    .parse::<DateTime<Utc>>()
                    .unwrap_or_else(|_| Utc::now()),
            },
            added_at: self
                .added_at
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
            last_checked_price: self.last_checked_price,
            outcome,
            consumed: self.consumed,
            labeled_at: self
                .labeled_at
                .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
        })
    }
}

/// Directional labeling rule.
///
/// BUY is correct when the price did not fall below the reference, SELL
/// when it did not rise above it, HOLD when the relative drift stayed
/// below the tolerance.
pub fn label_outcome(
    action: TradeAction,
    reference_price: f64,
    latest_price: f64,
    hold_drift_tolerance: f64,
) -> WatchOutcome {
    let correct = match action {
        TradeAction::Buy => latest_price >= reference_price,
        TradeAction::Sell => latest_price <= reference_price,
        TradeAction::Hold => {
            (latest_price - reference_price).abs() / reference_price < hold_drift_tolerance
        }
    };

    if correct {
        WatchOutcome::Correct
    } else {
        WatchOutcome::Incorrect
    }
}

const SELECT_COLUMNS: &str = "id, symbol, action, composite_score, confidence, target_price, \
     stop_loss, reference_price, reasoning, degenerate, recommended_at, added_at, \
     last_checked_price, outcome, consumed, labeled_at";

pub struct OutcomeTracker {
    pool: SqlitePool,
}

impl OutcomeTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS watch_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                action TEXT NOT NULL,
                composite_score REAL NOT NULL,
                confidence REAL NOT NULL,
                target_price REAL NOT NULL,
                stop_loss REAL NOT NULL,
                reference_price REAL NOT NULL,
                reasoning TEXT NOT NULL,
                degenerate INTEGER NOT NULL DEFAULT 0,
                recommended_at TEXT NOT NULL,
                added_at TEXT NOT NULL,
                last_checked_price REAL,
                outcome TEXT NOT NULL DEFAULT 'PENDING',
                consumed INTEGER NOT NULL DEFAULT 0,
                labeled_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Start tracking a recommendation. The recommendation itself stays
    /// immutable; all outcome state lives on the entry.
    pub async fn track(&self, recommendation: &Recommendation) -> Result<WatchEntry> {
        let added_at = Utc::now();
        let reasoning = serde_json::to_string(&recommendation.reasoning)?;

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO watch_entries (
                symbol, action, composite_score, confidence, target_price,
                stop_loss, reference_price, reasoning, degenerate,
                recommended_at, added_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id",
        )
        .bind(&recommendation.symbol)
        .bind(recommendation.action.as_str())
        .bind(recommendation.composite_score)
        .bind(recommendation.confidence)
        .bind(recommendation.target_price)
        .bind(recommendation.stop_loss)
        .bind(recommendation.reference_price)
        .bind(&reasoning)
        .bind(recommendation.degenerate)
        .bind(recommendation.created_at.to_rfc3339())
        .bind(added_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            "Tracking {} {} at reference {:.2} (entry {})",
            recommendation.action.as_str(),
            recommendation.symbol,
            recommendation.reference_price,
            id
        );

        Ok(WatchEntry {
            id,
            symbol: recommendation.symbol.clone(),
            recommendation: recommendation.clone(),
            added_at,
            last_checked_price: None,
            outcome: WatchOutcome::Pending,
            consumed: false,
            labeled_at: None,
        })
    }

    pub async fn get(&self, entry_id: i64) -> Result<WatchEntry> {
        let row: Option<EntryRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM watch_entries WHERE id = ?"
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        row.and_then(|r| r.into_entry())
            .ok_or_else(|| AdvisorError::EntryNotFound(entry_id).into())
    }

    /// Re-evaluate one entry against the latest price.
    ///
    /// Already-labeled entries are a no-op returning current state:
    /// periodic polling is expected to refresh the same entry many
    /// times. With a usable price the entry is labeled directionally;
    /// with none it expires once the evaluation horizon has passed.
    pub async fn refresh(
        &self,
        entry_id: i64,
        latest_price: Option<f64>,
        config: &EngineConfig,
    ) -> Result<WatchEntry> {
        config.validate()?;

        let entry = self.get(entry_id).await?;
        if entry.outcome.is_terminal() {
            tracing::debug!(
                "Entry {} already labeled {}, refresh is a no-op",
                entry_id,
                entry.outcome.as_str()
            );
            return Ok(entry);
        }

        let price = latest_price.filter(|p| p.is_finite() && *p > 0.0);
        if latest_price.is_some() && price.is_none() {
            tracing::warn!(
                "Ignoring unusable price {:?} for entry {}",
                latest_price,
                entry_id
            );
        }

        match price {
            Some(price) => {
                let outcome = label_outcome(
                    entry.recommendation.action,
                    entry.recommendation.reference_price,
                    price,
                    config.hold_drift_tolerance,
                );
                let labeled_at = Utc::now();

                sqlx::query(
                    "UPDATE watch_entries
                     SET last_checked_price = ?, outcome = ?, labeled_at = ?
                     WHERE id = ?",
                )
                .bind(price)
                .bind(outcome.as_str())
                .bind(labeled_at.to_rfc3339())
                .bind(entry_id)
                .execute(&self.pool)
                .await?;

                tracing::info!(
                    "Entry {} ({} {}): {:.2} -> {:.2}, labeled {}",
                    entry_id,
                    entry.recommendation.action.as_str(),
                    entry.symbol,
                    entry.recommendation.reference_price,
                    price,
                    outcome.as_str()
                );

                Ok(WatchEntry {
                    last_checked_price: Some(price),
                    outcome,
                    labeled_at: Some(labeled_at),
                    ..entry
                })
            }
            None => {
                let horizon = Duration::days(config.evaluation_horizon_days);
                if Utc::now() - entry.added_at >= horizon {
                    let labeled_at = Utc::now();
                    sqlx::query(
                        "UPDATE watch_entries SET outcome = ?, labeled_at = ? WHERE id = ?",
                    )
                    .bind(WatchOutcome::Expired.as_str())
                    .bind(labeled_at.to_rfc3339())
                    .bind(entry_id)
                    .execute(&self.pool)
                    .await?;

                    tracing::info!(
                        "Entry {} ({}) expired without price data",
                        entry_id,
                        entry.symbol
                    );

                    Ok(WatchEntry {
                        outcome: WatchOutcome::Expired,
                        labeled_at: Some(labeled_at),
                        ..entry
                    })
                } else {
                    Ok(entry)
                }
            }
        }
    }

    /// Polling sweep over all pending entries. A provider failure
    /// leaves the entry pending (or expires it past the horizon) and
    /// never aborts the sweep.
    pub async fn refresh_all(
        &self,
        quotes: &dyn QuoteProvider,
        config: &EngineConfig,
    ) -> Result<Vec<WatchEntry>> {
        let pending = self.pending().await?;
        let mut refreshed = Vec::with_capacity(pending.len());

        for entry in pending {
            let price = match quotes.latest_price(&entry.symbol).await {
                Ok(price) => Some(price),
                Err(e) => {
                    tracing::warn!("No quote for {} (entry {}): {}", entry.symbol, entry.id, e);
                    None
                }
            };
            refreshed.push(self.refresh(entry.id, price, config).await?);
        }

        Ok(refreshed)
    }

    pub async fn remove(&self, entry_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM watch_entries WHERE id = ?")
            .bind(entry_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AdvisorError::EntryNotFound(entry_id).into());
        }

        tracing::info!("Removed watch entry {}", entry_id);
        Ok(())
    }

    pub async fn pending(&self) -> Result<Vec<WatchEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM watch_entries
             WHERE outcome = 'PENDING'
             ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(|r| r.into_entry()).collect())
    }

    /// Labeled entries no learning pass has consumed yet, in labeling
    /// order. This is the learning engine's input.
    pub async fn labeled_unconsumed(&self) -> Result<Vec<WatchEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM watch_entries
             WHERE outcome != 'PENDING' AND consumed = 0
             ORDER BY labeled_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(|r| r.into_entry()).collect())
    }

    /// Aggregate track record across every entry ever tracked
    pub async fn performance_summary(&self) -> Result<PerformanceSummary> {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM watch_entries ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        let entries: Vec<WatchEntry> = rows.into_iter().filter_map(|r| r.into_entry()).collect();

        let mut summary = PerformanceSummary {
            total_tracked: entries.len(),
            ..Default::default()
        };

        let mut move_percents = Vec::new();
        for entry in &entries {
            match entry.outcome {
                WatchOutcome::Pending => summary.pending += 1,
                WatchOutcome::Correct => summary.correct += 1,
                WatchOutcome::Incorrect => summary.incorrect += 1,
                WatchOutcome::Expired => summary.expired += 1,
            }
            if let Some(price) = entry.last_checked_price {
                let reference = entry.recommendation.reference_price;
                move_percents.push((price - reference) / reference * 100.0);
            }
        }

        let labeled = summary.correct + summary.incorrect;
        if labeled > 0 {
            summary.success_rate = summary.correct as f64 / labeled as f64;
        }
        if !move_percents.is_empty() {
            summary.avg_move_percent =
                move_percents.iter().sum::<f64>() / move_percents.len() as f64;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_core::SignalCategory;
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::HashMap;

    fn recommendation(symbol: &str, action: TradeAction, reference_price: f64) -> Recommendation {
        Recommendation {
            symbol: symbol.to_string(),
            action,
            composite_score: 0.43,
            confidence: 0.37,
            target_price: reference_price * 1.04,
            stop_loss: reference_price * 0.98,
            reasoning: vec![
                SignalContribution {
                    category: SignalCategory::Technical,
                    contribution: 0.54,
                },
                SignalContribution {
                    category: SignalCategory::Fundamental,
                    contribution: 0.32,
                },
            ],
            reference_price,
            degenerate: false,
            created_at: Utc::now(),
        }
    }

    async fn setup_tracker() -> OutcomeTracker {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory SQLite");
        let tracker = OutcomeTracker::new(pool);
        tracker.init_tables().await.unwrap();
        tracker
    }

    #[test]
    fn test_label_outcome_directional() {
        assert_eq!(
            label_outcome(TradeAction::Buy, 100.0, 101.0, 0.02),
            WatchOutcome::Correct
        );
        assert_eq!(
            label_outcome(TradeAction::Buy, 100.0, 95.0, 0.02),
            WatchOutcome::Incorrect
        );
        assert_eq!(
            label_outcome(TradeAction::Sell, 100.0, 95.0, 0.02),
            WatchOutcome::Correct
        );
        assert_eq!(
            label_outcome(TradeAction::Sell, 100.0, 101.0, 0.02),
            WatchOutcome::Incorrect
        );
        // HOLD tolerates 2% drift
        assert_eq!(
            label_outcome(TradeAction::Hold, 100.0, 101.0, 0.02),
            WatchOutcome::Correct
        );
        assert_eq!(
            label_outcome(TradeAction::Hold, 100.0, 103.0, 0.02),
            WatchOutcome::Incorrect
        );
    }

    #[tokio::test]
    async fn test_track_and_round_trip() {
        let tracker = setup_tracker().await;
        let rec = recommendation("AAPL", TradeAction::Buy, 100.0);

        let entry = tracker.track(&rec).await.unwrap();
        assert_eq!(entry.outcome, WatchOutcome::Pending);
        assert!(!entry.consumed);

        let loaded = tracker.get(entry.id).await.unwrap();
        assert_eq!(loaded.symbol, "AAPL");
        assert_eq!(loaded.recommendation.action, TradeAction::Buy);
        assert_eq!(loaded.recommendation.reasoning.len(), 2);
        assert!((loaded.recommendation.reference_price - 100.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_refresh_labels_buy_incorrect_on_drop() {
        let tracker = setup_tracker().await;
        let entry = tracker
            .track(&recommendation("AAPL", TradeAction::Buy, 100.0))
            .await
            .unwrap();

        let refreshed = tracker
            .refresh(entry.id, Some(95.0), &EngineConfig::default())
            .await
            .unwrap();
        assert_eq!(refreshed.outcome, WatchOutcome::Incorrect);
        assert_eq!(refreshed.last_checked_price, Some(95.0));
        assert!(refreshed.labeled_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_refresh_is_noop() {
        let tracker = setup_tracker().await;
        let entry = tracker
            .track(&recommendation("MSFT", TradeAction::Buy, 100.0))
            .await
            .unwrap();

        let labeled = tracker
            .refresh(entry.id, Some(110.0), &EngineConfig::default())
            .await
            .unwrap();
        assert_eq!(labeled.outcome, WatchOutcome::Correct);

        // A later poll with an opposite move must not relabel
        let again = tracker
            .refresh(entry.id, Some(80.0), &EngineConfig::default())
            .await
            .unwrap();
        assert_eq!(again.outcome, WatchOutcome::Correct);
        assert_eq!(again.last_checked_price, Some(110.0));
    }

    #[tokio::test]
    async fn test_expiry_requires_horizon() {
        let tracker = setup_tracker().await;
        let entry = tracker
            .track(&recommendation("NVDA", TradeAction::Buy, 100.0))
            .await
            .unwrap();

        // Within the horizon, no price: stays pending
        let still_pending = tracker
            .refresh(entry.id, None, &EngineConfig::default())
            .await
            .unwrap();
        assert_eq!(still_pending.outcome, WatchOutcome::Pending);

        // Horizon of zero days has already elapsed
        let zero_horizon = EngineConfig {
            evaluation_horizon_days: 0,
            ..Default::default()
        };
        let expired = tracker.refresh(entry.id, None, &zero_horizon).await.unwrap();
        assert_eq!(expired.outcome, WatchOutcome::Expired);
    }

    #[tokio::test]
    async fn test_remove_and_missing_entry() {
        let tracker = setup_tracker().await;
        let entry = tracker
            .track(&recommendation("TSLA", TradeAction::Sell, 50.0))
            .await
            .unwrap();

        tracker.remove(entry.id).await.unwrap();
        assert!(tracker.get(entry.id).await.is_err());
        assert!(tracker.remove(entry.id).await.is_err());
    }

    struct FixedQuotes {
        prices: HashMap<String, f64>,
    }

    #[async_trait]
    impl QuoteProvider for FixedQuotes {
        async fn latest_price(&self, symbol: &str) -> Result<f64, AdvisorError> {
            self.prices
                .get(symbol)
                .copied()
                .ok_or_else(|| AdvisorError::InvalidData(format!("no quote for {symbol}")))
        }
    }

    #[tokio::test]
    async fn test_refresh_all_sweeps_pending() {
        let tracker = setup_tracker().await;
        tracker
            .track(&recommendation("AAPL", TradeAction::Buy, 100.0))
            .await
            .unwrap();
        tracker
            .track(&recommendation("MSFT", TradeAction::Sell, 200.0))
            .await
            .unwrap();
        tracker
            .track(&recommendation("NOQUOTE", TradeAction::Buy, 10.0))
            .await
            .unwrap();

        let quotes = FixedQuotes {
            prices: HashMap::from([("AAPL".to_string(), 104.0), ("MSFT".to_string(), 190.0)]),
        };

        let refreshed = tracker
            .refresh_all(&quotes, &EngineConfig::default())
            .await
            .unwrap();
        assert_eq!(refreshed.len(), 3);

        let outcomes: HashMap<String, WatchOutcome> = refreshed
            .into_iter()
            .map(|e| (e.symbol.clone(), e.outcome))
            .collect();
        assert_eq!(outcomes["AAPL"], WatchOutcome::Correct);
        assert_eq!(outcomes["MSFT"], WatchOutcome::Correct);
        // Quote failure inside the horizon leaves the entry pending
        assert_eq!(outcomes["NOQUOTE"], WatchOutcome::Pending);
    }

    #[tokio::test]
    async fn test_labeled_unconsumed_ordering() {
        let tracker = setup_tracker().await;
        let first = tracker
            .track(&recommendation("A", TradeAction::Buy, 100.0))
            .await
            .unwrap();
        let second = tracker
            .track(&recommendation("B", TradeAction::Buy, 100.0))
            .await
            .unwrap();

        tracker
            .refresh(first.id, Some(105.0), &EngineConfig::default())
            .await
            .unwrap();
        tracker
            .refresh(second.id, Some(95.0), &EngineConfig::default())
            .await
            .unwrap();

        let unconsumed = tracker.labeled_unconsumed().await.unwrap();
        assert_eq!(unconsumed.len(), 2);
        assert_eq!(unconsumed[0].id, first.id);
        assert_eq!(unconsumed[1].id, second.id);
    }

    #[tokio::test]
    async fn test_performance_summary() {
        let tracker = setup_tracker().await;
        let a = tracker
            .track(&recommendation("A", TradeAction::Buy, 100.0))
            .await
            .unwrap();
        let b = tracker
            .track(&recommendation("B", TradeAction::Buy, 100.0))
            .await
            .unwrap();
        tracker
            .track(&recommendation("C", TradeAction::Hold, 100.0))
            .await
            .unwrap();

        let cfg = EngineConfig::default();
        tracker.refresh(a.id, Some(110.0), &cfg).await.unwrap();
        tracker.refresh(b.id, Some(90.0), &cfg).await.unwrap();

        let summary = tracker.performance_summary().await.unwrap();
        assert_eq!(summary.total_tracked, 3);
        assert_eq!(summary.correct, 1);
        assert_eq!(summary.incorrect, 1);
        assert_eq!(summary.pending, 1);
        assert!((summary.success_rate - 0.5).abs() < 1e-12);
        // (+10% and -10%) average to zero
        assert!(summary.avg_move_percent.abs() < 1e-9);
    }
}
