//! Recommendation Engine
//!
//! Combines normalized per-category signals with the current weight
//! vector into a composite score, a discrete action, a confidence value
//! and target/stop prices. Reads weights through one snapshot per call;
//! never writes them.

use std::collections::HashMap;
use std::sync::Arc;

use advisor_core::{
    normalize, AdvisorError, EngineConfig, Recommendation, Signal, SignalCategory,
    SignalContribution, SignalSource, TradeAction, WeightVector,
};
use chrono::Utc;
use weight_store::WeightStore;

/// Result of the weighted combination step
#[derive(Debug, Clone)]
pub struct ScoredSignals {
    /// Weighted composite on [-1, 1]
    pub composite: f64,
    /// Per-category contributions, strongest first
    pub contributions: Vec<SignalContribution>,
    /// Mean source confidence over contributing signals
    pub mean_confidence: f64,
}

/// Combine signals into a composite score.
///
/// `contribution = weight * normalized_value * source_confidence`, and
/// the sum is divided by the weight of the categories actually present,
/// so the score stays comparable when a category is unavailable.
/// Fails with `InsufficientSignals` when nothing can contribute: an
/// empty set, or every present category carrying zero weight.
pub fn score_signals(
    signals: &[Signal],
    weights: &WeightVector,
) -> Result<ScoredSignals, AdvisorError> {
    let mut by_category: HashMap<SignalCategory, Signal> = HashMap::new();
    for signal in signals {
        if by_category.insert(signal.category, *signal).is_some() {
            tracing::debug!(
                "Duplicate {} signal in one evaluation, keeping the later one",
                signal.category.as_str()
            );
        }
    }

    if by_category.is_empty() {
        return Err(AdvisorError::InsufficientSignals);
    }

    let weight_total: f64 = by_category
        .keys()
        .map(|cat| weights.weight_of(*cat))
        .sum();
    if weight_total <= 0.0 {
        return Err(AdvisorError::InsufficientSignals);
    }

    let mut contributions: Vec<SignalContribution> = by_category
        .values()
        .map(|s| SignalContribution {
            category: s.category,
            contribution: weights.weight_of(s.category) * s.normalized_value * s.source_confidence,
        })
        .collect();
    contributions.sort_by(|a, b| {
        b.contribution
            .abs()
            .partial_cmp(&a.contribution.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let composite = contributions.iter().map(|c| c.contribution).sum::<f64>() / weight_total;
    let mean_confidence = by_category
        .values()
        .map(|s| s.source_confidence)
        .sum::<f64>()
        / by_category.len() as f64;

    Ok(ScoredSignals {
        composite,
        contributions,
        mean_confidence,
    })
}

/// Pure evaluation against an explicit weight snapshot.
///
/// An empty or zero-weight signal set degrades to a neutral HOLD with
/// zero confidence and the `degenerate` flag set, so a caller looping
/// over a batch of symbols never unwinds on one bad input.
pub fn evaluate(
    config: &EngineConfig,
    symbol: &str,
    signals: &[Signal],
    current_price: f64,
    weights: &WeightVector,
) -> Result<Recommendation, AdvisorError> {
    config.validate()?;

    if !(current_price.is_finite() && current_price > 0.0) {
        return Err(AdvisorError::InvalidData(format!(
            "current price for {} must be positive, got {}",
            symbol, current_price
        )));
    }

    let scored = match score_signals(signals, weights) {
        Ok(scored) => scored,
        Err(AdvisorError::InsufficientSignals) => {
            tracing::warn!("No usable signals for {}, degrading to neutral HOLD", symbol);
            return Ok(Recommendation {
                symbol: symbol.to_string(),
                action: TradeAction::Hold,
                composite_score: 0.0,
                confidence: 0.0,
                target_price: current_price,
                stop_loss: current_price,
                reasoning: Vec::new(),
                reference_price: current_price,
                degenerate: true,
                created_at: Utc::now(),
            });
        }
        Err(e) => return Err(e),
    };

    let action = if scored.composite >= config.buy_threshold {
        TradeAction::Buy
    } else if scored.composite <= config.sell_threshold {
        TradeAction::Sell
    } else {
        TradeAction::Hold
    };

    let confidence = (scored.composite.abs() * scored.mean_confidence).clamp(0.0, 1.0);
    let target_price = current_price * (1.0 + config.k_target * scored.composite);
    let stop_loss = current_price * (1.0 - config.k_stop * scored.composite.abs());

    tracing::info!(
        "{}: composite {:.3} -> {} (confidence {:.3}, target {:.2}, stop {:.2})",
        symbol,
        scored.composite,
        action.as_str(),
        confidence,
        target_price,
        stop_loss
    );

    Ok(Recommendation {
        symbol: symbol.to_string(),
        action,
        composite_score: scored.composite,
        confidence,
        target_price,
        stop_loss,
        reasoning: scored.contributions,
        reference_price: current_price,
        degenerate: false,
        created_at: Utc::now(),
    })
}

pub struct RecommendationEngine {
    config: EngineConfig,
    weights: Arc<WeightStore>,
}

impl RecommendationEngine {
    pub fn new(weights: Arc<WeightStore>) -> Self {
        Self::with_config(weights, EngineConfig::default())
    }

    pub fn with_config(weights: Arc<WeightStore>, config: EngineConfig) -> Self {
        Self { config, weights }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate one symbol against the current weight snapshot
    pub fn recommend(
        &self,
        symbol: &str,
        signals: &[Signal],
        current_price: f64,
    ) -> Result<Recommendation, AdvisorError> {
        let snapshot = self.weights.snapshot();
        evaluate(&self.config, symbol, signals, current_price, &snapshot)
    }
}

/// Pull one normalized signal from each upstream analyzer. A source
/// that fails yields a neutral, zero-confidence signal for its category
/// so the weighted-sum formula stays total.
pub async fn collect_signals(sources: &[Arc<dyn SignalSource>], symbol: &str) -> Vec<Signal> {
    let mut signals = Vec::with_capacity(sources.len());
    for source in sources {
        let category = source.category();
        match source.score(symbol).await {
            Ok(raw) => signals.push(normalize::normalize(
                category,
                raw.value,
                raw.hint,
                raw.confidence,
            )),
            Err(e) => {
                tracing::warn!(
                    "{} source failed for {}: {}, substituting neutral",
                    category.as_str(),
                    symbol,
                    e
                );
                signals.push(normalize::neutral(category));
            }
        }
    }
    signals
}
