use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Analysis category a signal originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalCategory {
    Technical,
    Fundamental,
    Sentiment,
}

impl SignalCategory {
    pub const ALL: [SignalCategory; 3] = [
        SignalCategory::Technical,
        SignalCategory::Fundamental,
        SignalCategory::Sentiment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCategory::Technical => "technical",
            SignalCategory::Fundamental => "fundamental",
            SignalCategory::Sentiment => "sentiment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "technical" => Some(SignalCategory::Technical),
            "fundamental" => Some(SignalCategory::Fundamental),
            "sentiment" => Some(SignalCategory::Sentiment),
            _ => None,
        }
    }
}

/// Native scale a raw score arrives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleHint {
    /// Already on the engine scale, [-1, 1]
    SignedUnit,
    /// Upstream scored on [0, 1]
    UnitInterval,
}

/// A normalized per-category score for one evaluation.
/// Produced fresh by the normalizer; never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Signal {
    pub category: SignalCategory,
    pub raw_value: f64,
    /// On the engine scale, [-1, 1]
    pub normalized_value: f64,
    /// How much the upstream analyzer trusts its own score, [0, 1]
    pub source_confidence: f64,
}

/// Discrete recommendation action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
            TradeAction::Hold => "HOLD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(TradeAction::Buy),
            "SELL" => Some(TradeAction::Sell),
            "HOLD" => Some(TradeAction::Hold),
            _ => None,
        }
    }
}

/// How much one category moved the composite score
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignalContribution {
    pub category: SignalCategory,
    pub contribution: f64,
}

/// A complete recommendation for one symbol.
/// Immutable once created; outcome labeling happens on the owning
/// watch entry, never here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub action: TradeAction,
    pub composite_score: f64,
    pub confidence: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    /// Per-category contributions, strongest first
    pub reasoning: Vec<SignalContribution>,
    /// Price at recommendation time
    pub reference_price: f64,
    /// Set when no usable signal existed and the engine degraded to a
    /// neutral HOLD instead of failing the caller's batch
    #[serde(default)]
    pub degenerate: bool,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a tracked recommendation.
/// Pending is the initial state; the other three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchOutcome {
    Pending,
    Correct,
    Incorrect,
    Expired,
}

impl WatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchOutcome::Pending => "PENDING",
            WatchOutcome::Correct => "CORRECT",
            WatchOutcome::Incorrect => "INCORRECT",
            WatchOutcome::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(WatchOutcome::Pending),
            "CORRECT" => Some(WatchOutcome::Correct),
            "INCORRECT" => Some(WatchOutcome::Incorrect),
            "EXPIRED" => Some(WatchOutcome::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WatchOutcome::Pending)
    }
}

/// A recommendation under outcome tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEntry {
    pub id: i64,
    pub symbol: String,
    pub recommendation: Recommendation,
    pub added_at: DateTime<Utc>,
    pub last_checked_price: Option<f64>,
    pub outcome: WatchOutcome,
    /// Whether a learning pass has already consumed this entry
    pub consumed: bool,
    pub labeled_at: Option<DateTime<Utc>>,
}

/// Current per-category weights, versioned so readers can tell one
/// committed state from the next. Weights need not sum to 1; the
/// engine normalizes at use time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub weights: HashMap<SignalCategory, f64>,
    pub version: u64,
}

impl Default for WeightVector {
    fn default() -> Self {
        let weights = SignalCategory::ALL.iter().map(|c| (*c, 1.0)).collect();
        Self { weights, version: 0 }
    }
}

impl WeightVector {
    /// Weight for a category; unknown categories weigh 0
    pub fn weight_of(&self, category: SignalCategory) -> f64 {
        self.weights.get(&category).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, category: SignalCategory, weight: f64) {
        self.weights.insert(category, weight);
    }
}

/// Audit record of one weight mutation; append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningAdjustment {
    pub category: SignalCategory,
    pub delta: f64,
    pub reason: String,
    pub applied_at: DateTime<Utc>,
}

/// Aggregate track record across labeled watch entries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_tracked: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub expired: usize,
    pub pending: usize,
    /// correct / (correct + incorrect), 0 when nothing is labeled
    pub success_rate: f64,
    /// Mean percent move from reference price over checked entries
    pub avg_move_percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for cat in SignalCategory::ALL {
            assert_eq!(SignalCategory::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(SignalCategory::parse("quant"), None);
    }

    #[test]
    fn test_outcome_terminality() {
        assert!(!WatchOutcome::Pending.is_terminal());
        assert!(WatchOutcome::Correct.is_terminal());
        assert!(WatchOutcome::Incorrect.is_terminal());
        assert!(WatchOutcome::Expired.is_terminal());
    }

    #[test]
    fn test_default_weights_are_unit() {
        let v = WeightVector::default();
        assert_eq!(v.version, 0);
        for cat in SignalCategory::ALL {
            assert_eq!(v.weight_of(cat), 1.0);
        }
    }
}
