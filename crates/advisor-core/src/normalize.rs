//! Signal normalization.
//!
//! Upstream analyzers score on their own native scales; everything the
//! engine consumes goes through here first so the weighted sum always
//! operates on one signed scale. Out-of-range values are clamped rather
//! than rejected: upstream scoring is noisy and a recommendation batch
//! should not fall over because one analyzer overshot its range.

use crate::types::{ScaleHint, Signal, SignalCategory};

/// Map a raw analyzer score onto the engine scale [-1, 1].
///
/// `UnitInterval` scores are clamped to [0, 1] and recentered so that
/// 0.5 is neutral. `SignedUnit` scores pass through; sentiment polarity
/// already arrives on the engine scale. Non-finite input degrades to a
/// neutral, zero-confidence signal instead of poisoning the composite.
pub fn normalize(
    category: SignalCategory,
    raw_value: f64,
    hint: ScaleHint,
    source_confidence: f64,
) -> Signal {
    if !raw_value.is_finite() {
        return neutral(category);
    }

    let normalized = match hint {
        ScaleHint::SignedUnit => raw_value,
        ScaleHint::UnitInterval => 2.0 * raw_value.clamp(0.0, 1.0) - 1.0,
    }
    .clamp(-1.0, 1.0);

    let confidence = if source_confidence.is_finite() {
        source_confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };

    Signal {
        category,
        raw_value,
        normalized_value: normalized,
        source_confidence: confidence,
    }
}

/// A neutral, non-informative signal for a category with no data.
/// Zero confidence means it contributes nothing to the weighted sum,
/// which keeps the formula total regardless of which categories the
/// caller could actually source.
pub fn neutral(category: SignalCategory) -> Signal {
    Signal {
        category,
        raw_value: 0.0,
        normalized_value: 0.0,
        source_confidence: 0.0,
    }
}

/// Stand-in for sentiment when no news or polarity data was available
pub fn missing_sentiment() -> Signal {
    neutral(SignalCategory::Sentiment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_unit_passes_through() {
        let s = normalize(SignalCategory::Sentiment, -0.4, ScaleHint::SignedUnit, 0.7);
        assert_eq!(s.normalized_value, -0.4);
        assert_eq!(s.source_confidence, 0.7);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let s = normalize(SignalCategory::Technical, 1.8, ScaleHint::SignedUnit, 0.9);
        assert_eq!(s.normalized_value, 1.0);

        let s = normalize(SignalCategory::Fundamental, -0.2, ScaleHint::UnitInterval, 0.9);
        assert_eq!(s.normalized_value, -1.0);
    }

    #[test]
    fn test_unit_interval_recenters() {
        let s = normalize(SignalCategory::Fundamental, 0.75, ScaleHint::UnitInterval, 1.0);
        assert!((s.normalized_value - 0.5).abs() < 1e-12);

        let s = normalize(SignalCategory::Fundamental, 0.5, ScaleHint::UnitInterval, 1.0);
        assert!(s.normalized_value.abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_degrades_to_neutral() {
        let s = normalize(SignalCategory::Technical, f64::NAN, ScaleHint::SignedUnit, 0.9);
        assert_eq!(s.normalized_value, 0.0);
        assert_eq!(s.source_confidence, 0.0);
    }

    #[test]
    fn test_missing_sentiment_is_non_informative() {
        let s = missing_sentiment();
        assert_eq!(s.category, SignalCategory::Sentiment);
        assert_eq!(s.normalized_value, 0.0);
        assert_eq!(s.source_confidence, 0.0);
    }

    #[test]
    fn test_confidence_clamped() {
        let s = normalize(SignalCategory::Technical, 0.2, ScaleHint::SignedUnit, 1.4);
        assert_eq!(s.source_confidence, 1.0);
    }
}
