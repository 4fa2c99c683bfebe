use async_trait::async_trait;

use crate::{AdvisorError, ScaleHint, SignalCategory};

/// Raw category score as produced by an upstream analyzer, before
/// normalization onto the engine scale.
#[derive(Debug, Clone, Copy)]
pub struct RawScore {
    pub value: f64,
    pub hint: ScaleHint,
    pub confidence: f64,
}

/// Market data collaborator
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn latest_price(&self, symbol: &str) -> Result<f64, AdvisorError>;
}

/// One upstream analyzer (technical, fundamental, or sentiment)
#[async_trait]
pub trait SignalSource: Send + Sync {
    fn category(&self) -> SignalCategory;
    async fn score(&self, symbol: &str) -> Result<RawScore, AdvisorError>;
}
