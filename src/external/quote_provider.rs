use async_trait::async_trait;

use crate::errors::SourceError;
use crate::models::StockSnapshot;

/// Looks up company name and price movement for a symbol.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch_snapshot(&self, symbol: &str) -> Result<StockSnapshot, SourceError>;
}
