use async_trait::async_trait;

use crate::errors::SourceError;
use crate::models::{DateRange, NewsBatch};

/// A provider of per-symbol news over a date range.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_news(&self, symbol: &str, range: &DateRange) -> Result<NewsBatch, SourceError>;

    fn name(&self) -> &str;
}
