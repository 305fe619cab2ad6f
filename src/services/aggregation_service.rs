use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::models::{DateRange, SymbolNewsResult};
use crate::services::news_service::NewsFetcher;

/// Per-symbol fetch results in the caller's symbol order.
#[derive(Debug, Clone, Default)]
pub struct AggregatedNews {
    pub results: Vec<SymbolNewsResult>,
    pub deadline_exceeded: bool,
}

impl AggregatedNews {
    pub fn get(&self, symbol: &str) -> Option<&SymbolNewsResult> {
        self.results.iter().find(|r| r.symbol == symbol)
    }

    pub fn total_items(&self) -> usize {
        self.results.iter().map(|r| r.items.len()).sum()
    }
}

/// Runs the fetcher over every symbol with bounded concurrency.
///
/// One symbol's failure (including a panic on its fetch path) becomes a
/// failed result for that symbol only; the rest of the batch is unaffected.
pub struct AggregationStage {
    fetcher: Arc<NewsFetcher>,
    concurrency: usize,
}

impl AggregationStage {
    pub fn new(fetcher: Arc<NewsFetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch every symbol. Work still pending at `deadline` is abandoned and
    /// reported as failed so that a partial digest can still go out.
    pub async fn aggregate(&self, symbols: &[String], range: &DateRange, deadline: Instant) -> AggregatedNews {
        info!("📰 Fetching news for {} symbols", symbols.len());

        let mut slots: Vec<Option<SymbolNewsResult>> = symbols.iter().map(|_| None).collect();

        let range = *range;
        let mut pending = futures::stream::iter(symbols.iter().cloned().enumerate())
            .map(|(idx, symbol)| {
                let fetcher = self.fetcher.clone();
                async move {
                    let outcome = AssertUnwindSafe(fetcher.fetch(&symbol, &range))
                        .catch_unwind()
                        .await;
                    let result = outcome.unwrap_or_else(|panic| {
                        let message = panic_message(panic.as_ref());
                        error!("❌ Fetch for {} aborted unexpectedly: {}", symbol, message);
                        SymbolNewsResult::failed(&symbol, format!("internal error: {}", message))
                    });
                    (idx, result)
                }
            })
            .buffer_unordered(self.concurrency);

        let mut deadline_exceeded = false;
        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((idx, result))) => slots[idx] = Some(result),
                Ok(None) => break,
                Err(_) => {
                    deadline_exceeded = true;
                    break;
                }
            }
        }
        drop(pending);

        let results: Vec<SymbolNewsResult> = symbols
            .iter()
            .zip(slots)
            .map(|(symbol, slot)| {
                slot.unwrap_or_else(|| {
                    warn!("Run deadline reached before {} was fetched", symbol);
                    SymbolNewsResult::failed(symbol, "run deadline exceeded")
                })
            })
            .collect();

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(
            "News aggregation completed: {} succeeded, {} failed",
            results.len() - failed,
            failed
        );

        AggregatedNews {
            results,
            deadline_exceeded,
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceError;
    use crate::external::news_provider::NewsSource;
    use crate::models::{FetchStatus, NewsBatch, NewsItem, SourceUsed};
    use crate::services::news_service::RetryPolicy;
    use crate::services::rate_limiter::RateLimiter;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use std::time::Duration;

    /// Behaviour depends on the symbol being fetched.
    struct KeyedSource;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[async_trait]
    impl NewsSource for KeyedSource {
        async fn fetch_news(&self, symbol: &str, _range: &DateRange) -> Result<NewsBatch, SourceError> {
            match symbol {
                "BOOM" => panic!("parser blew up on {}", symbol),
                "SLOW" => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(NewsBatch::NoNews)
                }
                "QUIET" => Ok(NewsBatch::NoNews),
                _ => {
                    let delay = symbol.len() as u64;
                    tokio::time::sleep(Duration::from_millis(100 / delay)).await;
                    Ok(NewsBatch::Articles(vec![NewsItem {
                        title: format!("{} headline", symbol),
                        source: "Reuters".into(),
                        published_at: fixed_now() - ChronoDuration::hours(1),
                        summary: None,
                        url: format!("https://example.com/{}", symbol),
                    }]))
                }
            }
        }

        fn name(&self) -> &str {
            "keyed"
        }
    }

    fn stage(request_timeout: Duration) -> AggregationStage {
        let fetcher = NewsFetcher::new(
            Arc::new(KeyedSource),
            Arc::new(KeyedSource),
            Arc::new(RateLimiter::per_minute(600)),
            RetryPolicy { max_retries: 1, base_delay: Duration::from_millis(10) },
            request_timeout,
            20,
        );
        AggregationStage::new(Arc::new(fetcher), 3)
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(3600)
    }

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let range = DateRange::lookback(fixed_now(), 1);
        let input = symbols(&["A", "BB", "CCC", "QUIET", "DDDD"]);

        let news = stage(Duration::from_secs(5)).aggregate(&input, &range, far_deadline()).await;

        let order: Vec<&str> = news.results.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(order, vec!["A", "BB", "CCC", "QUIET", "DDDD"]);
        assert!(!news.deadline_exceeded);
        assert_eq!(news.total_items(), 4);
    }

    #[tokio::test]
    async fn test_panicking_symbol_is_isolated() {
        let range = DateRange::lookback(fixed_now(), 1);
        let stage = stage(Duration::from_secs(5));

        let with_boom = stage
            .aggregate(&symbols(&["AAPL", "BOOM", "QUIET", "MSFT"]), &range, far_deadline())
            .await;
        let without_boom = stage
            .aggregate(&symbols(&["AAPL", "QUIET", "MSFT"]), &range, far_deadline())
            .await;

        let boom = with_boom.get("BOOM").unwrap();
        assert_eq!(boom.fetch_status, FetchStatus::Failed);
        assert!(boom.error.as_ref().unwrap().contains("parser blew up"));

        let others: Vec<&SymbolNewsResult> =
            with_boom.results.iter().filter(|r| r.symbol != "BOOM").collect();
        let baseline: Vec<&SymbolNewsResult> = without_boom.results.iter().collect();
        assert_eq!(others, baseline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_abandons_stragglers() {
        let range = DateRange::lookback(fixed_now(), 1);
        let input = symbols(&["AAPL", "SLOW", "MSFT"]);
        let deadline = Instant::now() + Duration::from_secs(10);

        let news = stage(Duration::from_secs(7200)).aggregate(&input, &range, deadline).await;

        assert!(news.deadline_exceeded);
        assert_eq!(news.results.len(), 3);
        assert_eq!(news.get("AAPL").unwrap().source_used, SourceUsed::Primary);
        assert_eq!(news.get("MSFT").unwrap().fetch_status, FetchStatus::Success);
        let slow = news.get("SLOW").unwrap();
        assert_eq!(slow.fetch_status, FetchStatus::Failed);
        assert_eq!(slow.error.as_deref(), Some("run deadline exceeded"));
    }
}
