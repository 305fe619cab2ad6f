use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::DigestConfig;
use crate::errors::SourceError;
use crate::external::news_provider::NewsSource;
use crate::models::news::normalize_items;
use crate::models::{DateRange, NewsBatch, SourceUsed, SymbolNewsResult};
use crate::services::rate_limiter::RateLimiter;

static SYMBOL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\^?[A-Z0-9][A-Z0-9.\-=]{0,14}$").expect("symbol pattern is valid")
});

pub fn is_valid_symbol(symbol: &str) -> bool {
    SYMBOL_PATTERN.is_match(symbol)
}

/// Retry settings for the primary source.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff with up to 25% jitter: base, 2x base, 4x base...
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1));
        let jitter_ms = (exp.as_millis() as u64) / 4;
        let jitter = if jitter_ms > 0 {
            rand::rng().random_range(0..=jitter_ms)
        } else {
            0
        };
        exp + Duration::from_millis(jitter)
    }
}

/// Per-symbol fetch state. Terminal state is `Done`.
#[derive(Debug)]
enum FetchState {
    NotFetched,
    FetchingPrimary { attempt: u32 },
    /// `primary_error` is `None` when the primary answered but had nothing usable.
    FallbackPending { primary_error: Option<SourceError> },
    FetchingFallback { primary_error: Option<SourceError> },
    Done(SymbolNewsResult),
}

/// Fetches one symbol's news, applying the primary -> fallback policy.
pub struct NewsFetcher {
    primary: Arc<dyn NewsSource>,
    fallback: Arc<dyn NewsSource>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    request_timeout: Duration,
    news_cap: usize,
}

impl NewsFetcher {
    pub fn new(
        primary: Arc<dyn NewsSource>,
        fallback: Arc<dyn NewsSource>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        request_timeout: Duration,
        news_cap: usize,
    ) -> Self {
        Self {
            primary,
            fallback,
            limiter,
            retry,
            request_timeout,
            news_cap,
        }
    }

    pub fn from_config(
        config: &DigestConfig,
        primary: Arc<dyn NewsSource>,
        fallback: Arc<dyn NewsSource>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self::new(
            primary,
            fallback,
            limiter,
            RetryPolicy {
                max_retries: config.primary_max_retries,
                base_delay: config.retry_base_delay,
            },
            config.request_timeout,
            config.news_cap,
        )
    }

    /// Fetch news for `symbol` over `range`. Every path ends in a result;
    /// source failures are reported through `fetch_status`, never raised.
    pub async fn fetch(&self, symbol: &str, range: &DateRange) -> SymbolNewsResult {
        let mut state = FetchState::NotFetched;

        loop {
            state = match state {
                FetchState::NotFetched => {
                    if is_valid_symbol(symbol) {
                        FetchState::FetchingPrimary { attempt: 1 }
                    } else {
                        warn!("Symbol {:?} is malformed, skipping primary source", symbol);
                        FetchState::FallbackPending {
                            primary_error: Some(SourceError::MalformedSymbol(symbol.to_string())),
                        }
                    }
                }
                FetchState::FetchingPrimary { attempt } => self.primary_step(symbol, range, attempt).await,
                FetchState::FallbackPending { primary_error } => {
                    match &primary_error {
                        Some(e) => info!("⚠️ Primary failed for {} ({}), trying fallback", symbol, e),
                        None => info!("Primary had no usable news for {}, trying fallback", symbol),
                    }
                    FetchState::FetchingFallback { primary_error }
                }
                FetchState::FetchingFallback { primary_error } => {
                    self.fallback_step(symbol, range, primary_error).await
                }
                FetchState::Done(result) => return result,
            };
        }
    }

    async fn primary_step(&self, symbol: &str, range: &DateRange, attempt: u32) -> FetchState {
        self.limiter.acquire().await;
        debug!(
            "{} attempt {} for {} ({} calls left in window)",
            self.primary.name(),
            attempt,
            symbol,
            self.limiter.available_slots()
        );

        match self.call(self.primary.fetch_news(symbol, range)).await {
            Ok(NewsBatch::NoNews) => {
                info!("✓ {} reports no news for {}", self.primary.name(), symbol);
                FetchState::Done(SymbolNewsResult::success(symbol, Vec::new(), SourceUsed::Primary))
            }
            Ok(NewsBatch::Articles(items)) => {
                let items = normalize_items(items, range, self.news_cap);
                if items.is_empty() {
                    FetchState::FallbackPending { primary_error: None }
                } else {
                    info!("✓ Fetched {} articles for {} from {}", items.len(), symbol, self.primary.name());
                    FetchState::Done(SymbolNewsResult::success(symbol, items, SourceUsed::Primary))
                }
            }
            Err(e) if e.is_retryable() && attempt <= self.retry.max_retries => {
                let delay = self.retry.backoff(attempt);
                warn!(
                    "Primary attempt {}/{} for {} failed: {}. Retrying in {:?}...",
                    attempt,
                    self.retry.max_retries + 1,
                    symbol,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                FetchState::FetchingPrimary { attempt: attempt + 1 }
            }
            Err(e) => FetchState::FallbackPending { primary_error: Some(e) },
        }
    }

    async fn fallback_step(
        &self,
        symbol: &str,
        range: &DateRange,
        primary_error: Option<SourceError>,
    ) -> FetchState {
        let result = match self.call(self.fallback.fetch_news(symbol, range)).await {
            Ok(NewsBatch::NoNews) => {
                SymbolNewsResult::success(symbol, Vec::new(), SourceUsed::Fallback)
            }
            Ok(NewsBatch::Articles(items)) => {
                let items = normalize_items(items, range, self.news_cap);
                info!("✓ Fetched {} articles for {} from {}", items.len(), symbol, self.fallback.name());
                SymbolNewsResult::success(symbol, items, SourceUsed::Fallback)
            }
            Err(fallback_error) => match primary_error {
                Some(primary_error) => {
                    warn!("❌ Both sources failed for {}", symbol);
                    SymbolNewsResult::failed(
                        symbol,
                        format!("primary: {}; fallback: {}", primary_error, fallback_error),
                    )
                }
                None => {
                    // The primary was reached and had nothing; not a failed fetch.
                    debug!("Fallback failed for {} after empty primary: {}", symbol, fallback_error);
                    SymbolNewsResult::success(symbol, Vec::new(), SourceUsed::Primary)
                }
            },
        };
        FetchState::Done(result)
    }

    async fn call<F>(&self, request: F) -> Result<NewsBatch, SourceError>
    where
        F: Future<Output = Result<NewsBatch, SourceError>>,
    {
        tokio::time::timeout(self.request_timeout, request)
            .await
            .unwrap_or(Err(SourceError::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FetchStatus, NewsItem};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    enum Step {
        Reply(Result<NewsBatch, SourceError>),
        Hang,
    }

    /// Source that replays a fixed script and counts calls.
    struct ScriptedSource {
        name: &'static str,
        script: Mutex<VecDeque<Step>>,
        calls: Mutex<usize>,
    }

    impl ScriptedSource {
        fn new(name: &'static str, steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                name,
                script: Mutex::new(steps.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl NewsSource for ScriptedSource {
        async fn fetch_news(&self, _symbol: &str, _range: &DateRange) -> Result<NewsBatch, SourceError> {
            *self.calls.lock() += 1;
            let step = self.script.lock().pop_front();
            match step {
                Some(Step::Reply(reply)) => reply,
                Some(Step::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(NewsBatch::NoNews)
                }
                None => panic!("{} called more times than scripted", self.name),
            }
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn range() -> DateRange {
        DateRange::lookback(now(), 1)
    }

    fn items(n: usize) -> Vec<NewsItem> {
        (0..n)
            .map(|i| NewsItem {
                title: format!("headline {}", i),
                source: "Reuters".to_string(),
                published_at: now() - ChronoDuration::minutes(i as i64 + 1),
                summary: None,
                url: format!("https://example.com/{}", i),
            })
            .collect()
    }

    fn fetcher(primary: Arc<ScriptedSource>, fallback: Arc<ScriptedSource>) -> NewsFetcher {
        NewsFetcher::new(
            primary,
            fallback,
            Arc::new(RateLimiter::per_minute(60)),
            RetryPolicy { max_retries: 1, base_delay: Duration::from_millis(100) },
            Duration::from_secs(5),
            20,
        )
    }

    #[tokio::test]
    async fn test_primary_articles_are_used() {
        let primary = ScriptedSource::new("primary", vec![Step::Reply(Ok(NewsBatch::Articles(items(3))))]);
        let fallback = ScriptedSource::new("fallback", vec![]);

        let result = fetcher(primary.clone(), fallback.clone()).fetch("NVDA", &range()).await;

        assert_eq!(result.fetch_status, FetchStatus::Success);
        assert_eq!(result.source_used, SourceUsed::Primary);
        assert_eq!(result.items.len(), 3);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_explicit_no_news_skips_fallback() {
        let primary = ScriptedSource::new("primary", vec![Step::Reply(Ok(NewsBatch::NoNews))]);
        let fallback = ScriptedSource::new("fallback", vec![]);

        let result = fetcher(primary, fallback.clone()).fetch("AMD", &range()).await;

        assert_eq!(result.fetch_status, FetchStatus::Success);
        assert_eq!(result.source_used, SourceUsed::Primary);
        assert!(result.items.is_empty());
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_primary_falls_back() {
        let primary = ScriptedSource::new("primary", vec![Step::Reply(Ok(NewsBatch::Articles(vec![])))]);
        let fallback = ScriptedSource::new("fallback", vec![Step::Reply(Ok(NewsBatch::Articles(items(2))))]);

        let result = fetcher(primary, fallback.clone()).fetch("TSLA", &range()).await;

        assert_eq!(result.source_used, SourceUsed::Fallback);
        assert_eq!(result.items.len(), 2);
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn test_both_empty_is_success_not_failure() {
        let primary = ScriptedSource::new("primary", vec![Step::Reply(Ok(NewsBatch::Articles(vec![])))]);
        let fallback = ScriptedSource::new("fallback", vec![Step::Reply(Ok(NewsBatch::NoNews))]);

        let result = fetcher(primary, fallback).fetch("IBM", &range()).await;

        assert_eq!(result.fetch_status, FetchStatus::Success);
        assert!(result.items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_twice_then_fallback_once() {
        let primary = ScriptedSource::new(
            "primary",
            vec![
                Step::Reply(Err(SourceError::Server(503))),
                Step::Reply(Err(SourceError::Timeout)),
            ],
        );
        let fallback = ScriptedSource::new("fallback", vec![Step::Reply(Ok(NewsBatch::Articles(items(2))))]);

        let result = fetcher(primary.clone(), fallback.clone()).fetch("X", &range()).await;

        assert_eq!(primary.calls(), 2);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(result.source_used, SourceUsed::Fallback);
        assert_eq!(result.fetch_status, FetchStatus::Success);
        assert_eq!(result.items.len(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_falls_back_without_retry() {
        let primary = ScriptedSource::new(
            "primary",
            vec![Step::Reply(Err(SourceError::Auth("invalid token".into())))],
        );
        let fallback = ScriptedSource::new("fallback", vec![Step::Reply(Ok(NewsBatch::Articles(items(1))))]);

        let result = fetcher(primary.clone(), fallback.clone()).fetch("AAPL", &range()).await;

        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(result.source_used, SourceUsed::Fallback);
    }

    #[tokio::test]
    async fn test_rejected_request_falls_back_without_retry() {
        let primary = ScriptedSource::new(
            "primary",
            vec![Step::Reply(Err(SourceError::Rejected { status: 402, body: "upgrade plan".into() }))],
        );
        let fallback = ScriptedSource::new("fallback", vec![Step::Reply(Ok(NewsBatch::Articles(items(1))))]);

        let result = fetcher(primary.clone(), fallback.clone()).fetch("META", &range()).await;

        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(result.source_used, SourceUsed::Fallback);
    }

    #[tokio::test]
    async fn test_malformed_symbol_never_reaches_primary() {
        let primary = ScriptedSource::new("primary", vec![]);
        let fallback = ScriptedSource::new("fallback", vec![Step::Reply(Ok(NewsBatch::NoNews))]);

        let result = fetcher(primary.clone(), fallback.clone()).fetch("not a symbol!", &range()).await;

        assert_eq!(primary.calls(), 0);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(result.fetch_status, FetchStatus::Success);
    }

    #[tokio::test]
    async fn test_both_sources_erroring_is_failed() {
        let primary = ScriptedSource::new(
            "primary",
            vec![Step::Reply(Err(SourceError::Auth("revoked".into())))],
        );
        let fallback = ScriptedSource::new(
            "fallback",
            vec![Step::Reply(Err(SourceError::Network("connection reset".into())))],
        );

        let result = fetcher(primary, fallback).fetch("MSFT", &range()).await;

        assert_eq!(result.fetch_status, FetchStatus::Failed);
        assert_eq!(result.source_used, SourceUsed::None);
        assert!(result.items.is_empty());
        assert!(result.error.unwrap().contains("revoked"));
    }

    #[tokio::test]
    async fn test_empty_primary_and_failed_fallback_is_empty_success() {
        let primary = ScriptedSource::new("primary", vec![Step::Reply(Ok(NewsBatch::Articles(vec![])))]);
        let fallback = ScriptedSource::new(
            "fallback",
            vec![Step::Reply(Err(SourceError::Server(500)))],
        );

        let result = fetcher(primary, fallback).fetch("GOOG", &range()).await;

        assert_eq!(result.fetch_status, FetchStatus::Success);
        assert!(result.items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_primary_times_out_and_retries() {
        let primary = ScriptedSource::new("primary", vec![Step::Hang, Step::Hang]);
        let fallback = ScriptedSource::new("fallback", vec![Step::Reply(Ok(NewsBatch::Articles(items(1))))]);
        let start = tokio::time::Instant::now();

        let result = fetcher(primary.clone(), fallback).fetch("AMZN", &range()).await;

        assert_eq!(primary.calls(), 2);
        assert_eq!(result.source_used, SourceUsed::Fallback);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_primary_attempt_takes_a_limiter_slot() {
        let primary = ScriptedSource::new(
            "primary",
            vec![
                Step::Reply(Err(SourceError::RateLimited)),
                Step::Reply(Ok(NewsBatch::Articles(items(1)))),
            ],
        );
        let fallback = ScriptedSource::new("fallback", vec![]);
        let fetcher = NewsFetcher::new(
            primary.clone(),
            fallback,
            Arc::new(RateLimiter::new(1, Duration::from_secs(30))),
            RetryPolicy { max_retries: 1, base_delay: Duration::from_millis(100) },
            Duration::from_secs(5),
            20,
        );
        let start = tokio::time::Instant::now();

        let result = fetcher.fetch("META", &range()).await;

        assert_eq!(result.source_used, SourceUsed::Primary);
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_results_are_capped_newest_first() {
        let mut many = items(30);
        many.reverse();
        let primary = ScriptedSource::new("primary", vec![Step::Reply(Ok(NewsBatch::Articles(many)))]);
        let fallback = ScriptedSource::new("fallback", vec![]);

        let result = fetcher(primary, fallback).fetch("AAPL", &range()).await;

        assert_eq!(result.items.len(), 20);
        assert!(result
            .items
            .windows(2)
            .all(|w| w[0].published_at >= w[1].published_at));
        assert_eq!(result.items[0].title, "headline 0");
    }

    #[test]
    fn test_symbol_validation() {
        assert!(is_valid_symbol("AAPL"));
        assert!(is_valid_symbol("BRK.B"));
        assert!(is_valid_symbol("^GSPC"));
        assert!(!is_valid_symbol("aapl"));
        assert!(!is_valid_symbol(""));
        assert!(!is_valid_symbol("TOO LONG SYMBOL"));
    }

    #[test]
    fn test_backoff_grows() {
        let policy = RetryPolicy { max_retries: 3, base_delay: Duration::from_millis(400) };
        let first = policy.backoff(1);
        let second = policy.backoff(2);
        assert!(first >= Duration::from_millis(400) && first <= Duration::from_millis(500));
        assert!(second >= Duration::from_millis(800) && second <= Duration::from_millis(1000));
    }
}
