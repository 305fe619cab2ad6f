use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;

use stock_digest::config::DigestConfig;
use stock_digest::errors::{LlmError, MailError, SourceError};
use stock_digest::external::news_provider::NewsSource;
use stock_digest::external::quote_provider::QuoteProvider;
use stock_digest::models::{DateRange, NewsBatch, NewsItem, StockSnapshot};
use stock_digest::services::digest_service::DigestPipeline;
use stock_digest::services::news_service::NewsFetcher;
use stock_digest::services::notification_service::{Mailer, OutgoingEmail};
use stock_digest::services::rate_limiter::RateLimiter;
use stock_digest::services::summary_service::{SummaryRequest, Summarizer};

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
}

pub fn articles(symbol: &str, count: usize) -> Vec<NewsItem> {
    (0..count)
        .map(|i| NewsItem {
            title: format!("{} story {}", symbol, i),
            source: "Reuters".into(),
            published_at: fixed_now() - ChronoDuration::hours(i as i64 + 1),
            summary: Some(format!("Details about {}", symbol)),
            url: format!("https://news.example.com/{}/{}", symbol, i),
        })
        .collect()
}

pub fn config(symbols: &[&str]) -> DigestConfig {
    DigestConfig {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        recipients: vec!["investor@example.com".into()],
        retry_base_delay: Duration::from_millis(100),
        request_timeout: Duration::from_secs(10),
        ..DigestConfig::default()
    }
}

// ==============================================================================
// News sources
// ==============================================================================

pub enum Behavior {
    Articles(usize),
    NoNews,
    Fail(SourceError),
    Hang,
}

/// News source scripted per symbol; unscripted symbols get an empty article list.
pub struct FakeNewsSource {
    name: &'static str,
    scripts: Mutex<HashMap<String, VecDeque<Behavior>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeNewsSource {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn script(self: &Arc<Self>, symbol: &str, steps: Vec<Behavior>) -> Arc<Self> {
        self.scripts.lock().insert(symbol.to_string(), steps.into());
        self.clone()
    }

    pub fn calls(&self, symbol: &str) -> usize {
        self.calls.lock().get(symbol).copied().unwrap_or(0)
    }
}

#[async_trait]
impl NewsSource for FakeNewsSource {
    async fn fetch_news(&self, symbol: &str, _range: &DateRange) -> Result<NewsBatch, SourceError> {
        *self.calls.lock().entry(symbol.to_string()).or_insert(0) += 1;
        let step = self
            .scripts
            .lock()
            .get_mut(symbol)
            .and_then(|steps| steps.pop_front());

        match step {
            Some(Behavior::Articles(n)) => Ok(NewsBatch::Articles(articles(symbol, n))),
            Some(Behavior::NoNews) => Ok(NewsBatch::NoNews),
            Some(Behavior::Fail(e)) => Err(e),
            Some(Behavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(NewsBatch::NoNews)
            }
            None => Ok(NewsBatch::Articles(Vec::new())),
        }
    }

    fn name(&self) -> &str {
        self.name
    }
}

// ==============================================================================
// Quotes
// ==============================================================================

pub struct FakeQuotes;

#[async_trait]
impl QuoteProvider for FakeQuotes {
    async fn fetch_snapshot(&self, symbol: &str) -> Result<StockSnapshot, SourceError> {
        match symbol {
            "NVDA" => Ok(StockSnapshot {
                company_name: "NVIDIA Corporation".into(),
                current_price: Some(875.28),
                change: Some(20.1),
                change_percent: Some(2.35),
                ..StockSnapshot::unknown(symbol)
            }),
            "AMD" => Ok(StockSnapshot {
                company_name: "Advanced Micro Devices, Inc.".into(),
                change_percent: Some(-1.2),
                ..StockSnapshot::unknown(symbol)
            }),
            "BOOM" => panic!("quote feed returned garbage for {}", symbol),
            _ => Err(SourceError::MalformedSymbol(symbol.to_string())),
        }
    }
}

// ==============================================================================
// Summarizer
// ==============================================================================

#[derive(Default)]
pub struct FakeSummarizer {
    hang: Vec<String>,
    fail: Vec<String>,
    panic: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeSummarizer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn hanging_on(symbols: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            hang: symbols.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn failing_on(symbols: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fail: symbols.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn panicking_on(symbols: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            panic: symbols.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, LlmError> {
        self.calls.lock().push(request.symbol.clone());
        if self.hang.contains(&request.symbol) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail.contains(&request.symbol) {
            return Err(LlmError::RateLimited);
        }
        if self.panic.contains(&request.symbol) {
            panic!("summarizer crashed on {}", request.symbol);
        }
        Ok(format!(
            "{} summary of {} stories",
            request.company_name,
            request.items.len()
        ))
    }
}

// ==============================================================================
// Mailer
// ==============================================================================

pub struct FakeMailer {
    replies: Mutex<VecDeque<Result<(), MailError>>>,
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl FakeMailer {
    pub fn succeeding() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    pub fn scripted(replies: Vec<Result<(), MailError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        self.sent.lock().push(email.clone());
        self.replies.lock().pop_front().unwrap_or(Ok(()))
    }
}

// ==============================================================================
// Pipeline
// ==============================================================================

pub fn pipeline(
    config: DigestConfig,
    primary: Arc<FakeNewsSource>,
    fallback: Arc<FakeNewsSource>,
    summarizer: Arc<FakeSummarizer>,
    mailer: Option<Arc<FakeMailer>>,
) -> DigestPipeline {
    let config = Arc::new(config);
    let limiter = Arc::new(RateLimiter::new(
        config.primary_calls_per_window,
        config.primary_window,
    ));
    let fetcher = Arc::new(NewsFetcher::from_config(&config, primary, fallback, limiter));
    let mailer = mailer.map(|m| m as Arc<dyn Mailer>);
    DigestPipeline::new(config, fetcher, Arc::new(FakeQuotes), summarizer, mailer)
}
