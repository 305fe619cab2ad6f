use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::{FutureExt, StreamExt};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::{DigestConfig, ReportLanguage};
use crate::errors::LlmError;
use crate::models::{NewsItem, StockSnapshot, SummarizationStatus, SymbolNewsResult};
use crate::services::aggregation_service::{panic_message, AggregatedNews};

/// Input for one symbol's summary.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub symbol: String,
    pub company_name: String,
    pub items: Vec<NewsItem>,
    pub date: NaiveDate,
    pub language: ReportLanguage,
}

/// Turns a symbol's news into a short digest paragraph.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutcome {
    pub text: String,
    pub status: SummarizationStatus,
    pub error: Option<String>,
}

impl SummaryOutcome {
    fn skipped(text: &str) -> Self {
        Self {
            text: text.to_string(),
            status: SummarizationStatus::Skipped,
            error: None,
        }
    }

    fn failed(language: ReportLanguage, error: String) -> Self {
        Self {
            text: language.summary_unavailable().to_string(),
            status: SummarizationStatus::Failed,
            error: Some(error),
        }
    }
}

/// Calls the summarizer at most once per symbol, with a per-call timeout and
/// a concurrency cap, substituting a placeholder when a call fails.
#[derive(Clone)]
pub struct SummarizationStage {
    summarizer: Arc<dyn Summarizer>,
    concurrency: usize,
    timeout: Duration,
    max_chars: usize,
    language: ReportLanguage,
}

impl SummarizationStage {
    pub fn new(summarizer: Arc<dyn Summarizer>, config: &DigestConfig) -> Self {
        Self {
            summarizer,
            concurrency: config.summarize_concurrency.max(1),
            timeout: config.summary_timeout,
            max_chars: config.summary_max_chars,
            language: config.language,
        }
    }

    pub async fn summarize_all(
        &self,
        news: &AggregatedNews,
        snapshots: &HashMap<String, StockSnapshot>,
        date: NaiveDate,
        deadline: Instant,
    ) -> HashMap<String, SummaryOutcome> {
        let mut outcomes = HashMap::new();
        let mut requests = Vec::new();

        for result in &news.results {
            match self.precheck(result) {
                Some(outcome) => {
                    outcomes.insert(result.symbol.clone(), outcome);
                }
                None => requests.push(SummaryRequest {
                    symbol: result.symbol.clone(),
                    company_name: snapshots
                        .get(&result.symbol)
                        .map(|s| s.company_name.clone())
                        .unwrap_or_else(|| result.symbol.clone()),
                    items: result.items.clone(),
                    date,
                    language: self.language,
                }),
            }
        }

        info!("🤖 Generating summaries for {} symbols", requests.len());
        let symbols: Vec<String> = requests.iter().map(|r| r.symbol.clone()).collect();

        let mut pending = futures::stream::iter(requests)
            .map(|request| {
                let stage = self.clone();
                async move {
                    let outcome = AssertUnwindSafe(stage.summarize_one(&request))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            let message = panic_message(panic.as_ref());
                            error!("❌ Summary for {} aborted unexpectedly: {}", request.symbol, message);
                            SummaryOutcome::failed(stage.language, format!("internal error: {}", message))
                        });
                    (request.symbol, outcome)
                }
            })
            .buffer_unordered(self.concurrency);

        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((symbol, outcome))) => {
                    outcomes.insert(symbol, outcome);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!("Run deadline reached while summaries were pending");
                    break;
                }
            }
        }
        drop(pending);

        for symbol in symbols {
            outcomes
                .entry(symbol)
                .or_insert_with(|| SummaryOutcome::failed(self.language, "run deadline exceeded".into()));
        }

        outcomes
    }

    /// Symbols that need no model call get their fixed text here.
    fn precheck(&self, result: &SymbolNewsResult) -> Option<SummaryOutcome> {
        if !result.is_success() {
            Some(SummaryOutcome::skipped(self.language.no_data()))
        } else if result.items.is_empty() {
            Some(SummaryOutcome::skipped(self.language.no_notable_events()))
        } else {
            None
        }
    }

    async fn summarize_one(&self, request: &SummaryRequest) -> SummaryOutcome {
        match tokio::time::timeout(self.timeout, self.summarizer.summarize(request)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                info!("✓ Summary generated for {}", request.symbol);
                SummaryOutcome {
                    text: truncate_summary(&text, self.max_chars),
                    status: SummarizationStatus::Success,
                    error: None,
                }
            }
            Ok(Ok(_)) => {
                warn!("Empty summary returned for {}", request.symbol);
                SummaryOutcome::failed(self.language, "empty summary".into())
            }
            Ok(Err(e)) => {
                warn!("❌ Summary failed for {}: {}", request.symbol, e);
                SummaryOutcome::failed(self.language, e.to_string())
            }
            Err(_) => {
                warn!("❌ Summary timed out for {} after {:?}", request.symbol, self.timeout);
                SummaryOutcome::failed(self.language, LlmError::Timeout.to_string())
            }
        }
    }
}

/// Trims and caps a summary at `max_chars` characters, ending with an ellipsis
/// when shortened.
pub fn truncate_summary(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut shortened: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    shortened.push('…');
    shortened
}
