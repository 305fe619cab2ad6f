use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use futures::{FutureExt, StreamExt};
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::DigestConfig;
use crate::external::quote_provider::QuoteProvider;
use crate::models::{DateRange, DeliveryStatus, DigestReport, RunReport, StockSnapshot};
use crate::services::aggregation_service::{panic_message, AggregationStage};
use crate::services::news_service::NewsFetcher;
use crate::services::notification_service::{DeliveryStage, Mailer, OutgoingEmail};
use crate::services::report_service::ReportAssembler;
use crate::services::summary_service::{SummarizationStage, Summarizer};

/// Everything one invocation produced.
#[derive(Debug, Clone)]
pub struct DigestRun {
    pub report: DigestReport,
    pub email: OutgoingEmail,
    pub run_report: RunReport,
}

/// Drives aggregation, summarization, assembly and delivery for one batch of
/// symbols, recording each stage's outcome in a [`RunReport`].
pub struct DigestPipeline {
    config: Arc<DigestConfig>,
    aggregation: AggregationStage,
    quotes: Arc<dyn QuoteProvider>,
    summarization: SummarizationStage,
    assembler: ReportAssembler,
    /// `None` on dry runs
    delivery: Option<DeliveryStage>,
    test_mode: bool,
}

impl DigestPipeline {
    pub fn new(
        config: Arc<DigestConfig>,
        fetcher: Arc<NewsFetcher>,
        quotes: Arc<dyn QuoteProvider>,
        summarizer: Arc<dyn Summarizer>,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Self {
        Self {
            aggregation: AggregationStage::new(fetcher, config.fetch_concurrency),
            quotes,
            summarization: SummarizationStage::new(summarizer, &config),
            assembler: ReportAssembler::new(config.language, config.summary_max_chars),
            delivery: mailer.map(|m| DeliveryStage::new(m, config.mail_timeout)),
            test_mode: false,
            config,
        }
    }

    /// Prefix the subject with `[TEST]`.
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub async fn run(&self, now: DateTime<Utc>) -> DigestRun {
        let run_id = Uuid::new_v4();
        self.run_inner(run_id, now)
            .instrument(info_span!("digest_run", %run_id))
            .await
    }

    async fn run_inner(&self, run_id: Uuid, now: DateTime<Utc>) -> DigestRun {
        let symbols = &self.config.symbols;
        let deadline = Instant::now() + self.config.run_deadline;
        let range = DateRange::lookback(now, self.config.lookback_days);
        let date = digest_date(now);
        let mut run_report = RunReport::new(run_id);

        info!(
            "🚀 Starting digest for {} symbols ({} to {})",
            symbols.len(),
            range.start_date(),
            range.end_date()
        );

        let news = self.aggregation.aggregate(symbols, &range, deadline).await;
        for result in &news.results {
            run_report.record_fetch(result);
        }

        let snapshots = self.fetch_snapshots(symbols, deadline).await;

        let summaries = self
            .summarization
            .summarize_all(&news, &snapshots, date, deadline)
            .await;
        for symbol in symbols {
            if let Some(outcome) = summaries.get(symbol) {
                run_report.record_summary(symbol, outcome.status, outcome.error.clone());
            }
        }

        run_report.deadline_exceeded = news.deadline_exceeded || Instant::now() >= deadline;
        if run_report.deadline_exceeded {
            warn!("⏱ Run deadline exceeded, delivering a partial digest");
        }

        let report = self
            .assembler
            .assemble(symbols, &news, &summaries, &snapshots, date, now);
        let email = OutgoingEmail::from_report(&report, &self.config.recipients, self.test_mode);

        match &self.delivery {
            Some(stage) => {
                let outcome = stage.deliver(&email).await;
                run_report.record_delivery(outcome.status, outcome.error);
            }
            None => {
                info!("Dry run: skipping delivery");
                run_report.record_delivery(DeliveryStatus::Skipped, None);
            }
        }

        info!(
            "🏁 Digest run finished: {} succeeded, {} failed, delivery {:?}",
            run_report.success_count, run_report.failure_count, run_report.delivery_status
        );

        DigestRun {
            report,
            email,
            run_report,
        }
    }

    /// Quote lookups never fail a symbol; a missing snapshot renders as unknown.
    async fn fetch_snapshots(&self, symbols: &[String], deadline: Instant) -> HashMap<String, StockSnapshot> {
        let timeout = self.config.request_timeout;

        let mut pending = futures::stream::iter(symbols.iter().cloned())
            .map(|symbol| {
                let quotes = self.quotes.clone();
                async move {
                    let lookup = tokio::time::timeout(timeout, quotes.fetch_snapshot(&symbol));
                    let snapshot = match AssertUnwindSafe(lookup).catch_unwind().await {
                        Ok(Ok(Ok(snapshot))) => snapshot,
                        Ok(Ok(Err(e))) => {
                            warn!("Quote lookup failed for {}: {}", symbol, e);
                            StockSnapshot::unknown(&symbol)
                        }
                        Ok(Err(_)) => {
                            warn!("Quote lookup timed out for {}", symbol);
                            StockSnapshot::unknown(&symbol)
                        }
                        Err(panic) => {
                            error!(
                                "❌ Quote lookup for {} aborted unexpectedly: {}",
                                symbol,
                                panic_message(panic.as_ref())
                            );
                            StockSnapshot::unknown(&symbol)
                        }
                    };
                    (symbol, snapshot)
                }
            })
            .buffer_unordered(self.config.fetch_concurrency.max(1));

        let mut snapshots = HashMap::new();
        while let Ok(Some((symbol, snapshot))) = tokio::time::timeout_at(deadline, pending.next()).await {
            snapshots.insert(symbol, snapshot);
        }
        snapshots
    }
}

/// The digest covers the previous UTC calendar day.
pub fn digest_date(now: DateTime<Utc>) -> NaiveDate {
    (now - ChronoDuration::days(1)).date_naive()
}
