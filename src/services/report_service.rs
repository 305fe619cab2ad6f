use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::config::ReportLanguage;
use crate::models::{
    DigestEntry, DigestReport, FetchStatus, SourceUsed, StockSnapshot, SummarizationStatus,
    SymbolNewsResult,
};
use crate::services::aggregation_service::AggregatedNews;
use crate::services::summary_service::{truncate_summary, SummaryOutcome};

/// Links shown per entry.
pub const MAX_TOP_LINKS: usize = 5;

/// Combines fetch results, summaries and quote snapshots into the ordered digest.
pub struct ReportAssembler {
    language: ReportLanguage,
    summary_max_chars: usize,
}

impl ReportAssembler {
    pub fn new(language: ReportLanguage, summary_max_chars: usize) -> Self {
        Self {
            language,
            summary_max_chars,
        }
    }

    /// Builds one entry per symbol in `symbols` order. Symbols without a fetch
    /// result or summary still get an entry.
    pub fn assemble(
        &self,
        symbols: &[String],
        news: &AggregatedNews,
        summaries: &HashMap<String, SummaryOutcome>,
        snapshots: &HashMap<String, StockSnapshot>,
        date: NaiveDate,
        generated_at: DateTime<Utc>,
    ) -> DigestReport {
        let entries: Vec<DigestEntry> = symbols
            .iter()
            .map(|symbol| self.entry(symbol, news.get(symbol), summaries.get(symbol), snapshots.get(symbol)))
            .collect();

        let total_news = entries.iter().map(|e| e.news_count).sum();
        let no_notable_news = total_news == 0;
        if no_notable_news {
            info!("No notable news across {} tracked symbols", entries.len());
        }

        DigestReport {
            date,
            language: self.language,
            generated_at,
            entries,
            no_notable_news,
            total_news,
        }
    }

    fn entry(
        &self,
        symbol: &str,
        result: Option<&SymbolNewsResult>,
        summary: Option<&SummaryOutcome>,
        snapshot: Option<&StockSnapshot>,
    ) -> DigestEntry {
        let fetched = result.filter(|r| r.is_success());

        let (summary_text, summarization_status) = match (summary, fetched) {
            (Some(outcome), _) => (outcome.text.clone(), outcome.status),
            (None, Some(r)) if !r.has_news() => (
                self.language.no_notable_events().to_string(),
                SummarizationStatus::Skipped,
            ),
            (None, Some(_)) => (
                self.language.summary_unavailable().to_string(),
                SummarizationStatus::Failed,
            ),
            (None, None) => (self.language.no_data().to_string(), SummarizationStatus::Skipped),
        };

        let snapshot = snapshot.cloned().unwrap_or_else(|| StockSnapshot::unknown(symbol));
        let items = fetched.map(|r| r.items.as_slice()).unwrap_or_default();

        DigestEntry {
            symbol: symbol.to_string(),
            company_name: snapshot.company_name,
            price_change_percent: snapshot.change_percent,
            current_price: snapshot.current_price,
            week_8_low: snapshot.week_8_low,
            week_8_high: snapshot.week_8_high,
            summary_text: truncate_summary(&summary_text, self.summary_max_chars),
            news_count: items.len(),
            top_links: items
                .iter()
                .map(|item| item.url.clone())
                .filter(|url| !url.is_empty())
                .take(MAX_TOP_LINKS)
                .collect(),
            source_used: result.map(|r| r.source_used).unwrap_or(SourceUsed::None),
            fetch_status: result.map(|r| r.fetch_status).unwrap_or(FetchStatus::Failed),
            summarization_status,
        }
    }
}
