use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::config::ReportLanguage;
use crate::models::news::{FetchStatus, SourceUsed};
use crate::models::run_report::SummarizationStatus;

/// Market snapshot for one symbol used in the digest header of each entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockSnapshot {
    pub symbol: String,
    pub company_name: String,
    pub current_price: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub week_8_low: Option<f64>,
    pub week_8_high: Option<f64>,
}

impl StockSnapshot {
    /// Used when the quote lookup failed: the symbol stands in for the name.
    pub fn unknown(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            company_name: symbol.to_string(),
            current_price: None,
            change: None,
            change_percent: None,
            week_8_low: None,
            week_8_high: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestEntry {
    pub symbol: String,
    pub company_name: String,
    pub price_change_percent: Option<f64>,
    pub current_price: Option<f64>,
    pub week_8_low: Option<f64>,
    pub week_8_high: Option<f64>,
    pub summary_text: String,
    pub news_count: usize,
    pub top_links: Vec<String>,
    pub source_used: SourceUsed,
    pub fetch_status: FetchStatus,
    pub summarization_status: SummarizationStatus,
}

/// The assembled digest, one entry per configured symbol in configured order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DigestReport {
    pub date: NaiveDate,
    pub language: ReportLanguage,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<DigestEntry>,
    pub no_notable_news: bool,
    pub total_news: usize,
}

impl DigestReport {
    pub fn entry(&self, symbol: &str) -> Option<&DigestEntry> {
        self.entries.iter().find(|e| e.symbol == symbol)
    }
}
