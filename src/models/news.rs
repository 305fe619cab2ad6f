use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A single news article about one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub summary: Option<String>,
    pub url: String,
}

/// Inclusive time window news must fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Window starting at midnight UTC `days` days before `now` and ending at `now`.
    /// A span reaching past chrono's range starts at the earliest representable day.
    pub fn lookback(now: DateTime<Utc>, days: u32) -> Self {
        let start_day = now
            .checked_sub_signed(Duration::days(days as i64))
            .map(|at| at.date_naive())
            .unwrap_or(NaiveDate::MIN);
        let start = start_day
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now);
        Self { start, end: now }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }
}

/// What a news source answered for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum NewsBatch {
    /// Articles as returned by the source; may be empty.
    Articles(Vec<NewsItem>),
    /// The source explicitly reported that it has no news for this symbol.
    NoNews,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceUsed {
    Primary,
    Fallback,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FetchStatus {
    Success,
    Failed,
}

/// Terminal outcome of fetching one symbol's news.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolNewsResult {
    pub symbol: String,
    pub items: Vec<NewsItem>,
    pub source_used: SourceUsed,
    pub fetch_status: FetchStatus,
    pub error: Option<String>,
}

impl SymbolNewsResult {
    pub fn success(symbol: &str, items: Vec<NewsItem>, source_used: SourceUsed) -> Self {
        Self {
            symbol: symbol.to_string(),
            items,
            source_used,
            fetch_status: FetchStatus::Success,
            error: None,
        }
    }

    /// A failed fetch never carries items.
    pub fn failed(symbol: &str, error: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            items: Vec::new(),
            source_used: SourceUsed::None,
            fetch_status: FetchStatus::Failed,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.fetch_status == FetchStatus::Success
    }

    pub fn has_news(&self) -> bool {
        self.is_success() && !self.items.is_empty()
    }
}

/// Keeps items inside `range`, newest first, at most `cap` of them.
pub fn normalize_items(mut items: Vec<NewsItem>, range: &DateRange, cap: usize) -> Vec<NewsItem> {
    items.retain(|item| range.contains(item.published_at));
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    items.truncate(cap);
    items
}
