use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::errors::SourceError;
use crate::external::news_provider::NewsSource;
use crate::external::quote_provider::QuoteProvider;
use crate::models::{DateRange, NewsBatch, NewsItem, StockSnapshot};

const YAHOO_SEARCH_URL: &str = "https://query1.finance.yahoo.com/v1/finance/search";
const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; stock-digest/0.1)";
// Roughly eight weeks of trading sessions.
const EIGHT_WEEK_SESSIONS: usize = 56;

/// Yahoo Finance client. Serves as the fallback news source and as the
/// quote provider for company names and daily price change.
pub struct YahooProvider {
    client: reqwest::Client,
    news_count: usize,
}

impl YahooProvider {
    pub fn new(timeout: Duration, news_count: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, news_count })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let resp = self.client.get(url).query(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::from_status(status, body));
        }

        resp.json::<T>().await.map_err(|e| SourceError::Parse(e.to_string()))
    }
}

// Minimal response structs (only what we need)
#[derive(Debug, Deserialize)]
struct YahooSearchResponse {
    #[serde(default)]
    news: Vec<YahooNewsItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooNewsItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    publisher: String,
    #[serde(default)]
    link: String,
    provider_publish_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    meta: YahooMeta,
    #[serde(default)]
    indicators: Option<YahooIndicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooMeta {
    long_name: Option<String>,
    short_name: Option<String>,
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
}

fn news_batch(response: YahooSearchResponse) -> NewsBatch {
    if response.news.is_empty() {
        return NewsBatch::NoNews;
    }

    let items = response
        .news
        .into_iter()
        .filter_map(|item| {
            // Items without a publish time cannot be placed in the window.
            let published_at = DateTime::<Utc>::from_timestamp(item.provider_publish_time?, 0)?;
            Some(NewsItem {
                title: item.title,
                source: item.publisher,
                published_at,
                summary: None,
                url: item.link,
            })
        })
        .collect();

    NewsBatch::Articles(items)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn snapshot_from_chart(symbol: &str, response: YahooChartResponse) -> Result<StockSnapshot, SourceError> {
    if let Some(err) = response.chart.error {
        return Err(SourceError::MalformedSymbol(err.to_string()));
    }

    let result = response
        .chart
        .result
        .and_then(|mut r| r.pop())
        .ok_or_else(|| SourceError::Parse("missing chart result".into()))?;

    let quote = result.indicators.and_then(|mut i| {
        if i.quote.is_empty() {
            None
        } else {
            Some(i.quote.swap_remove(0))
        }
    });

    let closes: Vec<f64> = quote
        .as_ref()
        .map(|q| q.close.iter().flatten().copied().collect())
        .unwrap_or_default();

    let current_price = result.meta.regular_market_price.or_else(|| closes.last().copied());
    // The chart's own previous close is relative to the range start, so prefer
    // the session before the latest one.
    let previous_close = if closes.len() >= 2 {
        Some(closes[closes.len() - 2])
    } else {
        result.meta.previous_close
    };

    let (change, change_percent) = match (current_price, previous_close) {
        (Some(price), Some(prev)) if prev > 0.0 => {
            let change = price - prev;
            (Some(round2(change)), Some(round2(change / prev * 100.0)))
        }
        _ => (None, None),
    };

    let (week_8_low, week_8_high) = match &quote {
        Some(q) => {
            let lows: Vec<f64> = q.low.iter().flatten().copied().collect();
            let highs: Vec<f64> = q.high.iter().flatten().copied().collect();
            let recent_low = lows.iter().rev().take(EIGHT_WEEK_SESSIONS).copied().reduce(f64::min);
            let recent_high = highs.iter().rev().take(EIGHT_WEEK_SESSIONS).copied().reduce(f64::max);
            (recent_low.map(round2), recent_high.map(round2))
        }
        None => (None, None),
    };

    let company_name = result
        .meta
        .long_name
        .or(result.meta.short_name)
        .unwrap_or_else(|| symbol.to_string());

    Ok(StockSnapshot {
        symbol: symbol.to_string(),
        company_name,
        current_price: current_price.map(round2),
        change,
        change_percent,
        week_8_low,
        week_8_high,
    })
}

#[async_trait]
impl NewsSource for YahooProvider {
    async fn fetch_news(&self, symbol: &str, _range: &DateRange) -> Result<NewsBatch, SourceError> {
        // The search endpoint has no date filter; the fetcher trims to the window.
        let response: YahooSearchResponse = self
            .get_json(
                YAHOO_SEARCH_URL,
                &[
                    ("q", symbol.to_string()),
                    ("newsCount", self.news_count.to_string()),
                    ("quotesCount", "0".to_string()),
                ],
            )
            .await?;

        Ok(news_batch(response))
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}

#[async_trait]
impl QuoteProvider for YahooProvider {
    async fn fetch_snapshot(&self, symbol: &str) -> Result<StockSnapshot, SourceError> {
        let url = format!("{}/{}", YAHOO_CHART_URL, symbol);
        let response: YahooChartResponse = self
            .get_json(&url, &[("range", "3mo".to_string()), ("interval", "1d".to_string())])
            .await?;

        snapshot_from_chart(symbol, response)
    }
}
