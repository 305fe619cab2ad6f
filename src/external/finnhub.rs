use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::FinnhubConfig;
use crate::errors::SourceError;
use crate::external::news_provider::NewsSource;
use crate::models::{DateRange, NewsBatch, NewsItem};

const FINNHUB_API_BASE: &str = "https://finnhub.io/api/v1";

/// Finnhub company-news client, the primary news source.
pub struct FinnhubSource {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FinnhubSource {
    pub fn new(config: &FinnhubConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: FINNHUB_API_BASE.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct FinnhubArticle {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    datetime: i64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
}

impl FinnhubArticle {
    fn into_item(self) -> Option<NewsItem> {
        let published_at = DateTime::<Utc>::from_timestamp(self.datetime, 0)?;
        Some(NewsItem {
            title: self.headline,
            source: self.source,
            published_at,
            summary: Some(self.summary).filter(|s| !s.trim().is_empty()),
            url: self.url,
        })
    }
}

fn parse_articles(body: &str) -> Result<Vec<NewsItem>, SourceError> {
    let articles: Vec<FinnhubArticle> =
        serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))?;

    let total = articles.len();
    let items: Vec<NewsItem> = articles.into_iter().filter_map(FinnhubArticle::into_item).collect();
    if items.len() < total {
        warn!("Dropped {} Finnhub articles with invalid timestamps", total - items.len());
    }
    Ok(items)
}

#[async_trait]
impl NewsSource for FinnhubSource {
    async fn fetch_news(&self, symbol: &str, range: &DateRange) -> Result<NewsBatch, SourceError> {
        let from = range.start_date().format("%Y-%m-%d").to_string();
        let to = range.end_date().format("%Y-%m-%d").to_string();

        let response = self
            .client
            .get(format!("{}/company-news", self.base_url))
            .query(&[
                ("symbol", symbol),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("token", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::from_status(status, body));
        }

        let body = response.text().await?;
        let items = parse_articles(&body)?;
        debug!("Finnhub returned {} articles for {}", items.len(), symbol);

        // Finnhub answers an empty array both for "nothing published" and for
        // symbols it does not cover, so an empty list is not an explicit no-news.
        Ok(NewsBatch::Articles(items))
    }

    fn name(&self) -> &str {
        "finnhub"
    }
}
