use std::time::Duration;

use serde::Serialize;

use crate::errors::AppError;

/// Longest news window a run may ask for.
pub const MAX_LOOKBACK_DAYS: u32 = 365;

/// Language used for the subject line, placeholders and the summarization prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportLanguage {
    En,
    Zh,
}

impl ReportLanguage {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "zh" | "zh-cn" | "cn" => ReportLanguage::Zh,
            _ => ReportLanguage::En,
        }
    }

    pub fn no_notable_events(&self) -> &'static str {
        match self {
            ReportLanguage::En => "no notable events",
            ReportLanguage::Zh => "今日无重大事件",
        }
    }

    pub fn summary_unavailable(&self) -> &'static str {
        match self {
            ReportLanguage::En => "summary unavailable",
            ReportLanguage::Zh => "摘要暂不可用",
        }
    }

    pub fn no_data(&self) -> &'static str {
        match self {
            ReportLanguage::En => "no data available: news could not be retrieved",
            ReportLanguage::Zh => "暂无数据：新闻获取失败",
        }
    }

    pub fn no_notable_news_banner(&self) -> &'static str {
        match self {
            ReportLanguage::En => "no notable news across all tracked symbols",
            ReportLanguage::Zh => "所有关注的股票今日均无重要新闻",
        }
    }

    pub fn subject(&self, date: chrono::NaiveDate, test_mode: bool) -> String {
        let subject = match self {
            ReportLanguage::En => format!("📈 Daily Stock Brief | {}", date.format("%Y-%m-%d")),
            ReportLanguage::Zh => format!("📈 每日股票简报 | {}", date.format("%Y-%m-%d")),
        };
        if test_mode {
            format!("[TEST] {}", subject)
        } else {
            subject
        }
    }
}

/// Immutable run configuration, built once at process start.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub symbols: Vec<String>,
    pub recipients: Vec<String>,
    pub lookback_days: u32,
    pub news_cap: usize,
    pub primary_calls_per_window: usize,
    pub primary_window: Duration,
    pub primary_max_retries: u32,
    pub retry_base_delay: Duration,
    pub fetch_concurrency: usize,
    pub summarize_concurrency: usize,
    pub request_timeout: Duration,
    pub summary_timeout: Duration,
    pub mail_timeout: Duration,
    pub run_deadline: Duration,
    pub summary_max_chars: usize,
    pub language: ReportLanguage,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            recipients: Vec::new(),
            lookback_days: 1,
            news_cap: 20,
            primary_calls_per_window: 60,
            primary_window: Duration::from_secs(60),
            primary_max_retries: 1,
            retry_base_delay: Duration::from_millis(500),
            fetch_concurrency: 4,
            summarize_concurrency: 2,
            request_timeout: Duration::from_secs(15),
            summary_timeout: Duration::from_secs(30),
            mail_timeout: Duration::from_secs(30),
            run_deadline: Duration::from_secs(600),
            summary_max_chars: 1200,
            language: ReportLanguage::En,
        }
    }
}

impl DigestConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            symbols: parse_symbols(&std::env::var("STOCK_SYMBOLS").unwrap_or_default()),
            recipients: parse_list(&std::env::var("RECIPIENT_EMAILS").unwrap_or_default()),
            lookback_days: env_parse("NEWS_LOOKBACK_DAYS", defaults.lookback_days),
            news_cap: env_parse("NEWS_CAP", defaults.news_cap),
            primary_calls_per_window: env_parse(
                "PRIMARY_CALLS_PER_MINUTE",
                defaults.primary_calls_per_window,
            ),
            primary_window: defaults.primary_window,
            primary_max_retries: env_parse("PRIMARY_MAX_RETRIES", defaults.primary_max_retries),
            retry_base_delay: Duration::from_millis(env_parse("RETRY_BASE_DELAY_MS", 500)),
            fetch_concurrency: env_parse("FETCH_CONCURRENCY", defaults.fetch_concurrency),
            summarize_concurrency: env_parse(
                "SUMMARIZE_CONCURRENCY",
                defaults.summarize_concurrency,
            ),
            request_timeout: Duration::from_secs(env_parse("REQUEST_TIMEOUT_SECS", 15)),
            summary_timeout: Duration::from_secs(env_parse("SUMMARY_TIMEOUT_SECS", 30)),
            mail_timeout: Duration::from_secs(env_parse("MAIL_TIMEOUT_SECS", 30)),
            run_deadline: Duration::from_secs(env_parse("RUN_DEADLINE_SECS", 600)),
            summary_max_chars: env_parse("SUMMARY_MAX_CHARS", defaults.summary_max_chars),
            language: ReportLanguage::parse(
                &std::env::var("REPORT_LANGUAGE").unwrap_or_else(|_| "en".to_string()),
            ),
        }
    }

    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();

        if self.symbols.is_empty() {
            errors.push("STOCK_SYMBOLS is empty");
        }
        if self.recipients.is_empty() {
            errors.push("RECIPIENT_EMAILS is empty");
        }
        if self.lookback_days == 0 || self.lookback_days > MAX_LOOKBACK_DAYS {
            errors.push("NEWS_LOOKBACK_DAYS must be between 1 and 365");
        }
        if self.news_cap == 0 {
            errors.push("NEWS_CAP must be at least 1");
        }
        if self.primary_calls_per_window == 0 {
            errors.push("PRIMARY_CALLS_PER_MINUTE must be at least 1");
        }
        if self.fetch_concurrency == 0 || self.summarize_concurrency == 0 {
            errors.push("concurrency limits must be at least 1");
        }
        if self.summary_max_chars == 0 {
            errors.push("SUMMARY_MAX_CHARS must be at least 1");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Config(errors.join("; ")))
        }
    }

    /// Restrict the run to a single symbol (test mode).
    pub fn with_single_symbol(mut self, symbol: Option<&str>) -> Self {
        let chosen = match symbol {
            Some(s) => Some(s.trim().to_uppercase()),
            None => self.symbols.first().cloned(),
        };
        self.symbols = chosen.into_iter().collect();
        self
    }
}

/// Finnhub credentials for the primary news source.
#[derive(Debug, Clone)]
pub struct FinnhubConfig {
    pub api_key: String,
}

impl FinnhubConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let api_key = std::env::var("FINNHUB_API_KEY")
            .map_err(|_| AppError::Config("FINNHUB_API_KEY not set".into()))?;
        Ok(Self { api_key })
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl AnthropicConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| AppError::Config("ANTHROPIC_API_KEY not set".into()))?;
        Ok(Self {
            api_key,
            base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            model: std::env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

impl SmtpConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let username = std::env::var("SMTP_USERNAME")
            .map_err(|_| AppError::Config("SMTP_USERNAME not set".into()))?;
        let password = std::env::var("SMTP_PASSWORD")
            .map_err(|_| AppError::Config("SMTP_PASSWORD not set".into()))?;

        Ok(Self {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            port: env_parse("SMTP_PORT", 587),
            from_email: std::env::var("SMTP_FROM_EMAIL").unwrap_or_else(|_| username.clone()),
            from_name: std::env::var("SMTP_FROM_NAME")
                .unwrap_or_else(|_| "Stock Digest".to_string()),
            username,
            password,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Upper-cases and de-duplicates while keeping the configured order.
pub fn parse_symbols(raw: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for symbol in parse_list(raw) {
        let symbol = symbol.to_uppercase();
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}
