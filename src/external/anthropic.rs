use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{AnthropicConfig, ReportLanguage};
use crate::errors::LlmError;
use crate::models::NewsItem;
use crate::services::summary_service::{SummaryRequest, Summarizer};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f32 = 0.3;
/// Headlines beyond this are left out of the prompt.
const MAX_PROMPT_ITEMS: usize = 15;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Summarizer backed by the Anthropic Messages API.
pub struct AnthropicSummarizer {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicSummarizer {
    pub fn new(config: AnthropicConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl Summarizer for AnthropicSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, LlmError> {
        info!(
            "Requesting summary for {} ({} items, model: {})",
            request.symbol,
            request.items.len(),
            self.config.model
        );
        let prompt = build_prompt(request);
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            messages: vec![Message { role: "user", content: &prompt }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(match status.as_u16() {
                401 | 403 => LlmError::Auth,
                429 => LlmError::RateLimited,
                _ => LlmError::ApiError(format!("HTTP {}: {}", status, error_text)),
            });
        }

        let raw = response
            .text()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;
        let text = parse_response(&raw)?;
        debug!("Summary for {} is {} chars", request.symbol, text.chars().count());
        Ok(text)
    }
}

/// Extracts the first text block of a Messages API response.
fn parse_response(raw: &str) -> Result<String, LlmError> {
    let parsed: MessagesResponse =
        serde_json::from_str(raw).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    parsed
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| LlmError::InvalidResponse("no text content in response".to_string()))
}

fn news_list_text(items: &[NewsItem], language: ReportLanguage) -> String {
    let (title, summary, source, time) = match language {
        ReportLanguage::En => ("Title: ", "Summary: ", "Source: ", "Time: "),
        ReportLanguage::Zh => ("标题：", "摘要：", "来源：", "时间："),
    };

    let mut lines = Vec::new();
    for (i, item) in items.iter().take(MAX_PROMPT_ITEMS).enumerate() {
        lines.push(format!("{}. {}{}", i + 1, title, item.title));
        if let Some(text) = item.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            lines.push(format!("   {}{}", summary, text));
        }
        lines.push(format!(
            "   {}{} | {}{}",
            source,
            item.source,
            time,
            item.published_at.format("%Y-%m-%d %H:%M UTC")
        ));
        lines.push(String::new());
    }
    lines.join("\n")
}

pub(crate) fn build_prompt(request: &SummaryRequest) -> String {
    let news_text = news_list_text(&request.items, request.language);
    let date = request.date.format("%Y-%m-%d");

    match request.language {
        ReportLanguage::Zh => format!(
            "你是一位专业的股票分析师助手。以下是 {}（{}）在 {} 的新闻列表：\n\n{}\n\
             请用中文生成一份简洁的每日简报，包含以下部分：\n\
             1. **重要事件**（2-4条，每条一句话）\n\
             2. **市场情绪**（正面/中性/负面，并简要说明原因）\n\
             3. **需要关注**（1-2个风险点或机会点）\n\n\
             要求：\n\
             - 简洁客观，不做投资建议\n\
             - 如果新闻较少或不重要，直接说明\"今日无重大事件\"\n\
             - 总字数控制在 200 字以内",
            request.symbol, request.company_name, date, news_text
        ),
        ReportLanguage::En => format!(
            "You are a professional stock analyst assistant. Below is the news list for {} ({}) on {}:\n\n{}\n\
             Please generate a concise daily brief in English, including:\n\
             1. **Key Events** (2-4 items, one sentence each)\n\
             2. **Market Sentiment** (Positive/Neutral/Negative, with brief reason)\n\
             3. **Watch List** (1-2 risk points or opportunities)\n\n\
             Requirements:\n\
             - Concise and objective, no investment advice\n\
             - If news is limited or insignificant, state \"No major events today\"\n\
             - Keep under 200 words",
            request.symbol, request.company_name, date, news_text
        ),
    }
}
