use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};

use stock_digest::config::{AnthropicConfig, DigestConfig, FinnhubConfig, SmtpConfig};
use stock_digest::errors::AppError;
use stock_digest::external::anthropic::AnthropicSummarizer;
use stock_digest::external::finnhub::FinnhubSource;
use stock_digest::external::smtp::SmtpMailer;
use stock_digest::external::yahoo::YahooProvider;
use stock_digest::logging::{init_logging, LoggingConfig};
use stock_digest::services::digest_service::DigestPipeline;
use stock_digest::services::news_service::NewsFetcher;
use stock_digest::services::notification_service::Mailer;
use stock_digest::services::rate_limiter::RateLimiter;

#[derive(Parser, Debug)]
#[command(name = "stock-digest")]
#[command(about = "Fetch, summarize and email a daily stock news digest", long_about = None)]
struct Args {
    /// Process a single symbol (or the first configured one) and tag the subject [TEST]
    #[arg(long = "test", value_name = "SYMBOL")]
    test: Option<Option<String>>,

    /// Run every stage but skip delivery and print the report
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = init_logging(LoggingConfig::from_env()) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("❌ {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> anyhow::Result<i32> {
    let test_mode = args.test.is_some();
    let mut config = DigestConfig::from_env();
    if let Some(symbol) = &args.test {
        config = config.with_single_symbol(symbol.as_deref());
    }
    config.validate()?;
    let config = Arc::new(config);

    info!(
        "📋 Symbols: {} | recipients: {} | test mode: {} | dry run: {}",
        config.symbols.join(", "),
        config.recipients.len(),
        test_mode,
        args.dry_run
    );

    let finnhub = FinnhubSource::new(&FinnhubConfig::from_env()?, config.request_timeout)
        .map_err(AppError::from)?;
    let yahoo = Arc::new(
        YahooProvider::new(config.request_timeout, config.news_cap).map_err(AppError::from)?,
    );
    let limiter = Arc::new(RateLimiter::new(
        config.primary_calls_per_window,
        config.primary_window,
    ));
    let fetcher = Arc::new(NewsFetcher::from_config(
        &config,
        Arc::new(finnhub),
        yahoo.clone(),
        limiter,
    ));

    let summarizer = AnthropicSummarizer::new(AnthropicConfig::from_env()?, config.summary_timeout)
        .map_err(AppError::from)?;

    let mailer: Option<Arc<dyn Mailer>> = if args.dry_run {
        None
    } else {
        Some(Arc::new(SmtpMailer::new(&SmtpConfig::from_env()?)?))
    };

    let pipeline = DigestPipeline::new(config, fetcher, yahoo, Arc::new(summarizer), mailer)
        .with_test_mode(test_mode);

    let run = pipeline.run(Utc::now()).await;

    info!(
        "📊 Run report: {}",
        serde_json::to_string(&run.run_report).context("Failed to serialize run report")?
    );

    if args.dry_run {
        println!("Subject: {}\n", run.email.subject);
        println!("{}", run.email.text_body);
    }

    Ok(run.run_report.exit_code())
}
