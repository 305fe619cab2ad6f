use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Where digest runs send their log lines.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter: String,
    pub service_name: String,
    pub environment: String,
    pub loki_enabled: bool,
    pub loki_url: Option<String>,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            filter: var("RUST_LOG").unwrap_or_else(|| DEFAULT_FILTER.to_string()),
            service_name: var("SERVICE_NAME").unwrap_or_else(|| "stock-digest".to_string()),
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            loki_enabled: var("LOKI_ENABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")),
            loki_url: var("LOKI_URL"),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match (self.loki_enabled, self.loki_url.as_deref()) {
            (true, None) => Err("LOKI_ENABLED=true requires LOKI_URL".to_string()),
            _ => Ok(()),
        }
    }

    /// The Loki endpoint, only when shipping was asked for.
    fn loki_target(&self) -> Option<&str> {
        self.loki_enabled.then_some(self.loki_url.as_deref()).flatten()
    }

    /// An unparsable `RUST_LOG` degrades to `info` rather than silencing the run.
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Installs the global subscriber: console output always, plus Loki when
/// configured and compiled in.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    #[cfg(feature = "loki")]
    let loki_layer = match config.loki_target() {
        Some(target) => {
            let (layer, task) = tracing_loki::builder()
                .label("service", &config.service_name)?
                .label("environment", &config.environment)?
                .build_url(url::Url::parse(target)?)?;
            // Background shipper; needs the tokio runtime.
            tokio::spawn(task);
            Some(layer)
        }
        None => None,
    };

    let registry = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(tracing_subscriber::fmt::layer().with_target(false));

    #[cfg(feature = "loki")]
    registry.with(loki_layer).try_init()?;
    #[cfg(not(feature = "loki"))]
    registry.try_init()?;

    match config.loki_target() {
        Some(target) if cfg!(feature = "loki") => {
            tracing::info!("🪵 {} logs shipping to {} ({})", config.service_name, target, config.environment)
        }
        Some(_) => tracing::warn!("LOKI_ENABLED is set but this build has no loki feature; console only"),
        None => tracing::info!("🪵 {} logging to console ({})", config.service_name, config.environment),
    }
    Ok(())
}
