use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Url;

use crate::session::{RefreshMode, DEFAULT_EVENT_CAPACITY, MAX_EVENT_CAPACITY};

/// Job board API client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Backend origin the API base paths are appended to
    #[arg(short, long, env = "API_ORIGIN", default_value = "http://localhost:8080")]
    pub origin: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// How concurrent session refreshes are handled (independent, coalesced)
    #[arg(long, env = "REFRESH_MODE", default_value = "independent")]
    pub refresh_mode: String,

    /// Client to send through (auth, public, jobseeker, recruiter, admin, user)
    pub domain: String,

    /// Path relative to the client's base address
    pub path: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// JSON request body
    #[arg(short, long)]
    pub data: Option<String>,

    /// Query parameter as key=value (repeatable)
    #[arg(short, long = "query")]
    pub query: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Scheme, host and port of the backend
    pub api_origin: String,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Session
    pub refresh_mode: RefreshMode,
    pub event_capacity: usize,

    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Configuration with defaults for the given origin
    pub fn new(api_origin: impl Into<String>) -> Self {
        Self {
            api_origin: api_origin.into(),
            http_max_connections: 20,
            http_connect_timeout: 10,
            http_request_timeout: 30,
            refresh_mode: RefreshMode::Independent,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }

    /// Load configuration with priority: CLI > ENV (.env included) > defaults
    pub fn load() -> Result<(Self, CliArgs)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let config = Self::from_args(&args);
        Ok((config, args))
    }

    pub fn from_args(args: &CliArgs) -> Self {
        Self {
            api_origin: args.origin.clone(),

            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            http_connect_timeout: args.connect_timeout,
            http_request_timeout: args.http_timeout,

            refresh_mode: parse_refresh_mode(&args.refresh_mode),
            event_capacity: std::env::var("SESSION_EVENT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_EVENT_CAPACITY),

            log_level: args.log_level.clone(),
            log_format: parse_log_format(&args.log_format),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let origin = Url::parse(&self.api_origin)
            .with_context(|| format!("API_ORIGIN is not a valid URL: {}", self.api_origin))?;

        if !matches!(origin.scheme(), "http" | "https") {
            anyhow::bail!("API_ORIGIN must use http or https: {}", self.api_origin);
        }

        if self.http_connect_timeout == 0 || self.http_request_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        if self.event_capacity == 0 || self.event_capacity > MAX_EVENT_CAPACITY {
            anyhow::bail!(
                "SESSION_EVENT_CAPACITY must be between 1 and {}, got {}",
                MAX_EVENT_CAPACITY,
                self.event_capacity
            );
        }

        Ok(())
    }
}

/// Parse refresh mode from string
pub fn parse_refresh_mode(s: &str) -> RefreshMode {
    match s.to_lowercase().as_str() {
        "coalesced" | "coalesce" | "shared" => RefreshMode::Coalesced,
        _ => RefreshMode::Independent,
    }
}

/// Parse log format from string
pub fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}
