use crate::error::{AppError, Result};

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
pub const CLAUDE_MODEL: &str = "claude-3-haiku-20240307";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default lookback for velocity analysis (hours).
pub const DEFAULT_WINDOW_HOURS: u32 = 3;

/// Default number of ranked entities returned.
pub const DEFAULT_TOP_N: usize = 10;

/// Quantile used as the per-batch outlier ceiling.
pub const CLIP_QUANTILE: f64 = 0.99;

/// Periodic velocity analysis interval (seconds).
pub const ANALYZER_INTERVAL_SECS: u64 = 900;

/// Attempts per idea generation call before giving up.
pub const GENERATION_MAX_ATTEMPTS: u32 = 3;

/// Backoff between generation attempts, in milliseconds. Last value repeats.
pub const GENERATION_BACKOFF_MS: &[u64] = &[500, 1000];

/// Model backend request timeout (seconds).
pub const MODEL_HTTP_TIMEOUT_SECS: u64 = 60;

pub const MODEL_MAX_TOKENS: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelClientKind {
    Stub,
    Claude,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// LOG_FORMAT=json emits one JSON object per line.
    pub log_format: LogFormat,
    pub db_path: String,
    pub api_port: u16,
    /// Lookback for the periodic analyzer (VELOCITY_WINDOW_HOURS)
    pub window_hours: u32,
    /// Ranked entries kept by the periodic analyzer (VELOCITY_TOP_N)
    pub top_n: usize,
    /// Which idea generation backend to construct (MODEL_CLIENT=stub|claude)
    pub model_client: ModelClientKind,
    pub anthropic_api_key: Option<String>,
    pub anthropic_api_url: String,
    pub claude_model: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup so parsing is testable without
    /// touching the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_format = match get("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{other}'"
                )))
            }
        };

        let model_client = match get("MODEL_CLIENT").as_deref().map(str::trim) {
            None | Some("") | Some("stub") => ModelClientKind::Stub,
            Some("claude") => ModelClientKind::Claude,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "MODEL_CLIENT must be 'stub' or 'claude', got '{other}'"
                )))
            }
        };

        let anthropic_api_key = get("ANTHROPIC_API_KEY").filter(|k| !k.trim().is_empty());
        if model_client == ModelClientKind::Claude && anthropic_api_key.is_none() {
            return Err(AppError::Config(
                "ANTHROPIC_API_KEY is required when MODEL_CLIENT=claude".to_string(),
            ));
        }

        let window_hours = get("VELOCITY_WINDOW_HOURS")
            .map(|v| {
                v.trim()
                    .parse::<u32>()
                    .map_err(|_| AppError::Config("VELOCITY_WINDOW_HOURS must be an integer".to_string()))
            })
            .transpose()?
            .unwrap_or(DEFAULT_WINDOW_HOURS);

        let top_n = get("VELOCITY_TOP_N")
            .map(|v| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| AppError::Config("VELOCITY_TOP_N must be an integer".to_string()))
            })
            .transpose()?
            .unwrap_or(DEFAULT_TOP_N);

        // Same rule the CLI and HTTP parameters go through.
        crate::types::AnalysisParams::new(window_hours, top_n)?;

        Ok(Self {
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            db_path: get("DB_PATH").unwrap_or_else(|| "trends.db".to_string()),
            api_port: get("API_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            window_hours,
            top_n,
            model_client,
            anthropic_api_key,
            anthropic_api_url: get("ANTHROPIC_API_URL")
                .unwrap_or_else(|| ANTHROPIC_API_URL.to_string()),
            claude_model: get("CLAUDE_MODEL").unwrap_or_else(|| CLAUDE_MODEL.to_string()),
        })
    }
}
