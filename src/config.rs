//! Server settings, read once from the environment at start-up.
//!
//! Every value has a default so a bare `cargo run` works against a local
//! SQLite file with no LLM backends configured (all replies come from the
//! offline fallback in that case).

use std::env;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite://chatbot.db";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ALLOWED_EXTENSIONS: &str =
    "txt,md,pdf,csv,json,html,xml,js,ts,py,rs,java,c,cpp,h,yaml,yml,docx";
/// Ten years.
const MAX_SESSION_TTL_HOURS: i64 = 87_600;

/// Connection details for one LLM provider.
#[derive(Clone)]
pub struct BackendSettings {
    /// `None` means the backend is not configured and is never attempted.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl BackendSettings {
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Clone)]
pub struct FileStorageSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct UploadSettings {
    pub max_files: usize,
    pub max_file_bytes: usize,
    /// Lowercase, without the leading dot.
    pub allowed_extensions: Vec<String>,
}

impl UploadSettings {
    pub fn is_allowed(&self, filename: &str) -> bool {
        std::path::Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.allowed_extensions.iter().any(|a| *a == ext))
    }
}

#[derive(Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub cors_origins: Vec<String>,
    pub session_ttl_hours: i64,
    pub anthropic: BackendSettings,
    pub openai: BackendSettings,
    /// Backend id to try first, when it is configured.
    pub preferred_backend: Option<String>,
    pub llm_timeout: Duration,
    pub llm_max_tokens: u32,
    pub files: FileStorageSettings,
    pub upload: UploadSettings,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid value for {key}: {value:?}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
}

impl Settings {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let anthropic = BackendSettings {
            api_key: get("ANTHROPIC_API_KEY"),
            base_url: get("ANTHROPIC_BASE_URL").unwrap_or(DEFAULT_ANTHROPIC_BASE_URL.to_owned()),
            model: get("ANTHROPIC_MODEL").unwrap_or(DEFAULT_ANTHROPIC_MODEL.to_owned()),
        };
        let openai = BackendSettings {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or(DEFAULT_OPENAI_BASE_URL.to_owned()),
            model: get("OPENAI_MODEL").unwrap_or(DEFAULT_OPENAI_MODEL.to_owned()),
        };

        let llm_timeout = Duration::from_secs(parse(&get, "LLM_TIMEOUT_SECS", 30u64)?);

        let files = FileStorageSettings {
            api_key: get("FILES_API_KEY").or_else(|| anthropic.api_key.clone()),
            base_url: get("FILES_API_BASE_URL").unwrap_or_else(|| anthropic.base_url.clone()),
            timeout: llm_timeout,
        };

        let upload = UploadSettings {
            max_files: parse(&get, "MAX_UPLOAD_FILES", 10usize)?,
            max_file_bytes: parse(&get, "MAX_UPLOAD_FILE_BYTES", 10 * 1024 * 1024usize)?,
            allowed_extensions: split_list(
                &get("ALLOWED_FILE_EXTENSIONS").unwrap_or(DEFAULT_ALLOWED_EXTENSIONS.to_owned()),
            )
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect(),
        };

        Ok(Settings {
            database_url: get("DATABASE_URL").unwrap_or(DEFAULT_DATABASE_URL.to_owned()),
            bind_addr: parse(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            cors_origins: split_list(
                &get("CORS_ORIGINS").unwrap_or(DEFAULT_CORS_ORIGINS.to_owned()),
            ),
            session_ttl_hours: parse_in_range(
                &get,
                "SESSION_TTL_HOURS",
                168i64,
                1..=MAX_SESSION_TTL_HOURS,
            )?,
            anthropic,
            openai,
            preferred_backend: get("PREFERRED_LLM_BACKEND").map(|v| v.to_ascii_lowercase()),
            llm_timeout,
            llm_max_tokens: parse(&get, "LLM_MAX_TOKENS", 1024u32)?,
            files,
            upload,
        })
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError { key, value }),
    }
}

fn parse_in_range<T, G>(
    get: &G,
    key: &'static str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + ToString,
    G: Fn(&str) -> Option<String>,
{
    let value = parse(get, key, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError {
            key,
            value: value.to_string(),
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
