use std::collections::HashSet;
use std::env;
use std::time::Duration;

/// Process configuration, read once at startup from the environment
/// (and `.env` via `dotenv`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub port: u16,
    pub auth: AuthConfig,
    pub chat: ChatConfig,
    pub uploads: UploadConfig,
    pub lookup: LookupConfig,
}

/// How bearer credentials are verified.
#[derive(Debug, Clone)]
pub enum AuthConfig {
    /// HS256 tokens signed with a shared secret.
    Secret(String),
    /// Asymmetric tokens validated against a JWKS endpoint.
    Jwks { url: String, api_key: Option<String> },
}

/// Realtime protocol tuning.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub max_content_chars: usize,
    pub send_rate_limit: usize,
    pub send_rate_window: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub outbound_buffer: usize,
    pub rate_limit_idle: Duration,
    pub rate_limit_max_users: u64,
    pub history_default_limit: u64,
    pub history_max_limit: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_content_chars: 4000,
            send_rate_limit: 5,
            send_rate_window: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(75),
            outbound_buffer: 256,
            rate_limit_idle: Duration::from_secs(300),
            rate_limit_max_users: 100_000,
            history_default_limit: 50,
            history_max_limit: 100,
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_content_chars: parse_env("CHAT_MAX_CONTENT_CHARS", d.max_content_chars),
            send_rate_limit: parse_env("CHAT_SEND_RATE_LIMIT", d.send_rate_limit),
            send_rate_window: parse_duration_secs("CHAT_SEND_RATE_WINDOW_SECS", 1),
            heartbeat_interval: parse_duration_secs("CHAT_HEARTBEAT_INTERVAL_SECS", 30),
            heartbeat_timeout: parse_duration_secs("CHAT_HEARTBEAT_TIMEOUT_SECS", 75),
            outbound_buffer: parse_env("CHAT_OUTBOUND_BUFFER", d.outbound_buffer),
            rate_limit_idle: parse_duration_secs("CHAT_RATE_LIMIT_IDLE_SECS", 300),
            rate_limit_max_users: parse_env("CHAT_RATE_LIMIT_MAX_USERS", d.rate_limit_max_users),
            history_default_limit: parse_env(
                "CHAT_HISTORY_DEFAULT_LIMIT",
                d.history_default_limit,
            ),
            history_max_limit: parse_env("CHAT_HISTORY_MAX_LIMIT", d.history_max_limit),
        }
    }

    /// Clamp a requested page size into `1..=history_max_limit`.
    pub fn page_limit(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.history_default_limit)
            .clamp(1, self.history_max_limit)
    }
}

/// Attachment upload policy. Blob bytes live in external storage; only
/// metadata passes through this service.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_bytes: u64,
    pub allowed_extensions: HashSet<String>,
    pub public_base_url: String,
}

const DEFAULT_EXTENSIONS: &str = "jpg,jpeg,png,gif,pdf,doc,docx,xls,xlsx,txt,zip";

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            allowed_extensions: parse_extensions(DEFAULT_EXTENSIONS),
            public_base_url: "/uploads/rt_files".to_string(),
        }
    }
}

impl UploadConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_bytes: parse_env("UPLOAD_MAX_BYTES", d.max_bytes),
            allowed_extensions: env::var("UPLOAD_ALLOWED_EXTENSIONS")
                .map(|v| parse_extensions(&v))
                .unwrap_or(d.allowed_extensions),
            public_base_url: env::var("UPLOAD_PUBLIC_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(d.public_base_url),
        }
    }
}

/// Rate limit for the user lookup endpoint.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub limit: usize,
    pub window: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let auth = match (env::var("JWKS_URL"), env::var("JWT_SECRET")) {
            (Ok(url), _) => AuthConfig::Jwks {
                url,
                api_key: env::var("JWKS_API_KEY").ok(),
            },
            (Err(_), Ok(secret)) => AuthConfig::Secret(secret),
            _ => return Err("Either JWKS_URL or JWT_SECRET must be set".to_string()),
        };

        Ok(Self {
            database_url,
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            port: parse_env("PORT", 8080),
            auth,
            chat: ChatConfig::from_env(),
            uploads: UploadConfig::from_env(),
            lookup: LookupConfig {
                limit: parse_env("LOOKUP_RATE_LIMIT", 10),
                window: parse_duration_secs("LOOKUP_RATE_WINDOW_SECS", 60),
            },
        })
    }
}

fn parse_extensions(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

fn parse_env<T: std::str::FromStr>(env_var: &str, default: T) -> T {
    env::var(env_var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs(env_var: &str, default: u64) -> Duration {
    Duration::from_secs(parse_env(env_var, default))
}
