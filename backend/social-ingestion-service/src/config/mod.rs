use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::services::hazard_detector::DEFAULT_VOCABULARY;

const DEFAULT_SERVICE_NAME: &str = "social-ingestion-service";
const DEFAULT_QUEUE: &str = "reports";
const DEFAULT_INTERVAL_MINUTES: u64 = 30;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DEDUP_TTL_DAYS: u64 = 30;
pub const DEFAULT_CACHE_OP_TIMEOUT_MS: u64 = 2_000;
/// Ten years; anything larger is almost certainly a unit mistake.
pub const MAX_DEDUP_TTL_DAYS: u64 = 3_650;
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_BLUESKY_API_BASE: &str = "https://bsky.social/xrpc";
const DEFAULT_BLUESKY_TIMELINE_LIMIT: u32 = 50;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub log_format: LogFormat,
    pub metrics_port: Option<u16>,
    pub broker: BrokerConfig,
    pub cache: CacheConfig,
    pub schedule: ScheduleConfig,
    pub sources: SourcesConfig,
    /// Ordered hazard vocabulary, lower-cased.
    pub hazard_keywords: Vec<String>,
}

#[derive(Clone)]
pub struct BrokerConfig {
    pub url: String,
    pub queue: String,
}

#[derive(Clone)]
pub struct CacheConfig {
    pub url: String,
    pub dedup_ttl: Duration,
    pub op_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SourcesConfig {
    pub fetch_timeout: Duration,
    pub telegram: TelegramConfig,
    pub bluesky: BlueskyConfig,
}

#[derive(Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: String,
    /// Channel usernames to keep, lower-cased without `@`. Empty keeps all.
    pub channels: Vec<String>,
}

#[derive(Clone)]
pub struct BlueskyConfig {
    pub api_base: String,
    pub handle: String,
    pub password: String,
    pub timeline_limit: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let interval_minutes: u64 =
            parse_or(&get, "INGEST_INTERVAL_MINUTES", DEFAULT_INTERVAL_MINUTES)?;
        if interval_minutes == 0 {
            return Err(ConfigError::Invalid {
                var: "INGEST_INTERVAL_MINUTES",
                reason: "must be greater than zero".to_string(),
            });
        }

        let dedup_ttl_days: u64 = parse_or(&get, "DEDUP_TTL_DAYS", DEFAULT_DEDUP_TTL_DAYS)?;
        let dedup_ttl = dedup_ttl_from_days(dedup_ttl_days).ok_or_else(|| ConfigError::Invalid {
            var: "DEDUP_TTL_DAYS",
            reason: format!("must be between 1 and {}", MAX_DEDUP_TTL_DAYS),
        })?;

        let cache_op_timeout_ms: u64 =
            parse_or(&get, "CACHE_OP_TIMEOUT_MS", DEFAULT_CACHE_OP_TIMEOUT_MS)?;
        if cache_op_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                var: "CACHE_OP_TIMEOUT_MS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Text,
            Some(v) if v == "text" => LogFormat::Text,
            Some(v) if v == "json" => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    reason: format!("expected `text` or `json`, got `{}`", other),
                })
            }
        };

        let metrics_port = match get("METRICS_PORT") {
            Some(raw) => Some(parse_value::<u16>("METRICS_PORT", &raw)?),
            None => None,
        };

        let hazard_keywords = match get("HAZARD_KEYWORDS") {
            Some(raw) => {
                let keywords = split_list(&raw);
                if keywords.is_empty() {
                    return Err(ConfigError::Invalid {
                        var: "HAZARD_KEYWORDS",
                        reason: "no usable terms".to_string(),
                    });
                }
                keywords
            }
            None => DEFAULT_VOCABULARY.iter().map(|t| t.to_string()).collect(),
        };

        let channels = get("TELEGRAM_CHANNELS")
            .map(|raw| {
                split_list(&raw)
                    .into_iter()
                    .map(|c| c.trim_start_matches('@').to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            service_name: get("SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            log_format,
            metrics_port,
            broker: BrokerConfig {
                url: required("RABBITMQ_URL")?,
                queue: get("REPORTS_QUEUE").unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
            },
            cache: CacheConfig {
                url: required("REDIS_URL")?,
                dedup_ttl,
                op_timeout: Duration::from_millis(cache_op_timeout_ms),
            },
            schedule: ScheduleConfig {
                interval: Duration::from_secs(interval_minutes * 60),
            },
            sources: SourcesConfig {
                fetch_timeout: Duration::from_secs(parse_or(
                    &get,
                    "FETCH_TIMEOUT_SECS",
                    DEFAULT_FETCH_TIMEOUT_SECS,
                )?),
                telegram: TelegramConfig {
                    api_base: get("TELEGRAM_API_BASE")
                        .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
                    bot_token: required("TELEGRAM_BOT_TOKEN")?,
                    channels,
                },
                bluesky: BlueskyConfig {
                    api_base: get("BLUESKY_API_BASE")
                        .unwrap_or_else(|| DEFAULT_BLUESKY_API_BASE.to_string()),
                    handle: required("BLUESKY_HANDLE")?,
                    password: required("BLUESKY_PASSWORD")?,
                    timeline_limit: parse_or(
                        &get,
                        "BLUESKY_TIMELINE_LIMIT",
                        DEFAULT_BLUESKY_TIMELINE_LIMIT,
                    )?,
                },
            },
            hazard_keywords,
        })
    }
}

/// Dedup record lifetime for a whole number of days. `None` for zero or for
/// more than [`MAX_DEDUP_TTL_DAYS`].
pub fn dedup_ttl_from_days(days: u64) -> Option<Duration> {
    if days == 0 || days > MAX_DEDUP_TTL_DAYS {
        return None;
    }
    days.checked_mul(24 * 60 * 60).map(Duration::from_secs)
}

fn parse_value<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

fn parse_or<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        Some(raw) => parse_value(var, &raw),
        None => Ok(default),
    }
}

/// Comma-separated list: trimmed, lower-cased, blanks and repeats dropped,
/// first-seen order kept.
fn split_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in raw.split(',') {
        let item = item.trim().to_lowercase();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Hide the userinfo part of a connection URL.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("url", &redact_url(&self.url))
            .field("queue", &self.queue)
            .finish()
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("url", &redact_url(&self.url))
            .field("dedup_ttl", &self.dedup_ttl)
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_base", &self.api_base)
            .field("bot_token", &"<redacted>")
            .field("channels", &self.channels)
            .finish()
    }
}

impl fmt::Debug for BlueskyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlueskyConfig")
            .field("api_base", &self.api_base)
            .field("handle", &self.handle)
            .field("password", &"<redacted>")
            .field("timeline_limit", &self.timeline_limit)
            .finish()
    }
}
