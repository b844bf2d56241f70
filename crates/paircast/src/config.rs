//! Configuration loading and validation.
//!
//! Settings come from a TOML file (path supplied on the command line) with
//! environment overrides for addresses and secrets. Numeric knobs go through
//! pure validation helpers exactly once at startup: a usable value passes
//! through, anything invalid falls back to the named default with a warning.
//! Zero is a meaningful value for the cycle knobs (it means unbounded), so
//! validation never manufactures it from bad input.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_GLOBAL_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_GLOBAL_RETRY: u32 = 3;
pub const DEFAULT_GLOBAL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_INNER_RETRY: u32 = 3;
pub const DEFAULT_INNER_INTERVAL_SECS: u64 = 5;

const DEFAULT_STORE_URL: &str = "postgres://localhost:5432/paircast";
const DEFAULT_TOP_LIMIT: u32 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TEMPLATE: &str = "Top pair by compound volume: {pair} ({volume}) on {venues}";
const DEFAULT_VENUES_LIMIT: u32 = 5;

/// Raw file shape. Every field is optional so a partial file works and
/// validation owns the fallbacks. Numeric knobs stay raw TOML values here:
/// a wrong-typed value must reach the validation helpers (warn + default)
/// instead of failing the whole parse.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    store: RawStore,
    #[serde(default)]
    endpoint: RawEndpoint,
    #[serde(default)]
    message: RawMessage,
    #[serde(default)]
    cycle: RawCycle,
}

#[derive(Debug, Default, Deserialize)]
struct RawStore {
    url: Option<String>,
    top_limit: Option<toml::Value>,
    connect_timeout: Option<toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEndpoint {
    url: Option<String>,
    request_timeout: Option<toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMessage {
    template: Option<String>,
    venues_limit: Option<toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCycle {
    global_timeout: Option<toml::Value>,
    global_retry: Option<toml::Value>,
    global_interval: Option<toml::Value>,
    inner_retry: Option<toml::Value>,
    inner_interval: Option<toml::Value>,
}

/// Validated budget and retry settings for one run.
///
/// Built once at startup and read-only thereafter; the orchestrator never
/// mutates it between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSettings {
    /// Wall-clock budget for the whole run, in seconds. 0 = unbounded.
    pub global_timeout: u64,
    /// Outer attempt limit (one gather-then-publish per attempt). 0 = unbounded.
    pub global_retry: u32,
    /// Sleep between outer attempts, in seconds.
    pub global_interval: u64,
    /// Inner attempt limit (send wrap and record retries). 0 = unbounded.
    pub inner_retry: u32,
    /// Sleep between inner attempts, in seconds.
    pub inner_interval: u64,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            global_timeout: DEFAULT_GLOBAL_TIMEOUT_SECS,
            global_retry: DEFAULT_GLOBAL_RETRY,
            global_interval: DEFAULT_GLOBAL_INTERVAL_SECS,
            inner_retry: DEFAULT_INNER_RETRY,
            inner_interval: DEFAULT_INNER_INTERVAL_SECS,
        }
    }
}

/// Document store connection settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Postgres URL. `PAIRCAST_DB_URL` overrides the file value.
    pub url: String,
    /// How many ranked pairs the ranking query fetches.
    pub top_limit: u32,
    /// Connect timeout in seconds.
    pub connect_timeout: u64,
}

/// Posting endpoint settings. The bearer token never lives in the file;
/// it comes from `PAIRCAST_ENDPOINT_TOKEN` only.
#[derive(Debug, Clone)]
pub struct EndpointSettings {
    pub url: String,
    pub token: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
}

/// Message rendering settings.
#[derive(Debug, Clone)]
pub struct MessageSettings {
    /// Template with `{pair}`, `{volume}` and `{venues}` placeholders.
    pub template: String,
    /// Most venues ever named in one message.
    pub venues_limit: u32,
}

/// Top-level validated configuration.
#[derive(Debug, Clone)]
pub struct PaircastConfig {
    pub store: StoreSettings,
    pub endpoint: EndpointSettings,
    pub message: MessageSettings,
    pub cycle: CycleSettings,
}

impl Default for PaircastConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default())
    }
}

impl PaircastConfig {
    /// Load and validate configuration from `path`.
    ///
    /// A missing file is not an error: it logs a warning and every setting
    /// takes its default. A file that exists but does not parse is an error,
    /// since silently ignoring a present config hides real mistakes.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str::<RawConfig>(&text)
                .with_context(|| format!("invalid TOML in {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found, using defaults");
                RawConfig::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawConfig) -> Self {
        let store = StoreSettings {
            url: env_or("PAIRCAST_DB_URL", raw.store.url, DEFAULT_STORE_URL),
            top_limit: checked_count("store.top_limit", raw.store.top_limit, DEFAULT_TOP_LIMIT),
            connect_timeout: checked_secs(
                "store.connect_timeout",
                raw.store.connect_timeout,
                DEFAULT_CONNECT_TIMEOUT_SECS,
            ),
        };
        let endpoint = EndpointSettings {
            url: raw.endpoint.url.unwrap_or_default(),
            token: std::env::var("PAIRCAST_ENDPOINT_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            request_timeout: checked_secs(
                "endpoint.request_timeout",
                raw.endpoint.request_timeout,
                DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
        };
        let message = MessageSettings {
            template: raw
                .message
                .template
                .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
            venues_limit: checked_count(
                "message.venues_limit",
                raw.message.venues_limit,
                DEFAULT_VENUES_LIMIT,
            ),
        };
        let cycle = CycleSettings {
            global_timeout: checked_secs(
                "cycle.global_timeout",
                raw.cycle.global_timeout,
                DEFAULT_GLOBAL_TIMEOUT_SECS,
            ),
            global_retry: checked_count(
                "cycle.global_retry",
                raw.cycle.global_retry,
                DEFAULT_GLOBAL_RETRY,
            ),
            global_interval: checked_secs(
                "cycle.global_interval",
                raw.cycle.global_interval,
                DEFAULT_GLOBAL_INTERVAL_SECS,
            ),
            inner_retry: checked_count(
                "cycle.inner_retry",
                raw.cycle.inner_retry,
                DEFAULT_INNER_RETRY,
            ),
            inner_interval: checked_secs(
                "cycle.inner_interval",
                raw.cycle.inner_interval,
                DEFAULT_INNER_INTERVAL_SECS,
            ),
        };
        Self {
            store,
            endpoint,
            message,
            cycle,
        }
    }
}

/// Environment value when set and non-empty, file value when present,
/// default otherwise.
fn env_or(var: &str, file_value: Option<String>, default: &str) -> String {
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => v,
        _ => file_value.unwrap_or_else(|| default.to_string()),
    }
}

/// Validate a count-style knob (retry limits, row limits).
///
/// Non-negative integers within range pass through, zero included (it is the
/// unbounded sentinel for retry limits). Anything else, negative or not an
/// integer at all, logs a warning and returns the named default. Absent
/// values take the default without noise.
pub fn checked_count(key: &str, raw: Option<toml::Value>, default: u32) -> u32 {
    match raw {
        None => default,
        Some(toml::Value::Integer(v)) if (0..=i64::from(u32::MAX)).contains(&v) => v as u32,
        Some(v) => {
            warn!(key, value = %v, default, "invalid count in config, using default");
            default
        }
    }
}

/// Validate a seconds-valued knob (timeouts, intervals). Same policy as
/// [`checked_count`].
pub fn checked_secs(key: &str, raw: Option<toml::Value>, default: u64) -> u64 {
    match raw {
        None => default,
        Some(toml::Value::Integer(v)) if v >= 0 => v as u64,
        Some(v) => {
            warn!(key, value = %v, default, "invalid duration in config, using default");
            default
        }
    }
}
