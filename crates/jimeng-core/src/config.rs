//! Immutable configuration built once at startup.
//!
//! Every `from_env` constructor delegates to a `from_lookup` twin taking a
//! variable-lookup closure, so parsing is testable without touching the
//! process environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::error::AppError;
use crate::job::JobKind;
use crate::models::CallOptions;
use crate::retry::RetryPolicy;
use crate::signature::SigningScope;

pub const BASE_URL_CN: &str = "https://jimeng.jianying.com";
pub const BASE_URL_US: &str = "https://dreamina-api.us.capcut.com";
pub const BASE_URL_US_COMMERCE: &str = "https://commerce.us.capcut.com";

pub const ASSISTANT_ID_CN: u64 = 513695;
pub const ASSISTANT_ID_US: u64 = 513641;

pub const DA_VERSION: &str = "3.3.2";
pub const WEB_VERSION: &str = "7.5.0";
pub const AIGC_FEATURES: &str = "app_lip_sync";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Limits and pacing for one [`SmartPoller`](crate::poller::SmartPoller).
#[derive(Debug, Clone, PartialEq)]
pub struct PollingConfig {
    /// Hard cap on probe rounds.
    pub max_poll_count: u32,
    /// Base delay between rounds, scaled per status.
    pub poll_interval: Duration,
    /// Unchanged-count rounds after which a non-empty result set is final.
    pub stable_rounds: u32,
    /// Wall-clock budget after which a non-empty result set is returned.
    pub timeout_seconds: u64,
    /// Item count that ends polling immediately.
    pub expected_item_count: u32,
    pub job_kind: JobKind,
}

impl PollingConfig {
    /// Defaults for a job kind.
    ///
    /// - Image: 900 rounds, 1s interval, 5 stable rounds, 900s, 4 items
    /// - Video: 900 rounds, 2s interval, 5 stable rounds, 1800s, 1 item
    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::Image => Self {
                max_poll_count: 900,
                poll_interval: Duration::from_millis(1000),
                stable_rounds: 5,
                timeout_seconds: 900,
                expected_item_count: 4,
                job_kind: kind,
            },
            JobKind::Video => Self {
                max_poll_count: 900,
                poll_interval: Duration::from_millis(2000),
                stable_rounds: 5,
                timeout_seconds: 1800,
                expected_item_count: 1,
                job_kind: kind,
            },
        }
    }

    /// Round cap, at least one.
    pub fn with_max_poll_count(mut self, max_poll_count: u32) -> Self {
        self.max_poll_count = max_poll_count.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_stable_rounds(mut self, stable_rounds: u32) -> Self {
        self.stable_rounds = stable_rounds;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_expected_item_count(mut self, expected_item_count: u32) -> Self {
        self.expected_item_count = expected_item_count;
        self
    }

    /// Read overrides from environment variables on top of the kind defaults.
    ///
    /// - `JIMENG_POLL_MAX_COUNT`
    /// - `JIMENG_POLL_INTERVAL_MS`
    /// - `JIMENG_POLL_STABLE_ROUNDS`
    /// - `JIMENG_POLL_TIMEOUT_SECS`
    /// - `JIMENG_POLL_EXPECTED_ITEMS`
    pub fn from_env(kind: JobKind) -> Result<Self, AppError> {
        Self::from_lookup(kind, |name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(kind: JobKind, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::for_kind(kind);
        let config = Self {
            max_poll_count: parse_var(&lookup, "JIMENG_POLL_MAX_COUNT", defaults.max_poll_count)?,
            poll_interval: Duration::from_millis(parse_var(
                &lookup,
                "JIMENG_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            stable_rounds: parse_var(&lookup, "JIMENG_POLL_STABLE_ROUNDS", defaults.stable_rounds)?,
            timeout_seconds: parse_var(
                &lookup,
                "JIMENG_POLL_TIMEOUT_SECS",
                defaults.timeout_seconds,
            )?,
            expected_item_count: parse_var(
                &lookup,
                "JIMENG_POLL_EXPECTED_ITEMS",
                defaults.expected_item_count,
            )?,
            job_kind: kind,
        };

        if config.max_poll_count == 0 {
            return Err(AppError::ConfigError(
                "JIMENG_POLL_MAX_COUNT must be at least 1".into(),
            ));
        }
        Ok(config)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self::for_kind(JobKind::Image)
    }
}

// ---------------------------------------------------------------------------
// Region & identity
// ---------------------------------------------------------------------------

/// Deployment region of the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    #[default]
    Cn,
    Us,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Cn => "cn",
            Region::Us => "us",
        }
    }

    /// Value of the `region` query parameter.
    pub fn region_param(&self) -> &'static str {
        match self {
            Region::Cn => "cn",
            Region::Us => "US",
        }
    }

    /// Numeric app id: `aid` in queries and `http_common_info` bodies.
    pub fn assistant_id(&self) -> u64 {
        match self {
            Region::Cn => ASSISTANT_ID_CN,
            Region::Us => ASSISTANT_ID_US,
        }
    }

    /// Base URL serving `uri`; US commerce endpoints live on their own host.
    pub fn base_url_for(&self, uri: &str) -> &'static str {
        match self {
            Region::Cn => BASE_URL_CN,
            Region::Us if uri.starts_with("/commerce/") => BASE_URL_US_COMMERCE,
            Region::Us => BASE_URL_US,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cn" => Ok(Region::Cn),
            "us" => Ok(Region::Us),
            _ => Err(format!("Unknown region: {}", s)),
        }
    }
}

/// Per-process client identifier, generated once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Sent as the `webId` query parameter in the CN region.
    pub web_id: u64,
}

impl ClientIdentity {
    /// Random 19-digit web id.
    pub fn generate() -> Self {
        Self {
            web_id: random_numeric_id(),
        }
    }
}

fn random_numeric_id() -> u64 {
    let (high, _) = Uuid::new_v4().as_u64_pair();
    7_000_000_000_000_000_000 + high % 1_000_000_000_000_000_000
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Configuration shared by every call of a [`RequestClient`](crate::client::RequestClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub region: Region,
    /// Overrides the region's base URL for every endpoint.
    pub base_url: Option<String>,
    pub identity: ClientIdentity,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub signing_scope: SigningScope,
}

impl ClientConfig {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            base_url: None,
            identity: ClientIdentity::generate(),
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            signing_scope: SigningScope::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Read configuration from environment variables.
    ///
    /// - `JIMENG_REGION` (optional, `cn` or `us`, defaults to `cn`)
    /// - `JIMENG_BASE_URL` (optional)
    /// - `JIMENG_MAX_RETRIES` (optional, defaults to 3)
    /// - `JIMENG_RETRY_DELAY_MS` (optional, defaults to 5000)
    /// - `JIMENG_REQUEST_TIMEOUT_SECS` (optional, defaults to 45)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let region = match lookup("JIMENG_REGION") {
            None => Region::default(),
            Some(raw) => raw.parse().map_err(|e: String| {
                AppError::ConfigError(format!("Invalid JIMENG_REGION '{raw}': {e}"))
            })?,
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: parse_var(&lookup, "JIMENG_MAX_RETRIES", defaults.max_retries)?,
            delay: Duration::from_millis(parse_var(
                &lookup,
                "JIMENG_RETRY_DELAY_MS",
                defaults.delay.as_millis() as u64,
            )?),
        };

        let timeout_secs = parse_var(
            &lookup,
            "JIMENG_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "JIMENG_REQUEST_TIMEOUT_SECS must be at least 1".into(),
            ));
        }

        let mut config = Self::new(region)
            .with_retry(retry)
            .with_request_timeout(Duration::from_secs(timeout_secs));
        if let Some(base_url) = lookup("JIMENG_BASE_URL") {
            Url::parse(&base_url).map_err(|e| {
                AppError::ConfigError(format!("Invalid JIMENG_BASE_URL '{base_url}': {e}"))
            })?;
            config = config.with_base_url(base_url);
        }
        Ok(config)
    }

    pub fn base_url_for(&self, uri: &str) -> &str {
        match &self.base_url {
            Some(url) => url,
            None => self.region.base_url_for(uri),
        }
    }

    /// Query parameters attached to every call unless opted out.
    pub fn default_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("aid", self.region.assistant_id().to_string()),
            ("device_platform", "web".to_string()),
            ("region", self.region.region_param().to_string()),
        ];
        if self.region == Region::Cn {
            params.push(("webId", self.identity.web_id.to_string()));
        }
        params.extend([
            ("da_version", DA_VERSION.to_string()),
            ("web_component_open_flag", "1".to_string()),
            ("web_version", WEB_VERSION.to_string()),
            ("aigc_features", AIGC_FEATURES.to_string()),
        ]);
        params
    }

    /// Full URL for `uri`, with default and per-call query parameters.
    pub fn build_url(&self, uri: &str, options: &CallOptions) -> Result<Url, AppError> {
        let raw = format!("{}{}", self.base_url_for(uri), uri);
        let mut url = Url::parse(&raw)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid URL '{raw}': {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            if !options.no_default_params {
                for (key, value) in self.default_params() {
                    query.append_pair(key, &value);
                }
            }
            for (key, value) in &options.params {
                query.append_pair(key, value);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(Region::default())
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(format!(
                "Invalid {name} '{raw}': must be a non-negative integer"
            ))
        }),
    }
}
