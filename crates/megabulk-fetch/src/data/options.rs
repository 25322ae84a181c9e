use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default provider API endpoint.
pub const DEFAULT_API_URL: &str = "https://g.api.mega.co.nz";

/// Where integrity verification runs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum VerifyMode {
    /// On the blocking thread pool of the current process.
    #[default]
    InProcess,
    /// In a child process: `<program> verify <path> --key <hex> --nonce <hex> --tag <hex>`.
    Subprocess { program: PathBuf },
}

/// Configuration for a download run.
///
/// Durations are written as whole seconds (`*_secs` keys) when (de)serialized.
///
/// # Examples
///
/// ```
/// use megabulk_fetch::RunOptions;
/// use std::time::Duration;
///
/// let options = RunOptions::default()
///     .max_transferring(2)
///     .inactivity_timeout(Duration::from_secs(15));
/// assert_eq!(options.max_probing, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Provider API base URL.
    pub api_url: String,

    /// Upper bound on outstanding fetch-URL requests (`finding-proxy` tasks).
    pub max_probing: usize,

    /// Upper bound on concurrent transfers (`requesting-stream` plus `downloading` tasks).
    pub max_transferring: usize,

    /// Number of proxy workers.
    pub workers: usize,

    #[serde(rename = "probe_timeout_secs", with = "secs")]
    pub probe_timeout: Duration,

    /// Sliding timeout between two received chunks of a transfer.
    #[serde(rename = "inactivity_timeout_secs", with = "secs")]
    pub inactivity_timeout: Duration,

    #[serde(rename = "proxy_cooldown_secs", with = "secs")]
    pub proxy_cooldown: Duration,

    #[serde(rename = "rate_limit_cooldown_secs", with = "secs")]
    pub rate_limit_cooldown: Duration,

    /// Failures after which a proxy is quarantined.
    pub proxy_failure_threshold: u32,

    /// Pause between proxy-list fetches that yield nothing new.
    #[serde(rename = "refill_retry_delay_secs", with = "secs")]
    pub refill_retry_delay: Duration,

    /// Fruitless proxy-list fetches before giving up with `ProxyExhaustion`.
    pub max_refill_attempts: u32,

    #[serde(rename = "refresh_interval_secs", with = "secs")]
    pub refresh_interval: Duration,

    /// Integrity failures tolerated per file before it is marked failed.
    pub max_integrity_failures: u32,

    pub verify: VerifyMode,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            max_probing: 50,
            max_transferring: 6,
            workers: 50,
            probe_timeout: Duration::from_secs(10),
            inactivity_timeout: Duration::from_secs(30),
            proxy_cooldown: Duration::from_secs(10 * 60),
            rate_limit_cooldown: Duration::from_secs(10 * 60),
            proxy_failure_threshold: 5,
            refill_retry_delay: Duration::from_secs(5 * 60),
            max_refill_attempts: 12,
            refresh_interval: Duration::from_secs(60 * 60),
            max_integrity_failures: 3,
            verify: VerifyMode::InProcess,
        }
    }
}

impl RunOptions {
    #[must_use]
    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    #[must_use]
    pub fn max_probing(mut self, max_probing: usize) -> Self {
        self.max_probing = max_probing;
        self
    }

    #[must_use]
    pub fn max_transferring(mut self, max_transferring: usize) -> Self {
        self.max_transferring = max_transferring;
        self
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    #[must_use]
    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    #[must_use]
    pub fn proxy_cooldown(mut self, cooldown: Duration) -> Self {
        self.proxy_cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn rate_limit_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit_cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn proxy_failure_threshold(mut self, threshold: u32) -> Self {
        self.proxy_failure_threshold = threshold;
        self
    }

    #[must_use]
    pub fn refill_retry_delay(mut self, delay: Duration) -> Self {
        self.refill_retry_delay = delay;
        self
    }

    #[must_use]
    pub fn max_refill_attempts(mut self, attempts: u32) -> Self {
        self.max_refill_attempts = attempts;
        self
    }

    #[must_use]
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    #[must_use]
    pub fn max_integrity_failures(mut self, failures: u32) -> Self {
        self.max_integrity_failures = failures;
        self
    }

    #[must_use]
    pub fn verify(mut self, mode: VerifyMode) -> Self {
        self.verify = mode;
        self
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
