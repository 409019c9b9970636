//! # Timing configuration
//!
//! All deadlines and retry bounds used by the driver, the connectivity gate and the bridge loop. The
//! defaults match the behavior expected by the ESP-AT firmware at 115200 baud.
//!
//! ````
//! use esp_at_mqtt::config::Config;
//!
//! let config = Config::default().prompt_timeout_ms(2_000).max_wifi_attempts(Some(20));
//! assert_eq!(100, config.response_timeout_ms);
//! assert_eq!(2_000, config.prompt_timeout_ms);
//! ````

/// Window for collecting a command response
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u32 = 100;

/// Max. wait for the '>' prompt of a raw publish
pub const DEFAULT_PROMPT_TIMEOUT_MS: u32 = 5_000;

/// Initial delay between two WIFI association checks
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 500;

/// Upper bound of the exponential poll backoff
pub const DEFAULT_MAX_POLL_INTERVAL_MS: u32 = 8_000;

/// Interval of the uptime publish
pub const DEFAULT_REPORT_INTERVAL_MS: u32 = 60_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Window for collecting a command response in ms
    pub response_timeout_ms: u32,

    /// Max. wait for the publish prompt in ms
    pub prompt_timeout_ms: u32,

    /// Initial delay between WIFI association checks in ms. Doubled after every failed check.
    pub poll_interval_ms: u32,

    /// Upper bound of the poll delay in ms
    pub max_poll_interval_ms: u32,

    /// Max. number of WIFI association checks. None => unbounded
    pub max_wifi_attempts: Option<u32>,

    /// Interval of the uptime publish in ms
    pub report_interval_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            prompt_timeout_ms: DEFAULT_PROMPT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_interval_ms: DEFAULT_MAX_POLL_INTERVAL_MS,
            max_wifi_attempts: None,
            report_interval_ms: DEFAULT_REPORT_INTERVAL_MS,
        }
    }
}

impl Config {
    pub fn response_timeout_ms(mut self, timeout: u32) -> Self {
        self.response_timeout_ms = timeout;
        self
    }

    pub fn prompt_timeout_ms(mut self, timeout: u32) -> Self {
        self.prompt_timeout_ms = timeout;
        self
    }

    /// Sets the initial and the max. poll delay. The max. delay is raised to the initial one if lower.
    pub fn poll_interval_ms(mut self, initial: u32, max: u32) -> Self {
        self.poll_interval_ms = initial;
        self.max_poll_interval_ms = max.max(initial);
        self
    }

    pub fn max_wifi_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_wifi_attempts = attempts;
        self
    }

    pub fn report_interval_ms(mut self, interval: u32) -> Self {
        self.report_interval_ms = interval;
        self
    }
}
