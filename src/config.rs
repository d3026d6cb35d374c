//! Engine configuration from environment variables
//!
//! All options are flat `KEY=value` pairs, usually loaded from `.env` by the
//! binaries before calling [`StatsConfig::from_env`].

use crate::transfer::queue::DeliveryConfig;
use std::env;
use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Where the tick histogram reads its data from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickSource {
    /// Latest snapshot pushed on the ticks subject
    Bus,
    /// Fresh request to the tick socket every cycle
    Socket,
}

#[derive(Debug, Clone)]
pub struct StatsConfig {
    pub mongo_uri: String,
    pub mongo_db: String,
    pub scores_collection: String,
    pub admin_scores_collection: String,

    pub services_host: String,
    pub tick_port: u16,
    pub revenues_port: u16,

    pub nats_url: String,
    pub subject_ticks: String,
    pub subject_scores: String,
    pub subject_revenues: String,

    /// Output channel id (required)
    pub stats_channel_id: u64,
    pub access_token: Option<String>,

    pub poll_interval: Duration,
    pub cycle_deadline: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,

    pub tick_source: TickSource,
    pub cleanup_on_start: bool,
}

impl StatsConfig {
    /// Load configuration from the process environment
    ///
    /// Required:
    /// - `STATS_CHANNEL_ID`
    /// - `MONGO_URI`, or all of `MONGO_USERNAME`, `MONGO_PSWD`, `MONGO_URL`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let stats_channel_id = vars
            .required("STATS_CHANNEL_ID")?
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue("STATS_CHANNEL_ID must be a numeric id".to_string()))?;

        let mongo_uri = match vars.get("MONGO_URI") {
            Some(uri) => uri,
            None => {
                let user = vars.required("MONGO_USERNAME")?;
                let password = vars.required("MONGO_PSWD")?;
                let host = vars.required("MONGO_URL")?;
                format!(
                    "mongodb+srv://{}:{}@{}",
                    quote_plus(&user),
                    quote_plus(&password),
                    host
                )
            }
        };

        let tick_source = match vars.text("TICK_SOURCE", "bus").to_lowercase().as_str() {
            "bus" => TickSource::Bus,
            "socket" => TickSource::Socket,
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "TICK_SOURCE must be 'bus' or 'socket', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            mongo_uri,
            mongo_db: vars.text("MONGO_DB", "qubic-world"),
            scores_collection: vars.text("MONGO_SCORES_COLLECTION", "latestScore"),
            admin_scores_collection: vars.text("MONGO_ADMIN_SCORES_COLLECTION", "latestAdminScore"),

            services_host: vars.text("SERVICES_HOST", DEFAULT_SERVICES_HOST),
            tick_port: vars.port("TICK_PORT", 21846)?,
            revenues_port: vars.port("REVENUES_PORT", 21845)?,

            nats_url: vars.text("NATS_URL", "nats://127.0.0.1:4222"),
            subject_ticks: vars.text("NATS_SUBJECT_TICKS", "data.ticks"),
            subject_scores: vars.text("NATS_SUBJECT_SCORES", "data.scores"),
            subject_revenues: vars.text("NATS_SUBJECT_REVENUES", "data.revenues"),

            stats_channel_id,
            access_token: vars.get("ACCESS_TOKEN"),

            poll_interval: vars.secs("POLL_INTERVAL_SECS", 30),
            cycle_deadline: vars.secs("CYCLE_DEADLINE_SECS", 61),
            connect_timeout: vars.secs("CONNECT_TIMEOUT_SECS", 5),
            read_timeout: vars.secs("READ_TIMEOUT_SECS", 5),

            tick_source,
            cleanup_on_start: vars
                .get("CLEANUP_ON_START")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(true),
        })
    }

    pub fn tick_addr(&self) -> String {
        format!("{}:{}", self.services_host, self.tick_port)
    }

    pub fn revenues_addr(&self) -> String {
        format!("{}:{}", self.services_host, self.revenues_port)
    }
}

/// Settings of the transfer submitter
///
/// Separate from [`StatsConfig`] so submitting transfers needs neither the
/// output channel nor the document store.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub services_host: String,
    pub transfer_port: u16,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub queue_capacity: usize,
}

impl TransferConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        Ok(Self {
            services_host: vars.text("SERVICES_HOST", DEFAULT_SERVICES_HOST),
            transfer_port: vars.port("TRANSFER_PORT", 21847)?,
            connect_timeout: vars.secs("CONNECT_TIMEOUT_SECS", 5),
            write_timeout: vars.secs("WRITE_TIMEOUT_SECS", 5),
            queue_capacity: vars.number("TRANSFER_QUEUE_CAPACITY", 64).max(1) as usize,
        })
    }

    pub fn transfer_addr(&self) -> String {
        format!("{}:{}", self.services_host, self.transfer_port)
    }

    pub fn delivery(&self) -> DeliveryConfig {
        DeliveryConfig {
            addr: self.transfer_addr(),
            connect_timeout: self.connect_timeout,
            write_timeout: self.write_timeout,
        }
    }
}

const DEFAULT_SERVICES_HOST: &str = "172.19.0.2";

/// Environment lookup with the shared default and fallback rules
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Value of `key`, empty counts as unset
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
    }

    fn text(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Unparseable numbers fall back to the default with a warning
    fn number(&self, key: &str, default: u64) -> u64 {
        match self.get(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                log::warn!("⚠️  Invalid {} '{}', defaulting to {}", key, raw, default);
                default
            }),
            None => default,
        }
    }

    fn secs(&self, key: &str, default: u64) -> Duration {
        Duration::from_secs(self.number(key, default))
    }

    fn port(&self, key: &str, default: u16) -> Result<u16, ConfigError> {
        let value = self.number(key, default as u64);
        u16::try_from(value).map_err(|_| ConfigError::InvalidValue(format!("{} out of range: {}", key, value)))
    }
}

/// Encode a credential for use inside a connection string, space as `+`
fn quote_plus(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}
