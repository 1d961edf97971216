//! Runtime tunables, read from `ICTEST_*` environment variables.

use std::{env, fs, path::Path, str::FromStr, time::Duration};

use crate::{adjust_timeout, chain::ChainSpec};

pub const ACK_WINDOW_BLOCKS_ENV: &str = "ICTEST_ACK_WINDOW_BLOCKS";
pub const ACK_POLL_INTERVAL_MS_ENV: &str = "ICTEST_ACK_POLL_INTERVAL_MS";
pub const HEIGHT_POLL_ATTEMPTS_ENV: &str = "ICTEST_HEIGHT_POLL_ATTEMPTS";
pub const LIVENESS_TIMEOUT_SECS_ENV: &str = "ICTEST_LIVENESS_TIMEOUT_SECS";
pub const LIVENESS_POLL_INTERVAL_MS_ENV: &str = "ICTEST_LIVENESS_POLL_INTERVAL_MS";
pub const SETTLE_BLOCKS_ENV: &str = "ICTEST_SETTLE_BLOCKS";
pub const TEARDOWN_TIMEOUT_SECS_ENV: &str = "ICTEST_TEARDOWN_TIMEOUT_SECS";
pub const KEEP_CONTAINERS_ENV: &str = "ICTEST_KEEP_CONTAINERS";

const DEFAULT_ACK_WINDOW_BLOCKS: u64 = 25;
const DEFAULT_ACK_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_HEIGHT_POLL_ATTEMPTS: u32 = 60;
const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_LIVENESS_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_SETTLE_BLOCKS: u64 = 2;
const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid {expected}")]
    InvalidVar {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Blocks after the pre-send height in which an acknowledgement must
    /// show up.
    pub ack_window_blocks: u64,
    pub ack_poll_interval: Duration,
    /// Polls spent waiting for a single height before the chain counts as
    /// stalled.
    pub height_poll_attempts: u32,
    pub liveness_timeout: Duration,
    pub liveness_poll_interval: Duration,
    pub settle_blocks: u64,
    pub teardown_timeout: Duration,
    pub keep_containers: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ack_window_blocks: DEFAULT_ACK_WINDOW_BLOCKS,
            ack_poll_interval: DEFAULT_ACK_POLL_INTERVAL,
            height_poll_attempts: DEFAULT_HEIGHT_POLL_ATTEMPTS,
            liveness_timeout: adjust_timeout(DEFAULT_LIVENESS_TIMEOUT),
            liveness_poll_interval: DEFAULT_LIVENESS_POLL_INTERVAL,
            settle_blocks: DEFAULT_SETTLE_BLOCKS,
            teardown_timeout: adjust_timeout(DEFAULT_TEARDOWN_TIMEOUT),
            keep_containers: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();

        if let Some(blocks) = parse_var(&lookup, ACK_WINDOW_BLOCKS_ENV, "block count")? {
            settings.ack_window_blocks = blocks;
        }
        if let Some(ms) = parse_var(&lookup, ACK_POLL_INTERVAL_MS_ENV, "millisecond count")? {
            settings.ack_poll_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var(&lookup, HEIGHT_POLL_ATTEMPTS_ENV, "attempt count")? {
            settings.height_poll_attempts = attempts;
        }
        if let Some(secs) = parse_var(&lookup, LIVENESS_TIMEOUT_SECS_ENV, "second count")? {
            settings.liveness_timeout = adjust_timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = parse_var(&lookup, LIVENESS_POLL_INTERVAL_MS_ENV, "millisecond count")? {
            settings.liveness_poll_interval = Duration::from_millis(ms);
        }
        if let Some(blocks) = parse_var(&lookup, SETTLE_BLOCKS_ENV, "block count")? {
            settings.settle_blocks = blocks;
        }
        if let Some(secs) = parse_var(&lookup, TEARDOWN_TIMEOUT_SECS_ENV, "second count")? {
            settings.teardown_timeout = adjust_timeout(Duration::from_secs(secs));
        }
        if let Some(keep) = parse_var(&lookup, KEEP_CONTAINERS_ENV, "boolean")? {
            settings.keep_containers = keep;
        }

        Ok(settings)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidVar {
            var,
            value,
            expected,
        })
}

/// Loads a YAML list of chain specs.
pub fn load_chain_specs(path: impl AsRef<Path>) -> Result<Vec<ChainSpec>, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })
}
