//! Runtime settings read from the process environment.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DepthError, Result};
use crate::fetch::RetryPolicy;
use crate::preprocess::TensorLayout;

pub const DEFAULT_MODEL_DIR: &str = "/opt/depth-anything-v2";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// Where the SavedModel lives and how to call it
#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub export_dir: PathBuf,
    pub tag: String,
    pub input_op: String,
    pub output_op: String,
    pub input_size: u32,
    pub layout: TensorLayout,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            export_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            tag: "serve".to_owned(),
            input_op: "serving_default_pixel_values".to_owned(),
            output_op: "StatefulPartitionedCall".to_owned(),
            input_size: 518,
            layout: TensorLayout::Nchw,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub retry: RetryPolicy,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            retry: RetryPolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub model: ModelConfig,
    pub fetch: FetchConfig,
    /// Listen address of the HTTP function frontend
    pub http_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model: ModelConfig::default(),
            fetch: FetchConfig::default(),
            http_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        }
    }
}

impl Config {
    /// Build a configuration from `DEPTH_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let parse = |key: &str| -> Option<(String, String)> {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
                .map(|v| (key.to_owned(), v))
        };

        let model = ModelConfig {
            export_dir: parse("DEPTH_MODEL_DIR")
                .map(|(_, v)| PathBuf::from(v))
                .unwrap_or(defaults.model.export_dir),
            tag: parse("DEPTH_MODEL_TAG")
                .map(|(_, v)| v)
                .unwrap_or(defaults.model.tag),
            input_op: parse("DEPTH_INPUT_OP")
                .map(|(_, v)| v)
                .unwrap_or(defaults.model.input_op),
            output_op: parse("DEPTH_OUTPUT_OP")
                .map(|(_, v)| v)
                .unwrap_or(defaults.model.output_op),
            input_size: parse_or(parse("DEPTH_INPUT_SIZE"), defaults.model.input_size)?,
            layout: parse_or(parse("DEPTH_TENSOR_LAYOUT"), defaults.model.layout)?,
        };

        if model.input_size == 0 {
            return Err(config_error("DEPTH_INPUT_SIZE", "must be positive"));
        }

        let attempts: u32 = parse_or(
            parse("DEPTH_FETCH_ATTEMPTS"),
            defaults.fetch.retry.max_attempts,
        )?;
        if attempts == 0 {
            return Err(config_error("DEPTH_FETCH_ATTEMPTS", "must be at least 1"));
        }

        let delay_ms: u64 = parse_or(
            parse("DEPTH_FETCH_DELAY_MS"),
            defaults.fetch.retry.delay.as_millis() as u64,
        )?;
        let timeout_secs: u64 = parse_or(
            parse("DEPTH_FETCH_TIMEOUT_SECS"),
            defaults.fetch.retry.timeout.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(config_error("DEPTH_FETCH_TIMEOUT_SECS", "must be at least 1"));
        }

        let fetch = FetchConfig {
            retry: RetryPolicy {
                max_attempts: attempts,
                delay: Duration::from_millis(delay_ms),
                timeout: Duration::from_secs(timeout_secs),
            },
            user_agent: parse("DEPTH_USER_AGENT")
                .map(|(_, v)| v)
                .unwrap_or(defaults.fetch.user_agent),
        };

        Ok(Config {
            model,
            fetch,
            http_addr: parse_or(parse("DEPTH_HTTP_ADDR"), defaults.http_addr)?,
        })
    }
}

fn parse_or<T>(value: Option<(String, String)>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some((key, raw)) => raw
            .parse()
            .map_err(|e: T::Err| config_error(&key, &format!("{:?}: {}", raw, e))),
    }
}

fn config_error(key: &str, reason: &str) -> DepthError {
    DepthError::Config {
        key: key.to_owned(),
        reason: reason.to_owned(),
    }
}
