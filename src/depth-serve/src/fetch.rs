use std::thread;
use std::time::Duration;

use image::RgbImage;
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::Url;

use crate::config::FetchConfig;
use crate::error::{DepthError, Result};

/// Bounds for retrying a flaky operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Pause between two consecutive attempts
    pub delay: Duration,

    /// Upper bound for a single attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of an operation that failed on every attempt
#[derive(Debug)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub last: E,
}

/// Run `op` until it succeeds or `policy.max_attempts` is reached.
///
/// `op` receives the 1-based attempt number. The delay is only applied
/// between attempts, never after the final failure.
pub fn retry<T, E, F>(policy: &RetryPolicy, mut op: F) -> std::result::Result<T, RetryError<E>>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> std::result::Result<T, E>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => {
                return Err(RetryError {
                    attempts: attempt,
                    last: err,
                })
            }
            Err(err) => {
                warn!("Attempt {}/{} failed: {}", attempt, max_attempts, err);
                if !policy.delay.is_zero() {
                    thread::sleep(policy.delay);
                }
                attempt += 1;
            }
        }
    }
}

/// Anything that can turn an image URL into decoded pixels
pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<RgbImage>;
}

/// Check that `url` is a non-empty absolute http(s) URL
pub fn validate_url(url: &str) -> Result<Url> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(DepthError::MissingImageUrl);
    }

    let parsed = Url::parse(trimmed).map_err(|e| DepthError::InvalidUrl {
        url: url.to_owned(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(DepthError::InvalidUrl {
            url: url.to_owned(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// Downloads images over HTTP(S) with bounded retries
pub struct HttpFetcher {
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Self {
        HttpFetcher { config }
    }

    fn client(&self) -> std::result::Result<Client, String> {
        Client::builder()
            .timeout(self.config.retry.timeout)
            .user_agent(self.config.user_agent.as_str())
            .build()
            .map_err(|e| format!("could not build HTTP client: {}", e))
    }

    fn attempt(&self, client: &Client, url: &Url) -> std::result::Result<RgbImage, String> {
        let resp = client
            .get(url.clone())
            .send()
            .map_err(|e| format!("request failed: {}", e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        let body = resp
            .bytes()
            .map_err(|e| format!("could not read response body: {}", e))?;
        debug!("Received {} bytes from {}", body.len(), url);

        let image = image::load_from_memory(&body)
            .map_err(|e| format!("could not decode image: {}", e))?;

        Ok(image.to_rgb8())
    }
}

impl ImageSource for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<RgbImage> {
        let url = validate_url(url)?;

        // The client lives only on the calling thread; the blocking client
        // must not be dropped from inside an async runtime.
        let client = self.client().map_err(DepthError::Client)?;

        retry(&self.config.retry, |_| self.attempt(&client, &url)).map_err(|e| {
            DepthError::Retrieval {
                attempts: e.attempts,
                reason: e.last,
            }
        })
    }
}
