//! Blocking HTTP client for the TMDb catalog.
//!
//! Every call carries the API key and locale, runs under a fixed timeout and
//! is retried with a fixed delay. Exhausting the retries yields
//! [`FetchError::Exhausted`] so callers can fall back to cached data.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("invalid JSON body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no API key configured")]
    MissingApiKey,
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single GET, without retries.
pub trait Transport {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse, FetchError>;
}

/// Something that can wait between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub attempts: u32,
    /// Fixed wait between consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

/// [`Transport`] backed by `reqwest::blocking`.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reeljournal/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpResponse, FetchError> {
        let response = self.client.get(url).query(query).send().map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(classify)?;
        Ok(HttpResponse { status, body })
    }
}

fn classify(error: reqwest::Error) -> FetchError {
    // Strip the URL so the API key never ends up in logs.
    let error = error.without_url();
    if error.is_timeout() {
        FetchError::Timeout(error.to_string())
    } else {
        FetchError::Transport(error.to_string())
    }
}

pub struct CatalogClient {
    transport: Box<dyn Transport>,
    sleeper: Box<dyn Sleeper>,
    policy: RetryPolicy,
    base_url: String,
    api_key: String,
    language: String,
}

impl CatalogClient {
    pub fn new(
        transport: Box<dyn Transport>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            sleeper: Box::new(ThreadSleeper),
            policy: RetryPolicy::default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            language: language.into(),
        }
    }

    /// Build a client from settings, talking to the network through reqwest
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let transport = ReqwestTransport::new(config.timeout())?;
        Ok(Self::new(
            Box::new(transport),
            config.api_base_url.clone(),
            config.api_key.clone(),
            config.language.clone(),
        )
        .with_retry_policy(RetryPolicy::new(config.retry_attempts, config.retry_delay())))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = RetryPolicy::new(policy.attempts, policy.delay);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// GET `{base_url}{path}` with the credential and locale added to
    /// `params`, retrying failed attempts.
    pub fn fetch(&self, path: &str, params: &[(&str, String)]) -> Result<Value, FetchError> {
        if self.api_key.is_empty() {
            return Err(FetchError::MissingApiKey);
        }

        let url = format!("{}{}", self.base_url, path);
        let mut query: Vec<(&str, String)> = vec![
            ("api_key", self.api_key.clone()),
            ("language", self.language.clone()),
        ];
        query.extend(params.iter().cloned());

        let attempts = self.policy.attempts;
        let mut attempt = 1;
        loop {
            debug!(path, attempt, "TMDb request");
            match self.attempt(&url, &query) {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!(path, "TMDb API error (attempt {attempt}/{attempts}): {e}");
                    if attempt >= attempts {
                        return Err(FetchError::Exhausted {
                            attempts,
                            last: Box::new(e),
                        });
                    }
                }
            }
            self.sleeper.sleep(self.policy.delay);
            attempt += 1;
        }
    }

    fn attempt(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let response = self.transport.get(url, query)?;
        if !response.is_success() {
            return Err(FetchError::Status(response.status));
        }
        Ok(serde_json::from_str(&response.body)?)
    }

    /// One page of the popular listing
    pub fn popular(&self, page: u32) -> Result<Value, FetchError> {
        self.fetch("/movie/popular", &[("page", page.to_string())])
    }

    /// Title search
    pub fn search(&self, query: &str) -> Result<Value, FetchError> {
        self.fetch("/search/movie", &[("query", query.to_string())])
    }

    /// Base record for a single movie
    pub fn movie(&self, tmdb_id: i64) -> Result<Value, FetchError> {
        self.fetch(&format!("/movie/{tmdb_id}"), &[])
    }

    /// Single movie with videos and credits appended in the same call
    pub fn movie_extended(&self, tmdb_id: i64) -> Result<Value, FetchError> {
        self.fetch(
            &format!("/movie/{tmdb_id}"),
            &[("append_to_response", "videos,credits".to_string())],
        )
    }
}
