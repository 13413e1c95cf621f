//! Client configuration.
//!
//! Each setting resolves as: explicit value > `ELEPHANTASM_*` environment
//! variable > built-in default. Resolution takes the environment as a lookup
//! function so tests never have to touch the process environment.

use std::fmt;
use std::time::Duration;

pub const ENV_API_KEY: &str = "ELEPHANTASM_API_KEY";
pub const ENV_ANIMA_ID: &str = "ELEPHANTASM_ANIMA_ID";
pub const ENV_ENDPOINT: &str = "ELEPHANTASM_ENDPOINT";
pub const ENV_TIMEOUT: &str = "ELEPHANTASM_TIMEOUT";

pub const DEFAULT_ENDPOINT: &str = "https://api.elephantasm.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const API_KEY_PREFIX: &str = "sk_";

/// Resolved settings held by a client for its whole lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub api_key: Option<String>,
    pub anima_id: Option<String>,
    pub endpoint: String,
    pub timeout: Duration,
}

/// Values supplied directly by the caller. `None` defers to the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub anima_id: Option<String>,
    pub endpoint: Option<String>,
    pub timeout: Option<Duration>,
}

impl Config {
    /// Resolve against the process environment.
    pub fn from_env(overrides: Overrides) -> Self {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve against an arbitrary environment lookup.
    pub fn resolve<F>(overrides: Overrides, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| present(env(key));

        let api_key = present(overrides.api_key).or_else(|| env(ENV_API_KEY));
        if let Some(key) = &api_key {
            if !key.starts_with(API_KEY_PREFIX) {
                tracing::warn!("API key does not start with '{API_KEY_PREFIX}'; using it anyway");
            }
        }

        let endpoint = present(overrides.endpoint)
            .or_else(|| env(ENV_ENDPOINT))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();

        let timeout = overrides
            .timeout
            .filter(|t| {
                if t.is_zero() {
                    tracing::warn!("ignoring zero timeout; falling back to {ENV_TIMEOUT} or default");
                }
                !t.is_zero()
            })
            .or_else(|| env(ENV_TIMEOUT).and_then(|raw| parse_timeout(&raw)))
            .unwrap_or(DEFAULT_TIMEOUT);

        Self {
            api_key,
            anima_id: present(overrides.anima_id).or_else(|| env(ENV_ANIMA_ID)),
            endpoint,
            timeout,
        }
    }

    /// The API key, or the error every remote operation reports without one.
    pub fn require_api_key(&self) -> crate::Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            crate::Error::Configuration(format!(
                "API key required. Provide api_key or set {ENV_API_KEY}."
            ))
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            anima_id: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("anima_id", &self.anima_id)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Blank strings count as unset, wherever they come from.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Whole positive seconds. Anything else is ignored with a warning.
fn parse_timeout(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            tracing::warn!(value = raw, "ignoring invalid {ENV_TIMEOUT}");
            None
        }
    }
}
