use crate::constants::limits;
use log::warn;
use once_cell::sync::Lazy;
use std::env;
use thiserror::Error;

pub const ENV_DISABLED: &str = "CORS_GUARD_DISABLED";
pub const ENV_DISABLE_CREDENTIALS: &str = "CORS_GUARD_DISABLE_CREDENTIALS";
pub const ENV_CACHE_CAPACITY: &str = "CORS_GUARD_CACHE_CAPACITY";
pub const ENV_MAX_AGE_CAP: &str = "CORS_GUARD_MAX_AGE_CAP";
pub const ENV_INTERCEPTION: &str = "CORS_GUARD_INTERCEPTION";

static GLOBAL: Lazy<CorsConfig> = Lazy::new(|| {
    CorsConfig::from_env().unwrap_or_else(|err| {
        warn!("ignoring invalid CORS configuration from the environment: {err}");
        CorsConfig::default()
    })
});

/// Process-wide switches read once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    /// Refuse every cross-origin response.
    pub cors_disabled: bool,
    /// Force every request to be sent without credentials.
    pub credentials_disabled: bool,
    pub cache_capacity: usize,
    /// Ceiling, in seconds, applied to `Access-Control-Max-Age`.
    pub max_age_cap: u32,
    /// Only internal redirects to the same URI bypass redirect checks
    /// (service-worker interception). When unset, every internal redirect does.
    pub intercept_same_uri_redirects: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("preflight cache capacity must be at least 1")]
    ZeroCacheCapacity,
    #[error("max-age cap must be between 1 and 86400 seconds, got {0}")]
    InvalidMaxAgeCap(u32),
    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidFlag { name: String, value: String },
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            cors_disabled: false,
            credentials_disabled: false,
            cache_capacity: limits::DEFAULT_CACHE_CAPACITY,
            max_age_cap: limits::MAX_AGE_CAP_SECONDS,
            intercept_same_uri_redirects: true,
        }
    }
}

impl CorsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cache_capacity == 0 {
            return Err(ValidationError::ZeroCacheCapacity);
        }
        if self.max_age_cap == 0 || self.max_age_cap > limits::MAX_AGE_CAP_SECONDS {
            return Err(ValidationError::InvalidMaxAgeCap(self.max_age_cap));
        }
        Ok(())
    }

    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable source; unset
    /// variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            cors_disabled: parse_flag(&lookup, ENV_DISABLED)?.unwrap_or(defaults.cors_disabled),
            credentials_disabled: parse_flag(&lookup, ENV_DISABLE_CREDENTIALS)?
                .unwrap_or(defaults.credentials_disabled),
            cache_capacity: parse_number(&lookup, ENV_CACHE_CAPACITY)?
                .unwrap_or(defaults.cache_capacity),
            max_age_cap: parse_number(&lookup, ENV_MAX_AGE_CAP)?.unwrap_or(defaults.max_age_cap),
            intercept_same_uri_redirects: parse_flag(&lookup, ENV_INTERCEPTION)?
                .unwrap_or(defaults.intercept_same_uri_redirects),
        };
        config.validate()?;
        Ok(config)
    }

    /// The configuration derived from the environment on first use.
    pub fn global() -> &'static CorsConfig {
        &GLOBAL
    }
}

fn parse_flag<F>(lookup: &F, name: &str) -> Result<Option<bool>, ValidationError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(Some(true)),
        "0" | "false" => Ok(Some(false)),
        _ => Err(invalid(name, raw)),
    }
}

fn parse_number<F, T>(lookup: &F, name: &str) -> Result<Option<T>, ValidationError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| invalid(name, raw))
}

fn invalid(name: &str, value: String) -> ValidationError {
    ValidationError::InvalidFlag {
        name: name.to_owned(),
        value,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
