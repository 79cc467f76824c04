//! Core Configuration
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::ratelimit::RateGuardConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable, for local development
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(anyhow!("unknown log format '{other}', expected 'json' or 'pretty'")),
        }
    }
}

/// Core configuration loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Abuse gate thresholds
    pub rate_guard: RateGuardConfig,

    /// Accounts forced to the admin role when observed (comma-separated)
    pub elevated_admin_emails: Vec<String>,

    /// Log output format (default: json)
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            rate_guard: RateGuardConfig::from_env(),
            elevated_admin_emails: env::var("ELEVATED_ADMIN_EMAILS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|e| e.trim().to_string())
                        .filter(|e| !e.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            log_format: env::var("LOG_FORMAT")
                .ok()
                .map(|v| v.parse::<LogFormat>())
                .transpose()
                .context("LOG_FORMAT is invalid")?
                .unwrap_or_default(),
        })
    }

    /// Load `.env` if present, then read the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }
}
