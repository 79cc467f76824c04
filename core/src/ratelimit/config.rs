//! Rate guard configuration.

use std::time::Duration;

use tracing::warn;

/// Configuration for the content-action abuse gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateGuardConfig {
    /// Whether the gate is enabled at all
    pub enabled: bool,
    /// Minimum spacing between two actions of the same class
    pub min_interval: Duration,
    /// Sliding-window volume limit
    pub window: WindowConfig,
    /// Duplicate-content suppression
    pub duplicates: DuplicateConfig,
}

/// Sliding-window limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Maximum actions inside the window
    pub limit: u32,
    /// Window length
    pub length: Duration,
}

/// Duplicate detection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateConfig {
    /// How long an identical content is rejected
    pub window: Duration,
    /// How many recent contents are remembered
    pub buffer: usize,
}

impl Default for RateGuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval: Duration::from_millis(500),
            window: WindowConfig::default(),
            duplicates: DuplicateConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            length: Duration::from_secs(60),
        }
    }
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30),
            buffer: 10,
        }
    }
}

impl RateGuardConfig {
    /// Gate that allows everything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// How long a key must be idle before its state can be dropped.
    pub fn idle_ttl(&self) -> Duration {
        self.window
            .length
            .max(self.duplicates.window)
            .max(self.min_interval)
    }

    /// Creates configuration from environment variables.
    ///
    /// Environment variables:
    /// - `RATE_GUARD_ENABLED`: Enable/disable the gate (default: true)
    /// - `RATE_GUARD_MIN_INTERVAL_MS`: Minimum spacing in milliseconds (default: 500)
    /// - `RATE_GUARD_WINDOW`: Window limit as "limit,window_secs" (default: "10,60")
    /// - `RATE_GUARD_DUPLICATE`: Duplicate settings as "window_secs,buffer" (default: "30,10")
    ///
    /// Malformed values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RATE_GUARD_ENABLED") {
            config.enabled = val.trim().parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("RATE_GUARD_MIN_INTERVAL_MS") {
            match val.trim().parse() {
                Ok(ms) => config.min_interval = Duration::from_millis(ms),
                Err(_) => warn!(value = %val, "Invalid RATE_GUARD_MIN_INTERVAL_MS, using default"),
            }
        }
        if let Ok(val) = std::env::var("RATE_GUARD_WINDOW") {
            match parse_window_config(&val) {
                Some(window) => config.window = window,
                None => warn!(value = %val, "Invalid RATE_GUARD_WINDOW, using default"),
            }
        }
        if let Ok(val) = std::env::var("RATE_GUARD_DUPLICATE") {
            match parse_duplicate_config(&val) {
                Some(duplicates) => config.duplicates = duplicates,
                None => warn!(value = %val, "Invalid RATE_GUARD_DUPLICATE, using default"),
            }
        }

        config
    }
}

/// Parses a window config from "limit,window_secs" format.
fn parse_window_config(val: &str) -> Option<WindowConfig> {
    let parts: Vec<&str> = val.split(',').collect();
    if parts.len() != 2 {
        return None;
    }
    let limit: u32 = parts[0].trim().parse().ok()?;
    let secs: u64 = parts[1].trim().parse().ok()?;
    if limit == 0 || secs == 0 {
        return None;
    }
    Some(WindowConfig {
        limit,
        length: Duration::from_secs(secs),
    })
}

/// Parses a duplicate config from "window_secs,buffer" format.
fn parse_duplicate_config(val: &str) -> Option<DuplicateConfig> {
    let parts: Vec<&str> = val.split(',').collect();
    if parts.len() != 2 {
        return None;
    }
    let secs: u64 = parts[0].trim().parse().ok()?;
    let buffer: usize = parts[1].trim().parse().ok()?;
    Some(DuplicateConfig {
        window: Duration::from_secs(secs),
        buffer,
    })
}
