//! Runtime configuration read from the environment at startup.

use std::time::Duration;

use tracing::warn;

use intake_delivery::DEFAULT_DISPLAY_CODE_WIDTH;

use crate::store::query::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Pagination};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeConfig {
    /// Currency used for staged variant prices when a store has none.
    pub default_currency_code: String,
    pub display_code_width: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub worker_poll_interval: Duration,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            default_currency_code: "usd".to_string(),
            display_code_width: DEFAULT_DISPLAY_CODE_WIDTH,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            worker_poll_interval: Duration::from_millis(250),
        }
    }
}

impl IntakeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparsable values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let default_currency_code = lookup("INTAKE_CURRENCY_CODE")
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.default_currency_code);

        let default_page_size = parse_or(&lookup, "INTAKE_PAGE_SIZE", defaults.default_page_size);
        let max_page_size = parse_or(&lookup, "INTAKE_MAX_PAGE_SIZE", defaults.max_page_size);

        Self {
            default_currency_code,
            display_code_width: parse_or(
                &lookup,
                "INTAKE_DISPLAY_CODE_WIDTH",
                defaults.display_code_width,
            ),
            default_page_size: default_page_size.min(max_page_size),
            max_page_size,
            worker_poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "INTAKE_WORKER_POLL_MS",
                250u64,
            )),
        }
    }

    /// Pagination with this deployment's default and cap.
    pub fn pagination(&self, limit: Option<u32>, offset: Option<u32>) -> Pagination {
        Pagination {
            limit: limit.unwrap_or(self.default_page_size).min(self.max_page_size),
            offset: offset.unwrap_or(0),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy + core::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = %default, "invalid configuration value; using default");
            default
        }),
    }
}
