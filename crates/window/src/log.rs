//! Verbosity-gated console
//!
//! Emits through `tracing` when the configured level allows it. Errors
//! are also kept in memory so they can be pulled for diagnostics even
//! when nothing was printed. Only the most recent ones are kept.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

/// Saved errors kept per console; older ones are dropped first
pub const MAX_SAVED_ERRORS: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Nothing printed
    #[default]
    Production,
    /// Errors only
    Error,
    Verbose,
}

impl LogLevel {
    /// Unknown names fall back to `Production`
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(LogLevel::Production),
            "error" => Ok(LogLevel::Error),
            "verbose" => Ok(LogLevel::Verbose),
            other => Err(format!("unknown log level \"{}\"", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Console {
    level: LogLevel,
    scope: &'static str,
    saved: Arc<Mutex<VecDeque<String>>>,
}

impl Console {
    pub fn new(level: LogLevel, scope: &'static str) -> Self {
        Self {
            level,
            scope,
            saved: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_SAVED_ERRORS))),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn info(&self, message: impl Display) {
        if self.level >= LogLevel::Verbose {
            tracing::info!("[{}] {}", self.scope, message);
        }
    }

    pub fn warn(&self, message: impl Display) {
        if self.level >= LogLevel::Verbose {
            tracing::warn!("[{}] {}", self.scope, message);
        }
    }

    pub fn error(&self, message: impl Display) {
        let text = message.to_string();
        if self.level >= LogLevel::Error {
            tracing::error!("[{}] {}", self.scope, text);
        }
        let mut saved = self.saved.lock();
        if saved.len() == MAX_SAVED_ERRORS {
            saved.pop_front();
        }
        saved.push_back(text);
    }

    /// Latest errors, oldest first, printed or not
    pub fn saved_errors(&self) -> Vec<String> {
        self.saved.lock().iter().cloned().collect()
    }
}
