//! Capture parameter resolution

use argos_core::CaptureDefaults;
use std::time::Duration;

/// Caller-supplied capture parameters; absent values fall back to the
/// configured defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    pub filter: Option<String>,
    pub count: Option<usize>,
    pub timeout: Option<Duration>,
}

impl CaptureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fill every absent value from `defaults`.
    ///
    /// A count of zero means "not given". An explicitly empty filter is kept
    /// and captures all traffic.
    pub fn resolve(&self, defaults: &CaptureDefaults) -> CaptureRequest {
        CaptureRequest {
            filter: self
                .filter
                .clone()
                .unwrap_or_else(|| defaults.filter.clone()),
            count: self
                .count
                .filter(|&n| n > 0)
                .unwrap_or(defaults.count),
            timeout: self.timeout.unwrap_or(defaults.timeout),
        }
    }
}

/// Fully resolved parameters for one capture round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub filter: String,
    pub count: usize,
    pub timeout: Duration,
}

impl CaptureRequest {
    pub fn new(filter: impl Into<String>, count: usize, timeout: Duration) -> Self {
        Self {
            filter: filter.into(),
            count,
            timeout,
        }
    }
}
