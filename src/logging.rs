//! Log sampling and error counters.
//!
//! High-rate failure paths (per-rule evaluation errors, 4xx responses) log
//! one message in every N to keep log volume bounded under load. The
//! counters increment on every call regardless of sampling, so the stats
//! endpoint always reports true totals.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Deterministic 1-in-N sampler with always-on counters.
#[derive(Debug)]
pub struct LogSampler {
    rate: u64,
    warn_seq: AtomicU64,
    error_seq: AtomicU64,
    total_warnings: AtomicU64,
    total_errors: AtomicU64,
}

/// Counter snapshot for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogCounters {
    pub total_warnings: u64,
    pub total_errors: u64,
    pub sample_rate: u64,
}

impl LogSampler {
    /// `rate` of 1 logs everything; `rate` of 100 logs the first of every
    /// hundred. Zero is clamped to 1.
    pub fn new(rate: u32) -> Self {
        LogSampler {
            rate: u64::from(rate.max(1)),
            warn_seq: AtomicU64::new(0),
            error_seq: AtomicU64::new(0),
            total_warnings: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
        }
    }

    /// Count a warning; true if this one should be written out.
    pub fn note_warning(&self) -> bool {
        self.total_warnings.fetch_add(1, Ordering::Relaxed);
        self.warn_seq.fetch_add(1, Ordering::Relaxed) % self.rate == 0
    }

    /// Count an error; true if this one should be written out.
    pub fn note_error(&self) -> bool {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
        self.error_seq.fetch_add(1, Ordering::Relaxed) % self.rate == 0
    }

    /// Current totals, unaffected by sampling.
    pub fn counters(&self) -> LogCounters {
        LogCounters {
            total_warnings: self.total_warnings.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            sample_rate: self.rate,
        }
    }
}

/// Map a configured level name onto a tracing directive. `FATAL` has no
/// tracing equivalent and collapses into `error`.
pub fn level_directive(level: &str) -> Option<&'static str> {
    match level.to_ascii_uppercase().as_str() {
        "TRACE" => Some("trace"),
        "DEBUG" => Some("debug"),
        "INFO" => Some("info"),
        "WARN" | "WARNING" => Some("warn"),
        "ERROR" | "FATAL" => Some("error"),
        _ => None,
    }
}
