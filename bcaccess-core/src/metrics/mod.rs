//! Access flow metrics
//!
//! Counters are recorded through the `metrics` facade. No exporter is
//! installed here; without a recorder the calls are no-ops.

use metrics::{counter, describe_counter, histogram, describe_histogram};
use std::time::Instant;

pub const ACCESS_ATTEMPTS: &str = "bcaccess_access_attempts_total";
pub const ACCESS_FAILURES: &str = "bcaccess_access_failures_total";
pub const IDENTITY_SWITCHES: &str = "bcaccess_identity_switches_total";
pub const REGISTRATION_DURATION: &str = "bcaccess_registration_duration_ms";

/// Which access flow a metric belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    SignIn,
    SignUp,
    Import,
    Export,
}

impl Flow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flow::SignIn => "sign_in",
            Flow::SignUp => "sign_up",
            Flow::Import => "import",
            Flow::Export => "export",
        }
    }
}

/// Register metric descriptions with the installed recorder
pub fn init_metrics() {
    describe_counter!(ACCESS_ATTEMPTS, "Access flow actions submitted, by flow");
    describe_counter!(ACCESS_FAILURES, "Access flow actions that failed, by flow");
    describe_counter!(IDENTITY_SWITCHES, "Identity switches and sign-outs");
    describe_histogram!(REGISTRATION_DURATION, "Alias registration duration in milliseconds");
}

pub fn record_attempt(flow: Flow) {
    counter!(ACCESS_ATTEMPTS, "flow" => flow.as_str()).increment(1);
}

pub fn record_failure(flow: Flow) {
    counter!(ACCESS_FAILURES, "flow" => flow.as_str()).increment(1);
}

pub fn record_switch() {
    counter!(IDENTITY_SWITCHES).increment(1);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(self.name).record(duration.as_secs_f64() * 1000.0);
    }
}
