//! Upstream failure classification.
//!
//! The dispatcher never inspects provider errors directly; it switches on the
//! class produced here. Rules are evaluated in order against the lowercased
//! message and the HTTP status when one is available.

use serde::{Deserialize, Serialize};

/// Dispatch-relevant class of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    RateLimit,
    Transient,
    Timeout,
    Permanent,
}

impl FailureClass {
    /// Whether the cascade may continue to the next candidate.
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::Permanent)
    }
}

const RATE_LIMIT_MARKERS: [&str; 8] = [
    "429",
    "rate limit",
    "rate-limit",
    "ratelimit",
    "too many requests",
    "quota exceeded",
    "api limit",
    "throttl",
];

const TIMEOUT_MARKERS: [&str; 3] = ["timeout", "timed out", "deadline exceeded"];

const TRANSIENT_MARKERS: [&str; 3] = ["econnreset", "econnrefused", "network"];

/// Classify an upstream failure from its human message and optional status.
pub fn classify(message: &str, status: Option<u16>) -> FailureClass {
    let lowered = message.to_ascii_lowercase();

    if status == Some(429) || RATE_LIMIT_MARKERS.iter().any(|m| lowered.contains(m)) {
        return FailureClass::RateLimit;
    }

    if TIMEOUT_MARKERS.iter().any(|m| lowered.contains(m)) {
        return FailureClass::Timeout;
    }

    if status.is_some_and(|s| (500..600).contains(&s))
        || TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m))
    {
        return FailureClass::Transient;
    }

    FailureClass::Permanent
}
