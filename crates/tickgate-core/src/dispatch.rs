use std::time::SystemTime;

use serde::Serialize;

use crate::source::ProviderId;

/// Per-call audit record for one provider attempt.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub provider: ProviderId,
    pub key_index: usize,
    /// Unix milliseconds.
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
    Skipped,
}

impl Attempt {
    pub fn success(provider: ProviderId, key_index: usize, started: SystemTime) -> Self {
        Self::finished(provider, key_index, started, AttemptOutcome::Success, None)
    }

    pub fn failure(
        provider: ProviderId,
        key_index: usize,
        started: SystemTime,
        error: impl Into<String>,
    ) -> Self {
        Self::finished(
            provider,
            key_index,
            started,
            AttemptOutcome::Failure,
            Some(error.into()),
        )
    }

    /// Candidate passed over without an upstream call.
    pub fn skipped(provider: ProviderId, reason: impl Into<String>) -> Self {
        let now = unix_ms(SystemTime::now());
        Self {
            provider,
            key_index: 0,
            start_ms: now,
            end_ms: now,
            duration_ms: 0,
            outcome: AttemptOutcome::Skipped,
            error: Some(reason.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }

    fn finished(
        provider: ProviderId,
        key_index: usize,
        started: SystemTime,
        outcome: AttemptOutcome,
        error: Option<String>,
    ) -> Self {
        let start_ms = unix_ms(started);
        let end_ms = unix_ms(SystemTime::now());
        Self {
            provider,
            key_index,
            start_ms,
            end_ms,
            duration_ms: end_ms.saturating_sub(start_ms),
            outcome,
            error,
        }
    }
}

/// Successful dispatch with its full audit trail.
#[derive(Debug, Clone)]
pub struct Dispatched<T> {
    pub data: T,
    pub provider: ProviderId,
    pub attempts: Vec<Attempt>,
    pub total_duration_ms: u64,
}

pub(crate) fn unix_ms(at: SystemTime) -> u64 {
    at.duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or(0)
}

/// Concatenated failure messages for aggregate errors.
pub(crate) fn failure_summary(attempts: &[Attempt]) -> String {
    let messages: Vec<&str> = attempts
        .iter()
        .filter(|attempt| attempt.outcome == AttemptOutcome::Failure)
        .filter_map(|attempt| attempt.error.as_deref())
        .collect();
    messages.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_measure_duration_from_start() {
        let attempt = Attempt::success(ProviderId::Finnhub, 1, SystemTime::now());
        assert!(attempt.succeeded());
        assert!(attempt.duration_ms < 1_000);
        assert!(attempt.end_ms >= attempt.start_ms);
    }

    #[test]
    fn summary_joins_failure_messages_only() {
        let attempts = vec![
            Attempt::failure(
                ProviderId::Finnhub,
                0,
                SystemTime::now(),
                "finnhub returned status 500",
            ),
            Attempt::skipped(ProviderId::Twelvedata, "circuit open"),
            Attempt::failure(
                ProviderId::Alphavantage,
                0,
                SystemTime::now(),
                "alphavantage returned status 503",
            ),
        ];

        let summary = failure_summary(&attempts);
        assert_eq!(
            summary,
            "finnhub returned status 500; alphavantage returned status 503"
        );
    }
}
