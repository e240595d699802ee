use thiserror::Error;

use crate::dispatch::Attempt;
use crate::source::ProviderId;

/// Validation and contract errors exposed by `tickgate-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,

    #[error("invalid provider '{value}', expected one of finnhub, alphavantage, twelvedata, tiingo, sina, eastmoney")]
    InvalidProvider { value: String },

    #[error("invalid resolution '{value}', expected one of 1, 5, 15, 30, 60, D, W, M")]
    InvalidResolution { value: String },

    #[error("invalid outputsize '{value}', expected compact or full")]
    InvalidOutputSize { value: String },

    #[error("field '{field}' must be a positive integer: '{value}'")]
    InvalidInteger { field: &'static str, value: String },
}

/// Errors surfaced to the caller of a gateway tool.
///
/// The attempt log is preserved on every multi-candidate outcome so callers
/// can see which providers were tried and why each one was passed over.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid argument '{field}': {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    #[error("no provider available for tool '{tool}'")]
    ServiceUnavailable { tool: String, attempts: Vec<Attempt> },

    #[error("{provider}: {message}")]
    UpstreamPermanent {
        provider: ProviderId,
        message: String,
        attempts: Vec<Attempt>,
    },

    #[error("all providers failed for tool '{tool}': {summary}")]
    AggregateFailure {
        tool: String,
        summary: String,
        attempts: Vec<Attempt>,
    },

    #[error("deadline exceeded after {elapsed_ms} ms for tool '{tool}'")]
    DeadlineExceeded {
        tool: String,
        elapsed_ms: u64,
        attempts: Vec<Attempt>,
    },
}

impl GatewayError {
    pub fn invalid_argument(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }

    pub fn attempts(&self) -> &[Attempt] {
        match self {
            Self::InvalidArgument { .. } => &[],
            Self::ServiceUnavailable { attempts, .. }
            | Self::UpstreamPermanent { attempts, .. }
            | Self::AggregateFailure { attempts, .. }
            | Self::DeadlineExceeded { attempts, .. } => attempts,
        }
    }
}

impl From<ValidationError> for GatewayError {
    fn from(error: ValidationError) -> Self {
        let field = match &error {
            ValidationError::EmptySymbol => "symbol",
            ValidationError::InvalidProvider { .. } => "source",
            ValidationError::InvalidResolution { .. } => "resolution",
            ValidationError::InvalidOutputSize { .. } => "outputsize",
            ValidationError::InvalidInteger { field, .. } => field,
        };
        GatewayError::InvalidArgument {
            field,
            reason: error.to_string(),
        }
    }
}
