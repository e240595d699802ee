use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Canonical provider identifiers used in routing tables and attempt logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Finnhub,
    Alphavantage,
    Twelvedata,
    Tiingo,
    Sina,
    Eastmoney,
}

impl ProviderId {
    pub const ALL: [Self; 6] = [
        Self::Finnhub,
        Self::Alphavantage,
        Self::Twelvedata,
        Self::Tiingo,
        Self::Sina,
        Self::Eastmoney,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Finnhub => "finnhub",
            Self::Alphavantage => "alphavantage",
            Self::Twelvedata => "twelvedata",
            Self::Tiingo => "tiingo",
            Self::Sina => "sina",
            Self::Eastmoney => "eastmoney",
        }
    }

    /// Providers that serve public endpoints without credentials.
    pub const fn is_keyless(self) -> bool {
        matches!(self, Self::Sina | Self::Eastmoney)
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "finnhub" => Ok(Self::Finnhub),
            "alphavantage" => Ok(Self::Alphavantage),
            "twelvedata" => Ok(Self::Twelvedata),
            "tiingo" => Ok(Self::Tiingo),
            "sina" => Ok(Self::Sina),
            "eastmoney" => Ok(Self::Eastmoney),
            other => Err(ValidationError::InvalidProvider {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tags_case_insensitively() {
        assert_eq!(" Finnhub ".parse::<ProviderId>(), Ok(ProviderId::Finnhub));
        assert_eq!("EASTMONEY".parse::<ProviderId>(), Ok(ProviderId::Eastmoney));
    }

    #[test]
    fn rejects_unknown_tags() {
        let err = "polygon".parse::<ProviderId>().expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidProvider { .. }));
    }
}
