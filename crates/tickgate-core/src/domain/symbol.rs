use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Market symbol as received from the caller.
///
/// The text is carried exactly as given: upstream venues disagree on casing
/// and suffix conventions, so normalization happens per adapter, never here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        if input.trim().is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn market(&self) -> Market {
        Market::classify(self.as_str())
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

/// Coarse venue tag governing which providers can serve a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    Us,
    Sh,
    Sz,
    Bj,
    Hk,
    Unknown,
}

impl Market {
    pub const ALL: [Self; 6] = [
        Self::Us,
        Self::Sh,
        Self::Sz,
        Self::Bj,
        Self::Hk,
        Self::Unknown,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Us => "US",
            Self::Sh => "SH",
            Self::Sz => "SZ",
            Self::Bj => "BJ",
            Self::Hk => "HK",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Derive the market from symbol syntax alone.
    ///
    /// Suffix rules are case-insensitive and win over the digit fallbacks.
    /// The symbol is taken exactly as routed: surrounding whitespace makes
    /// every rule miss and the symbol classifies as unknown.
    pub fn classify(symbol: &str) -> Self {
        if let Some(market) = suffix_market(symbol) {
            return market;
        }

        let len = symbol.len();
        if (1..=5).contains(&len) && symbol.bytes().all(|b| b.is_ascii_uppercase()) {
            return Self::Us;
        }

        if len > 0 && symbol.bytes().all(|b| b.is_ascii_digit()) {
            // HK board lots are zero-padded five-digit codes; checking length
            // first keeps the SZ `0` prefix rule from shadowing them.
            if len == 5 {
                return Self::Hk;
            }
            return match symbol.as_bytes()[0] {
                b'6' | b'5' => Self::Sh,
                b'0' | b'2' | b'3' => Self::Sz,
                b'4' | b'8' => Self::Bj,
                _ => Self::Unknown,
            };
        }

        Self::Unknown
    }
}

impl Display for Market {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn suffix_market(symbol: &str) -> Option<Market> {
    let (_, suffix) = symbol.rsplit_once('.')?;
    match suffix.to_ascii_uppercase().as_str() {
        "SH" | "SS" => Some(Market::Sh),
        "SZ" => Some(Market::Sz),
        "BJ" => Some(Market::Bj),
        "HK" => Some(Market::Hk),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_rules_are_case_insensitive() {
        assert_eq!(Market::classify("601899.SH"), Market::Sh);
        assert_eq!(Market::classify("601899.ss"), Market::Sh);
        assert_eq!(Market::classify("000001.sz"), Market::Sz);
        assert_eq!(Market::classify("430047.BJ"), Market::Bj);
        assert_eq!(Market::classify("0700.hk"), Market::Hk);
    }

    #[test]
    fn bare_uppercase_letters_are_us() {
        assert_eq!(Market::classify("AAPL"), Market::Us);
        assert_eq!(Market::classify("F"), Market::Us);
        assert_eq!(Market::classify("GOOGL"), Market::Us);
        assert_eq!(Market::classify("TOOLONG"), Market::Unknown);
        assert_eq!(Market::classify("aapl"), Market::Unknown);
    }

    #[test]
    fn digit_prefixes_map_to_mainland_boards() {
        assert_eq!(Market::classify("601899"), Market::Sh);
        assert_eq!(Market::classify("510300"), Market::Sh);
        assert_eq!(Market::classify("000001"), Market::Sz);
        assert_eq!(Market::classify("300750"), Market::Sz);
        assert_eq!(Market::classify("430047"), Market::Bj);
        assert_eq!(Market::classify("830799"), Market::Bj);
    }

    #[test]
    fn five_digit_codes_are_hong_kong() {
        assert_eq!(Market::classify("00700"), Market::Hk);
        assert_eq!(Market::classify("09988"), Market::Hk);
    }

    #[test]
    fn suffix_wins_over_digit_prefix() {
        assert_eq!(Market::classify("600000.HK"), Market::Hk);
    }

    #[test]
    fn whitespace_is_not_trimmed() {
        assert_eq!(Market::classify(" AAPL"), Market::Unknown);
        assert_eq!(Market::classify("601899 "), Market::Unknown);
    }

    #[test]
    fn symbol_preserves_text_and_rejects_blank() {
        let symbol = Symbol::parse("601899.SH").expect("symbol should parse");
        assert_eq!(symbol.as_str(), "601899.SH");
        assert_eq!(symbol.market(), Market::Sh);
        assert!(Symbol::parse("   ").is_err());
    }
}
