//! Common record shapes produced by provider adapters.
//!
//! Every adapter normalizes its wire format into these types; nothing
//! provider-specific leaks past this module. All records are value types
//! that serialize to stable JSON for the tool transport.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Real-time or delayed top-of-book quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub current: f64,
    pub change: f64,
    pub percent_change: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub day_open: f64,
    pub prev_close: f64,
}

/// One OHLCV bar keyed by calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adj_close: Option<f64>,
}

/// Normalized news article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub headline: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Publication time in unix seconds.
    pub datetime: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
}

/// Company profile and headline metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyInfo {
    pub symbol: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares_outstanding: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<String>>,
}

/// Named numeric lines of one financial statement.
pub type StatementLines = BTreeMap<String, f64>;

/// Financial statement bundle; absent statements stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Financials {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub income: Option<StatementLines>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<StatementLines>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cash_flow: Option<StatementLines>,
}

/// One point of a technical-indicator series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub timestamp: String,
    pub value: f64,
}

/// Technical-indicator series, ordered oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSeries {
    pub name: String,
    pub symbol: String,
    pub series: Vec<IndicatorPoint>,
}

/// Convert unix seconds to a `YYYY-MM-DD` date string (UTC).
pub fn unix_to_date(ts: i64) -> Option<String> {
    let dt = OffsetDateTime::from_unix_timestamp(ts).ok()?;
    dt.format(&DATE_FORMAT).ok()
}
