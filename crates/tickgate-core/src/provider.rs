//! Provider adapter contract.
//!
//! Each upstream gets one adapter implementing [`ProviderAdapter`]. An
//! adapter declares the operations it supports in its [`CapabilitySet`];
//! everything else falls through to the default method bodies, which answer
//! "this provider does not support operation X". The router filters on
//! capabilities before a call ever reaches an adapter, so those defaults are
//! a contract backstop rather than a control-flow path.
//!
//! | Operation | Tool name | Result |
//! |-----------|-----------|--------|
//! | `Quote` | `get_stock_quote` (alias `get_quote`) | [`Quote`] |
//! | `Candles` | `get_stock_candles` | `Vec<Candle>` |
//! | `DailyPrices` | `get_daily_prices` | `BTreeMap<date, Candle>` |
//! | `News` | `get_news` | `Vec<NewsItem>` |
//! | `CompanyOverview` | `get_company_overview` | [`CompanyInfo`] |
//! | `BasicFinancials` | `get_company_basic_financials` | [`Financials`] |
//! | `CompanyMetrics` | `get_company_metrics` | [`CompanyInfo`] |
//! | `IncomeStatement` | `get_income_statement` | [`Financials`] |
//! | `BalanceSheet` | `get_balance_sheet` | [`Financials`] |
//! | `CashFlow` | `get_cash_flow` | [`Financials`] |
//! | `TechnicalIndicator` | `get_technical_indicator` | [`IndicatorSeries`] |

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::classify::{classify, FailureClass};
use crate::domain::{Candle, CompanyInfo, Financials, IndicatorSeries, NewsItem, Quote, Symbol};
use crate::error::ValidationError;
use crate::http_client::HttpError;
use crate::key_pool::ApiKey;
use crate::source::ProviderId;

/// Canonical gateway operations used for routing and capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Quote,
    Candles,
    DailyPrices,
    News,
    CompanyOverview,
    BasicFinancials,
    CompanyMetrics,
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    TechnicalIndicator,
}

impl Operation {
    pub const ALL: [Self; 11] = [
        Self::Quote,
        Self::Candles,
        Self::DailyPrices,
        Self::News,
        Self::CompanyOverview,
        Self::BasicFinancials,
        Self::CompanyMetrics,
        Self::IncomeStatement,
        Self::BalanceSheet,
        Self::CashFlow,
        Self::TechnicalIndicator,
    ];

    /// Canonical tool name exposed on the transport.
    pub const fn tool_name(self) -> &'static str {
        match self {
            Self::Quote => "get_stock_quote",
            Self::Candles => "get_stock_candles",
            Self::DailyPrices => "get_daily_prices",
            Self::News => "get_news",
            Self::CompanyOverview => "get_company_overview",
            Self::BasicFinancials => "get_company_basic_financials",
            Self::CompanyMetrics => "get_company_metrics",
            Self::IncomeStatement => "get_income_statement",
            Self::BalanceSheet => "get_balance_sheet",
            Self::CashFlow => "get_cash_flow",
            Self::TechnicalIndicator => "get_technical_indicator",
        }
    }

    /// Resolve a tool name, collapsing the legacy `get_quote` alias.
    pub fn from_tool_name(name: &str) -> Option<Self> {
        if name == "get_quote" {
            return Some(Self::Quote);
        }
        Self::ALL.into_iter().find(|op| op.tool_name() == name)
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tool_name())
    }
}

/// Supported operation set for one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet {
    ops: &'static [Operation],
}

impl CapabilitySet {
    pub const fn new(ops: &'static [Operation]) -> Self {
        Self { ops }
    }

    pub fn supports(self, operation: Operation) -> bool {
        self.ops.contains(&operation)
    }

    pub fn operations(self) -> &'static [Operation] {
        self.ops
    }
}

const ERROR_BODY_SNIPPET: usize = 200;

/// Structured adapter error, always tagged with its provider.
///
/// HTTP status codes are embedded in the message so the failure classifier
/// can categorize the error from text alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    provider: ProviderId,
    message: String,
    status: Option<u16>,
    unsupported: bool,
}

impl SourceError {
    pub fn unsupported(provider: ProviderId, operation: Operation) -> Self {
        Self {
            provider,
            message: format!("{provider} does not support operation {operation}"),
            status: None,
            unsupported: true,
        }
    }

    pub fn transport(provider: ProviderId, error: HttpError) -> Self {
        Self {
            provider,
            message: format!("{provider}: {}", error.message()),
            status: None,
            unsupported: false,
        }
    }

    pub fn http(provider: ProviderId, status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(ERROR_BODY_SNIPPET).collect();
        Self {
            provider,
            message: format!("{provider} returned status {status}: {}", snippet.trim()),
            status: Some(status),
            unsupported: false,
        }
    }

    /// Application-level failure inside a 2xx payload, or a parse failure.
    pub fn payload(provider: ProviderId, message: impl Into<String>) -> Self {
        Self {
            provider,
            message: format!("{provider}: {}", message.into()),
            status: None,
            unsupported: false,
        }
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_unsupported(&self) -> bool {
        self.unsupported
    }

    pub fn class(&self) -> FailureClass {
        classify(&self.message, self.status)
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SourceError {}

/// Candle resolution accepted by `get_stock_candles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Min1,
    Min5,
    Min15,
    Min30,
    Min60,
    Day,
    Week,
    Month,
}

impl Resolution {
    /// Finnhub resolution token; also the canonical spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1",
            Self::Min5 => "5",
            Self::Min15 => "15",
            Self::Min30 => "30",
            Self::Min60 => "60",
            Self::Day => "D",
            Self::Week => "W",
            Self::Month => "M",
        }
    }
}

impl FromStr for Resolution {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "1" => Ok(Self::Min1),
            "5" => Ok(Self::Min5),
            "15" => Ok(Self::Min15),
            "30" => Ok(Self::Min30),
            "60" => Ok(Self::Min60),
            "D" => Ok(Self::Day),
            "W" => Ok(Self::Week),
            "M" => Ok(Self::Month),
            other => Err(ValidationError::InvalidResolution {
                value: other.to_owned(),
            }),
        }
    }
}

/// Series length accepted by `get_daily_prices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputSize {
    #[default]
    Compact,
    Full,
}

impl OutputSize {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Full => "full",
        }
    }
}

impl FromStr for OutputSize {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "full" => Ok(Self::Full),
            other => Err(ValidationError::InvalidOutputSize {
                value: other.to_owned(),
            }),
        }
    }
}

/// Statement selected by the three statement tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Income,
    Balance,
    CashFlow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub symbol: Symbol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandlesRequest {
    pub symbol: Symbol,
    pub resolution: Resolution,
    /// Inclusive range bounds as `YYYY-MM-DD`; adapters fill provider defaults.
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyPricesRequest {
    pub symbol: Symbol,
    pub output_size: OutputSize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsRequest {
    pub symbol: Symbol,
    pub category: Option<String>,
    pub min_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyRequest {
    pub symbol: Symbol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsRequest {
    pub symbol: Symbol,
    pub metric_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementRequest {
    pub symbol: Symbol,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorRequest {
    pub symbol: Symbol,
    pub indicator: String,
    pub interval: String,
    pub time_period: u32,
}

/// Date-keyed daily price map returned by `get_daily_prices`.
pub type DailyPriceMap = BTreeMap<String, Candle>;

pub type AdapterFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

fn unsupported<'a, T: Send + 'a>(provider: ProviderId, operation: Operation) -> AdapterFuture<'a, T> {
    Box::pin(async move { Err(SourceError::unsupported(provider, operation)) })
}

/// One adapter per upstream provider.
///
/// Adapters are stateless beyond their injected transport, pacing gate and
/// configuration; they are safe to call concurrently. Credentials arrive per
/// call from the dispatcher's key pool.
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> CapabilitySet;

    fn quote<'a>(&'a self, req: QuoteRequest, key: ApiKey) -> AdapterFuture<'a, Quote> {
        let _ = (req, key);
        unsupported(self.id(), Operation::Quote)
    }

    fn candles<'a>(&'a self, req: CandlesRequest, key: ApiKey) -> AdapterFuture<'a, Vec<Candle>> {
        let _ = (req, key);
        unsupported(self.id(), Operation::Candles)
    }

    fn daily_prices<'a>(
        &'a self,
        req: DailyPricesRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, DailyPriceMap> {
        let _ = (req, key);
        unsupported(self.id(), Operation::DailyPrices)
    }

    fn news<'a>(&'a self, req: NewsRequest, key: ApiKey) -> AdapterFuture<'a, Vec<NewsItem>> {
        let _ = (req, key);
        unsupported(self.id(), Operation::News)
    }

    fn company_overview<'a>(
        &'a self,
        req: CompanyRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, CompanyInfo> {
        let _ = (req, key);
        unsupported(self.id(), Operation::CompanyOverview)
    }

    fn basic_financials<'a>(
        &'a self,
        req: CompanyRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, Financials> {
        let _ = (req, key);
        unsupported(self.id(), Operation::BasicFinancials)
    }

    fn company_metrics<'a>(
        &'a self,
        req: MetricsRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, CompanyInfo> {
        let _ = (req, key);
        unsupported(self.id(), Operation::CompanyMetrics)
    }

    fn statement<'a>(
        &'a self,
        req: StatementRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, Financials> {
        let operation = match req.kind {
            StatementKind::Income => Operation::IncomeStatement,
            StatementKind::Balance => Operation::BalanceSheet,
            StatementKind::CashFlow => Operation::CashFlow,
        };
        let _ = (req, key);
        unsupported(self.id(), operation)
    }

    fn technical_indicator<'a>(
        &'a self,
        req: IndicatorRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, IndicatorSeries> {
        let _ = (req, key);
        unsupported(self.id(), Operation::TechnicalIndicator)
    }
}
