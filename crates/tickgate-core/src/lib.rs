//! # Tickgate Core
//!
//! Dispatch and resilience core for the tickgate financial-data gateway:
//! a uniform set of market-data operations served by whichever upstream
//! provider is healthy, keyed, and covers the symbol's market.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters (Finnhub, Alpha Vantage, TwelveData, Tiingo, Sina, East Money) |
//! | [`circuit_breaker`] | Per-provider circuit breaker |
//! | [`classify`] | Upstream failure classification |
//! | [`config`] | Environment-derived configuration |
//! | [`dispatch`] | Attempt audit records and dispatch results |
//! | [`domain`] | Symbols, markets, and common record shapes |
//! | [`facade`] | Tool entry points and argument validation |
//! | [`gateway`] | Process-wide context object and cascade driver |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`key_pool`] | Per-provider credential pools with cooldown |
//! | [`pacing`] | Minimum-interval gate for public endpoints |
//! | [`retry`] | Same-provider backoff envelope |
//! | [`routing`] | Market-aware source routing |
//! | [`source`] | Provider identifiers |
//!
//! ## Request flow
//!
//! ```text
//! tool facade ──▶ source router ──▶ dispatcher ──▶ provider adapter ──▶ HTTP
//!                  (market +          (circuit        (normalize to
//!                   capability)        breaker,        common records)
//!                                      key pool)
//! ```
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickgate_core::{Gateway, GatewayConfig, ReqwestHttpClient};
//!
//! let config = GatewayConfig::from_env();
//! let gateway = Gateway::new(config, Arc::new(ReqwestHttpClient::new()));
//! ```
//!
//! Credentials are read from environment variables only and never logged.

pub mod adapters;
pub mod circuit_breaker;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod facade;
pub mod gateway;
pub mod http_client;
pub mod key_pool;
pub mod pacing;
pub mod provider;
pub mod retry;
pub mod routing;
pub mod source;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use classify::{classify, FailureClass};
pub use config::GatewayConfig;
pub use dispatch::{Attempt, AttemptOutcome, Dispatched};
pub use domain::{
    Candle, CompanyInfo, Financials, IndicatorPoint, IndicatorSeries, Market, NewsItem, Quote,
    StatementLines, Symbol,
};
pub use error::{GatewayError, ValidationError};
pub use facade::ToolReply;
pub use gateway::Gateway;
pub use http_client::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
    ScriptedHttpClient,
};
pub use key_pool::{ApiKey, KeyPool, KeyStatus};
pub use pacing::Pacer;
pub use provider::{
    CandlesRequest, CapabilitySet, CompanyRequest, DailyPriceMap, DailyPricesRequest,
    IndicatorRequest, MetricsRequest, NewsRequest, Operation, OutputSize, ProviderAdapter,
    QuoteRequest, Resolution, SourceError, StatementKind, StatementRequest,
};
pub use retry::{Backoff, RetryConfig};
pub use routing::SourceRouter;
pub use source::ProviderId;
