//! Finnhub adapter.
//!
//! REST API under `https://finnhub.io/api/v1` authenticated with the
//! `X-Finnhub-Token` header. Free-tier quirk: `/quote` answers unknown
//! symbols with an all-zero body instead of an error status.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use super::{date_to_unix, days_ago, send_checked, today};
use crate::domain::{unix_to_date, Candle, CompanyInfo, Financials, NewsItem, Quote};
use crate::http_client::{HttpClient, HttpRequest};
use crate::key_pool::ApiKey;
use crate::provider::{
    AdapterFuture, CandlesRequest, CapabilitySet, CompanyRequest, MetricsRequest, NewsRequest,
    Operation, ProviderAdapter, QuoteRequest, SourceError,
};
use crate::source::ProviderId;

const BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER: ProviderId = ProviderId::Finnhub;

const CAPABILITIES: CapabilitySet = CapabilitySet::new(&[
    Operation::Quote,
    Operation::Candles,
    Operation::News,
    Operation::CompanyOverview,
    Operation::BasicFinancials,
    Operation::CompanyMetrics,
]);

pub struct FinnhubAdapter {
    http: Arc<dyn HttpClient>,
    timeout_ms: u64,
}

impl FinnhubAdapter {
    pub fn new(http: Arc<dyn HttpClient>, timeout_ms: u64) -> Self {
        Self { http, timeout_ms }
    }

    fn request(&self, path_and_query: String, key: &ApiKey) -> HttpRequest {
        HttpRequest::get(format!("{BASE_URL}{path_and_query}"))
            .with_header("X-Finnhub-Token", key.credential.clone())
            .with_timeout_ms(self.timeout_ms)
    }

    async fn fetch(&self, path_and_query: String, key: &ApiKey) -> Result<String, SourceError> {
        let response = send_checked(self.http.as_ref(), PROVIDER, self.request(path_and_query, key)).await?;
        Ok(response.body)
    }
}

#[derive(Debug, Deserialize)]
struct QuotePayload {
    c: Option<f64>,
    d: Option<f64>,
    dp: Option<f64>,
    h: Option<f64>,
    l: Option<f64>,
    o: Option<f64>,
    pc: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CandlePayload {
    s: String,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    h: Vec<f64>,
    #[serde(default)]
    l: Vec<f64>,
    #[serde(default)]
    o: Vec<f64>,
    #[serde(default)]
    v: Vec<f64>,
    #[serde(default)]
    t: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct NewsPayload {
    #[serde(default)]
    id: Option<i64>,
    headline: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    url: Option<String>,
    datetime: i64,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    related: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfilePayload {
    name: Option<String>,
    ticker: Option<String>,
    finnhub_industry: Option<String>,
    #[serde(default)]
    description: Option<String>,
    market_capitalization: Option<f64>,
    share_outstanding: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MetricPayload {
    #[serde(default)]
    metric: BTreeMap<String, serde_json::Value>,
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, SourceError> {
    serde_json::from_str(body)
        .map_err(|error| SourceError::payload(PROVIDER, format!("unparseable response: {error}")))
}

fn numeric_lines(metric: BTreeMap<String, serde_json::Value>) -> BTreeMap<String, f64> {
    metric
        .into_iter()
        .filter_map(|(name, value)| value.as_f64().map(|number| (name, number)))
        .collect()
}

impl ProviderAdapter for FinnhubAdapter {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> CapabilitySet {
        CAPABILITIES
    }

    fn quote<'a>(&'a self, req: QuoteRequest, key: ApiKey) -> AdapterFuture<'a, Quote> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let body = self
                .fetch(
                    format!("/quote?symbol={}", urlencoding::encode(symbol)),
                    &key,
                )
                .await?;
            let payload: QuotePayload = parse_json(&body)?;

            let current = payload.c.unwrap_or(0.0);
            if current == 0.0 && payload.o.unwrap_or(0.0) == 0.0 {
                return Err(SourceError::payload(
                    PROVIDER,
                    format!("no quote data for symbol '{symbol}'"),
                ));
            }

            Ok(Quote {
                symbol: symbol.to_owned(),
                current,
                change: payload.d.unwrap_or(0.0),
                percent_change: payload.dp.unwrap_or(0.0),
                day_high: payload.h.unwrap_or(current),
                day_low: payload.l.unwrap_or(current),
                day_open: payload.o.unwrap_or(current),
                prev_close: payload.pc.unwrap_or(current),
            })
        })
    }

    fn candles<'a>(&'a self, req: CandlesRequest, key: ApiKey) -> AdapterFuture<'a, Vec<Candle>> {
        Box::pin(async move {
            let to = req.to.clone().unwrap_or_else(today);
            let from = req.from.clone().unwrap_or_else(|| days_ago(365));
            let (from_ts, to_ts) = match (date_to_unix(&from), date_to_unix(&to)) {
                (Some(from_ts), Some(to_ts)) => (from_ts, to_ts + 86_399),
                _ => {
                    return Err(SourceError::payload(
                        PROVIDER,
                        format!("invalid candle range '{from}'..'{to}'"),
                    ))
                }
            };

            let body = self
                .fetch(
                    format!(
                        "/stock/candle?symbol={}&resolution={}&from={from_ts}&to={to_ts}",
                        urlencoding::encode(req.symbol.as_str()),
                        req.resolution.as_str(),
                    ),
                    &key,
                )
                .await?;
            let payload: CandlePayload = parse_json(&body)?;

            if payload.s == "no_data" {
                return Ok(Vec::new());
            }
            if payload.s != "ok" {
                return Err(SourceError::payload(
                    PROVIDER,
                    format!("unexpected candle status '{}'", payload.s),
                ));
            }

            let len = payload.t.len();
            if payload.c.len() != len
                || payload.o.len() != len
                || payload.h.len() != len
                || payload.l.len() != len
            {
                return Err(SourceError::payload(
                    PROVIDER,
                    "mismatched candle array lengths",
                ));
            }

            let mut candles = Vec::with_capacity(len);
            for i in 0..len {
                let Some(date) = unix_to_date(payload.t[i]) else {
                    continue;
                };
                candles.push(Candle {
                    date,
                    open: payload.o[i],
                    high: payload.h[i],
                    low: payload.l[i],
                    close: payload.c[i],
                    volume: payload.v.get(i).copied().unwrap_or(0.0).max(0.0) as u64,
                    adj_close: None,
                });
            }
            Ok(candles)
        })
    }

    fn news<'a>(&'a self, req: NewsRequest, key: ApiKey) -> AdapterFuture<'a, Vec<NewsItem>> {
        Box::pin(async move {
            let body = self
                .fetch(
                    format!(
                        "/company-news?symbol={}&from={}&to={}",
                        urlencoding::encode(req.symbol.as_str()),
                        days_ago(14),
                        today(),
                    ),
                    &key,
                )
                .await?;
            let payload: Vec<NewsPayload> = parse_json(&body)?;

            let items = payload
                .into_iter()
                .filter(|item| match (req.min_id, item.id) {
                    (Some(min_id), Some(id)) => id > min_id,
                    _ => true,
                })
                .filter(|item| match (&req.category, &item.category) {
                    (Some(wanted), Some(actual)) => actual.eq_ignore_ascii_case(wanted),
                    (Some(_), None) => false,
                    (None, _) => true,
                })
                .map(|item| NewsItem {
                    id: item.id,
                    headline: item.headline,
                    summary: item.summary,
                    url: item.url,
                    datetime: item.datetime,
                    source: item.source,
                    category: item.category,
                    related: item.related,
                })
                .collect();
            Ok(items)
        })
    }

    fn company_overview<'a>(
        &'a self,
        req: CompanyRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, CompanyInfo> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let body = self
                .fetch(
                    format!("/stock/profile2?symbol={}", urlencoding::encode(symbol)),
                    &key,
                )
                .await?;

            if body.trim() == "{}" {
                return Err(SourceError::payload(
                    PROVIDER,
                    format!("no profile data for symbol '{symbol}'"),
                ));
            }

            let payload: ProfilePayload = parse_json(&body)?;
            if payload.name.is_none() && payload.ticker.is_none() {
                return Err(SourceError::payload(
                    PROVIDER,
                    format!("no profile data for symbol '{symbol}'"),
                ));
            }

            Ok(CompanyInfo {
                symbol: payload.ticker.unwrap_or_else(|| symbol.to_owned()),
                name: payload.name.unwrap_or_else(|| symbol.to_owned()),
                industry: payload.finnhub_industry.clone(),
                sector: payload.finnhub_industry,
                // Finnhub reports market cap in millions.
                market_cap: payload.market_capitalization.map(|mc| mc * 1_000_000.0),
                shares_outstanding: payload.share_outstanding.map(|so| so * 1_000_000.0),
                description: payload.description,
                peers: None,
            })
        })
    }

    fn basic_financials<'a>(
        &'a self,
        req: CompanyRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, Financials> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let body = self
                .fetch(
                    format!("/stock/metric?symbol={}&metric=all", urlencoding::encode(symbol)),
                    &key,
                )
                .await?;
            let payload: MetricPayload = parse_json(&body)?;

            if payload.metric.is_empty() {
                return Err(SourceError::payload(
                    PROVIDER,
                    format!("no financial metrics for symbol '{symbol}'"),
                ));
            }

            // Flat TTM metric block; the record has no dedicated slot for it.
            Ok(Financials {
                symbol: symbol.to_owned(),
                period: Some(String::from("ttm")),
                income: Some(numeric_lines(payload.metric)),
                balance: None,
                cash_flow: None,
            })
        })
    }

    fn company_metrics<'a>(
        &'a self,
        req: MetricsRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, CompanyInfo> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let metric_type = req.metric_type.as_deref().unwrap_or("all");
            let body = self
                .fetch(
                    format!(
                        "/stock/metric?symbol={}&metric={}",
                        urlencoding::encode(symbol),
                        urlencoding::encode(metric_type),
                    ),
                    &key,
                )
                .await?;
            let payload: MetricPayload = parse_json(&body)?;
            let lines = numeric_lines(payload.metric);

            Ok(CompanyInfo {
                symbol: symbol.to_owned(),
                name: symbol.to_owned(),
                industry: None,
                sector: None,
                market_cap: lines.get("marketCapitalization").map(|mc| mc * 1_000_000.0),
                shares_outstanding: None,
                description: None,
                peers: None,
            })
        })
    }
}
