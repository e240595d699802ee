//! Alpha Vantage adapter.
//!
//! Single `query` endpoint fanned out by `function=`; every numeric field
//! arrives as a string. Application failures hide inside 2xx bodies under
//! `Note` (throttling), `Information` (premium gate) and `Error Message`
//! keys, so every response is screened before parsing.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::PrimitiveDateTime;

use super::{parse_f64, send_checked};
use crate::domain::{
    Candle, CompanyInfo, Financials, IndicatorPoint, IndicatorSeries, NewsItem, Quote,
    StatementLines,
};
use crate::http_client::{HttpClient, HttpRequest};
use crate::key_pool::ApiKey;
use crate::provider::{
    AdapterFuture, CapabilitySet, CompanyRequest, DailyPricesRequest, DailyPriceMap,
    IndicatorRequest, MetricsRequest, NewsRequest, Operation, ProviderAdapter, QuoteRequest,
    SourceError, StatementKind, StatementRequest,
};
use crate::source::ProviderId;

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER: ProviderId = ProviderId::Alphavantage;

const NEWS_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]");

const CAPABILITIES: CapabilitySet = CapabilitySet::new(&[
    Operation::Quote,
    Operation::DailyPrices,
    Operation::News,
    Operation::CompanyOverview,
    Operation::CompanyMetrics,
    Operation::IncomeStatement,
    Operation::BalanceSheet,
    Operation::CashFlow,
    Operation::TechnicalIndicator,
]);

pub struct AlphaVantageAdapter {
    http: Arc<dyn HttpClient>,
    timeout_ms: u64,
}

impl AlphaVantageAdapter {
    pub fn new(http: Arc<dyn HttpClient>, timeout_ms: u64) -> Self {
        Self { http, timeout_ms }
    }

    async fn query(&self, params: String, key: &ApiKey) -> Result<Value, SourceError> {
        let request = HttpRequest::get(format!(
            "{BASE_URL}?{params}&apikey={}",
            urlencoding::encode(&key.credential)
        ))
        .with_timeout_ms(self.timeout_ms);

        let response = send_checked(self.http.as_ref(), PROVIDER, request).await?;
        let value: Value = serde_json::from_str(&response.body).map_err(|error| {
            SourceError::payload(PROVIDER, format!("unparseable response: {error}"))
        })?;

        screen_application_error(&value)?;
        Ok(value)
    }
}

/// Alpha Vantage signals failure inside 2xx bodies; surface those with
/// messages the classifier can tag.
fn screen_application_error(value: &Value) -> Result<(), SourceError> {
    if let Some(note) = value.get("Note").and_then(Value::as_str) {
        return Err(SourceError::payload(
            PROVIDER,
            format!("rate limit exceeded: {note}"),
        ));
    }
    if let Some(info) = value.get("Information").and_then(Value::as_str) {
        return Err(SourceError::payload(PROVIDER, format!("request rejected: {info}")));
    }
    if let Some(message) = value.get("Error Message").and_then(Value::as_str) {
        return Err(SourceError::payload(PROVIDER, format!("invalid request: {message}")));
    }
    Ok(())
}

fn numbered_field(object: &Value, key: &str) -> Option<f64> {
    object.get(key).and_then(Value::as_str).and_then(parse_f64)
}

fn candle_from_bar(date: &str, bar: &Value) -> Option<Candle> {
    Some(Candle {
        date: date.to_owned(),
        open: numbered_field(bar, "1. open")?,
        high: numbered_field(bar, "2. high")?,
        low: numbered_field(bar, "3. low")?,
        close: numbered_field(bar, "4. close")?,
        volume: numbered_field(bar, "5. volume").unwrap_or(0.0).max(0.0) as u64,
        adj_close: numbered_field(bar, "5. adjusted close"),
    })
}

fn statement_function(kind: StatementKind) -> &'static str {
    match kind {
        StatementKind::Income => "INCOME_STATEMENT",
        StatementKind::Balance => "BALANCE_SHEET",
        StatementKind::CashFlow => "CASH_FLOW",
    }
}

fn report_lines(report: &Value) -> StatementLines {
    report
        .as_object()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .as_str()
                        .and_then(parse_f64)
                        .map(|number| (name.clone(), number))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn news_unix(time_published: &str) -> Option<i64> {
    PrimitiveDateTime::parse(time_published, &NEWS_TIME_FORMAT)
        .ok()
        .map(|dt| dt.assume_utc().unix_timestamp())
}

fn company_info(symbol: &str, value: &Value) -> Result<CompanyInfo, SourceError> {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty() && *text != "None")
            .map(str::to_owned)
    };

    let name = field("Name").ok_or_else(|| {
        SourceError::payload(PROVIDER, format!("no overview data for symbol '{symbol}'"))
    })?;

    Ok(CompanyInfo {
        symbol: field("Symbol").unwrap_or_else(|| symbol.to_owned()),
        name,
        industry: field("Industry"),
        sector: field("Sector"),
        market_cap: field("MarketCapitalization").as_deref().and_then(parse_f64),
        shares_outstanding: field("SharesOutstanding").as_deref().and_then(parse_f64),
        description: field("Description"),
        peers: None,
    })
}

impl ProviderAdapter for AlphaVantageAdapter {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> CapabilitySet {
        CAPABILITIES
    }

    fn quote<'a>(&'a self, req: QuoteRequest, key: ApiKey) -> AdapterFuture<'a, Quote> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let value = self
                .query(
                    format!(
                        "function=GLOBAL_QUOTE&symbol={}",
                        urlencoding::encode(symbol)
                    ),
                    &key,
                )
                .await?;

            let quote = value
                .get("Global Quote")
                .filter(|q| q.as_object().is_some_and(|obj| !obj.is_empty()))
                .ok_or_else(|| {
                    SourceError::payload(PROVIDER, format!("no quote data for symbol '{symbol}'"))
                })?;

            let current = numbered_field(quote, "05. price").ok_or_else(|| {
                SourceError::payload(PROVIDER, "quote payload is missing '05. price'")
            })?;

            Ok(Quote {
                symbol: quote
                    .get("01. symbol")
                    .and_then(Value::as_str)
                    .unwrap_or(symbol)
                    .to_owned(),
                current,
                change: numbered_field(quote, "09. change").unwrap_or(0.0),
                percent_change: numbered_field(quote, "10. change percent").unwrap_or(0.0),
                day_high: numbered_field(quote, "03. high").unwrap_or(current),
                day_low: numbered_field(quote, "04. low").unwrap_or(current),
                day_open: numbered_field(quote, "02. open").unwrap_or(current),
                prev_close: numbered_field(quote, "08. previous close").unwrap_or(current),
            })
        })
    }

    fn daily_prices<'a>(
        &'a self,
        req: DailyPricesRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, DailyPriceMap> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let value = self
                .query(
                    format!(
                        "function=TIME_SERIES_DAILY&symbol={}&outputsize={}",
                        urlencoding::encode(symbol),
                        req.output_size.as_str(),
                    ),
                    &key,
                )
                .await?;

            let series = value
                .get("Time Series (Daily)")
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    SourceError::payload(
                        PROVIDER,
                        format!("no daily series for symbol '{symbol}'"),
                    )
                })?;

            let mut map = DailyPriceMap::new();
            for (date, bar) in series {
                if let Some(candle) = candle_from_bar(date, bar) {
                    map.insert(date.clone(), candle);
                }
            }
            Ok(map)
        })
    }

    fn news<'a>(&'a self, req: NewsRequest, key: ApiKey) -> AdapterFuture<'a, Vec<NewsItem>> {
        Box::pin(async move {
            let value = self
                .query(
                    format!(
                        "function=NEWS_SENTIMENT&tickers={}",
                        urlencoding::encode(req.symbol.as_str())
                    ),
                    &key,
                )
                .await?;

            let feed = value
                .get("feed")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            let items = feed
                .iter()
                .filter_map(|entry| {
                    let headline = entry.get("title")?.as_str()?.to_owned();
                    let datetime = entry
                        .get("time_published")
                        .and_then(Value::as_str)
                        .and_then(news_unix)
                        .unwrap_or(0);
                    Some(NewsItem {
                        id: None,
                        headline,
                        summary: entry.get("summary").and_then(Value::as_str).map(str::to_owned),
                        url: entry.get("url").and_then(Value::as_str).map(str::to_owned),
                        datetime,
                        source: entry.get("source").and_then(Value::as_str).map(str::to_owned),
                        category: req.category.clone(),
                        related: Some(req.symbol.as_str().to_owned()),
                    })
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
            let value = self
                .query(
                    format!("function=OVERVIEW&symbol={}", urlencoding::encode(symbol)),
                    &key,
                )
                .await?;
            company_info(symbol, &value)
        })
    }

    fn company_metrics<'a>(
        &'a self,
        req: MetricsRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, CompanyInfo> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let value = self
                .query(
                    format!("function=OVERVIEW&symbol={}", urlencoding::encode(symbol)),
                    &key,
                )
                .await?;
            company_info(symbol, &value)
        })
    }

    fn statement<'a>(
        &'a self,
        req: StatementRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, Financials> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let value = self
                .query(
                    format!(
                        "function={}&symbol={}",
                        statement_function(req.kind),
                        urlencoding::encode(symbol),
                    ),
                    &key,
                )
                .await?;

            let report = value
                .get("annualReports")
                .and_then(Value::as_array)
                .and_then(|reports| reports.first())
                .ok_or_else(|| {
                    SourceError::payload(
                        PROVIDER,
                        format!("no annual reports for symbol '{symbol}'"),
                    )
                })?;

            let period = report
                .get("fiscalDateEnding")
                .and_then(Value::as_str)
                .map(str::to_owned);
            let lines = report_lines(report);

            let (income, balance, cash_flow) = match req.kind {
                StatementKind::Income => (Some(lines), None, None),
                StatementKind::Balance => (None, Some(lines), None),
                StatementKind::CashFlow => (None, None, Some(lines)),
            };

            Ok(Financials {
                symbol: symbol.to_owned(),
                period,
                income,
                balance,
                cash_flow,
            })
        })
    }

    fn technical_indicator<'a>(
        &'a self,
        req: IndicatorRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, IndicatorSeries> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let function = req.indicator.to_ascii_uppercase();
            let value = self
                .query(
                    format!(
                        "function={function}&symbol={}&interval={}&time_period={}&series_type=close",
                        urlencoding::encode(symbol),
                        urlencoding::encode(&req.interval),
                        req.time_period,
                    ),
                    &key,
                )
                .await?;

            let section = format!("Technical Analysis: {function}");
            let analysis = value
                .get(&section)
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    SourceError::payload(
                        PROVIDER,
                        format!("no '{section}' section for symbol '{symbol}'"),
                    )
                })?;

            let mut ordered: BTreeMap<String, f64> = BTreeMap::new();
            for (timestamp, entry) in analysis {
                let point = entry
                    .get(&function)
                    .or_else(|| entry.as_object().and_then(|obj| obj.values().next()))
                    .and_then(Value::as_str)
                    .and_then(parse_f64);
                if let Some(point) = point {
                    ordered.insert(timestamp.clone(), point);
                }
            }

            Ok(IndicatorSeries {
                name: function,
                symbol: symbol.to_owned(),
                series: ordered
                    .into_iter()
                    .map(|(timestamp, value)| IndicatorPoint { timestamp, value })
                    .collect(),
            })
        })
    }
}
