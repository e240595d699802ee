//! TwelveData adapter.
//!
//! JSON API under `https://api.twelvedata.com` with `apikey=` query auth.
//! Numeric fields are strings, series arrive newest first, and failures come
//! back as 2xx bodies with `status:"error"` and an HTTP-style `code`.

use std::sync::Arc;

use serde_json::Value;

use super::{parse_f64, send_checked};
use crate::domain::{Candle, IndicatorPoint, IndicatorSeries, Quote};
use crate::http_client::{HttpClient, HttpRequest};
use crate::key_pool::ApiKey;
use crate::provider::{
    AdapterFuture, CandlesRequest, CapabilitySet, DailyPriceMap, DailyPricesRequest,
    IndicatorRequest, Operation, OutputSize, ProviderAdapter, QuoteRequest, Resolution,
    SourceError,
};
use crate::source::ProviderId;

const BASE_URL: &str = "https://api.twelvedata.com";
const PROVIDER: ProviderId = ProviderId::Twelvedata;

const CAPABILITIES: CapabilitySet = CapabilitySet::new(&[
    Operation::Quote,
    Operation::Candles,
    Operation::DailyPrices,
    Operation::TechnicalIndicator,
]);

pub struct TwelveDataAdapter {
    http: Arc<dyn HttpClient>,
    timeout_ms: u64,
}

impl TwelveDataAdapter {
    pub fn new(http: Arc<dyn HttpClient>, timeout_ms: u64) -> Self {
        Self { http, timeout_ms }
    }

    async fn fetch(&self, endpoint: &str, params: String, key: &ApiKey) -> Result<Value, SourceError> {
        let request = HttpRequest::get(format!(
            "{BASE_URL}/{endpoint}?{params}&apikey={}",
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

fn screen_application_error(value: &Value) -> Result<(), SourceError> {
    if value.get("status").and_then(Value::as_str) == Some("error") {
        let code = value
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(500);
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("upstream error");
        return Err(SourceError::http(PROVIDER, code, message));
    }
    Ok(())
}

fn string_field(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_str).and_then(parse_f64)
}

const fn interval_token(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::Min1 => "1min",
        Resolution::Min5 => "5min",
        Resolution::Min15 => "15min",
        Resolution::Min30 => "30min",
        Resolution::Min60 => "1h",
        Resolution::Day => "1day",
        Resolution::Week => "1week",
        Resolution::Month => "1month",
    }
}

/// Map the tool-level interval vocabulary onto TwelveData tokens.
fn indicator_interval(interval: &str) -> String {
    match interval.trim().to_ascii_lowercase().as_str() {
        "daily" | "1d" | "d" => String::from("1day"),
        "weekly" | "1w" | "w" => String::from("1week"),
        "monthly" | "1m_cal" | "m" => String::from("1month"),
        "60min" | "1h" => String::from("1h"),
        other => other.to_owned(),
    }
}

fn series_values(value: &Value) -> Result<Vec<Value>, SourceError> {
    value
        .get("values")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| SourceError::payload(PROVIDER, "response is missing 'values'"))
}

fn candle_from_value(entry: &Value) -> Option<Candle> {
    Some(Candle {
        date: entry.get("datetime")?.as_str()?.to_owned(),
        open: string_field(entry, "open")?,
        high: string_field(entry, "high")?,
        low: string_field(entry, "low")?,
        close: string_field(entry, "close")?,
        volume: string_field(entry, "volume").unwrap_or(0.0).max(0.0) as u64,
        adj_close: None,
    })
}

impl ProviderAdapter for TwelveDataAdapter {
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
                .fetch(
                    "quote",
                    format!("symbol={}", urlencoding::encode(symbol)),
                    &key,
                )
                .await?;

            let current = string_field(&value, "close").ok_or_else(|| {
                SourceError::payload(PROVIDER, format!("no quote data for symbol '{symbol}'"))
            })?;

            Ok(Quote {
                symbol: value
                    .get("symbol")
                    .and_then(Value::as_str)
                    .unwrap_or(symbol)
                    .to_owned(),
                current,
                change: string_field(&value, "change").unwrap_or(0.0),
                percent_change: string_field(&value, "percent_change").unwrap_or(0.0),
                day_high: string_field(&value, "high").unwrap_or(current),
                day_low: string_field(&value, "low").unwrap_or(current),
                day_open: string_field(&value, "open").unwrap_or(current),
                prev_close: string_field(&value, "previous_close").unwrap_or(current),
            })
        })
    }

    fn candles<'a>(&'a self, req: CandlesRequest, key: ApiKey) -> AdapterFuture<'a, Vec<Candle>> {
        Box::pin(async move {
            let mut params = format!(
                "symbol={}&interval={}&outputsize=5000",
                urlencoding::encode(req.symbol.as_str()),
                interval_token(req.resolution),
            );
            if let Some(from) = &req.from {
                params.push_str(&format!("&start_date={}", urlencoding::encode(from)));
            }
            if let Some(to) = &req.to {
                params.push_str(&format!("&end_date={}", urlencoding::encode(to)));
            }

            let value = self.fetch("time_series", params, &key).await?;
            let mut candles: Vec<Candle> = series_values(&value)?
                .iter()
                .filter_map(candle_from_value)
                .collect();
            candles.reverse();
            Ok(candles)
        })
    }

    fn daily_prices<'a>(
        &'a self,
        req: DailyPricesRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, DailyPriceMap> {
        Box::pin(async move {
            let output_size = match req.output_size {
                OutputSize::Compact => 100,
                OutputSize::Full => 5000,
            };
            let value = self
                .fetch(
                    "time_series",
                    format!(
                        "symbol={}&interval=1day&outputsize={output_size}",
                        urlencoding::encode(req.symbol.as_str()),
                    ),
                    &key,
                )
                .await?;

            let mut map = DailyPriceMap::new();
            for entry in series_values(&value)? {
                if let Some(candle) = candle_from_value(&entry) {
                    let date = candle.date.chars().take(10).collect::<String>();
                    map.insert(date, candle);
                }
            }
            Ok(map)
        })
    }

    fn technical_indicator<'a>(
        &'a self,
        req: IndicatorRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, IndicatorSeries> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let endpoint = req.indicator.trim().to_ascii_lowercase();
            if endpoint.is_empty() || !endpoint.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
                return Err(SourceError::payload(
                    PROVIDER,
                    format!("unsupported indicator '{}'", req.indicator),
                ));
            }

            let value = self
                .fetch(
                    &endpoint,
                    format!(
                        "symbol={}&interval={}&time_period={}",
                        urlencoding::encode(symbol),
                        indicator_interval(&req.interval),
                        req.time_period,
                    ),
                    &key,
                )
                .await?;

            let mut series: Vec<IndicatorPoint> = series_values(&value)?
                .iter()
                .filter_map(|entry| {
                    let timestamp = entry.get("datetime")?.as_str()?.to_owned();
                    let point = string_field(entry, &endpoint).or_else(|| {
                        entry
                            .as_object()
                            .and_then(|obj| {
                                obj.iter()
                                    .find(|(name, _)| name.as_str() != "datetime")
                                    .map(|(_, v)| v)
                            })
                            .and_then(Value::as_str)
                            .and_then(parse_f64)
                    })?;
                    Some(IndicatorPoint {
                        timestamp,
                        value: point,
                    })
                })
                .collect();
            series.reverse();

            Ok(IndicatorSeries {
                name: endpoint.to_ascii_uppercase(),
                symbol: symbol.to_owned(),
                series,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FailureClass;
    use crate::domain::Symbol;
    use crate::http_client::{HttpResponse, ScriptedHttpClient};

    fn key() -> ApiKey {
        ApiKey {
            credential: String::from("td-key"),
            index: 0,
        }
    }

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    #[tokio::test]
    async fn quote_parses_string_numerics() {
        let http = Arc::new(ScriptedHttpClient::new().on(
            "/quote?symbol=AAPL",
            HttpResponse::ok(
                r#"{"symbol":"AAPL","open":"149.00","high":"152.00","low":"148.50","close":"150.25","previous_close":"148.75","change":"1.50","percent_change":"1.01"}"#,
            ),
        ));
        let adapter = TwelveDataAdapter::new(http, 5_000);

        let quote = adapter
            .quote(QuoteRequest { symbol: symbol("AAPL") }, key())
            .await
            .expect("quote should parse");

        assert_eq!(quote.current, 150.25);
        assert_eq!(quote.day_open, 149.0);
    }

    #[tokio::test]
    async fn embedded_error_code_drives_classification() {
        let http = Arc::new(ScriptedHttpClient::new().on(
            "/quote",
            HttpResponse::ok(
                r#"{"code":429,"message":"You have run out of API credits for the current minute.","status":"error"}"#,
            ),
        ));
        let adapter = TwelveDataAdapter::new(http, 5_000);

        let error = adapter
            .quote(QuoteRequest { symbol: symbol("AAPL") }, key())
            .await
            .expect_err("must fail");
        assert_eq!(error.status(), Some(429));
        assert_eq!(error.class(), FailureClass::RateLimit);
    }

    #[tokio::test]
    async fn time_series_reverses_to_oldest_first() {
        let http = Arc::new(ScriptedHttpClient::new().on(
            "/time_series",
            HttpResponse::ok(
                r#"{"values":[{"datetime":"2024-01-03","open":"150.50","high":"152.00","low":"150.00","close":"151.75","volume":"52000000"},{"datetime":"2024-01-02","open":"149.00","high":"151.00","low":"148.50","close":"150.50","volume":"48000000"}],"status":"ok"}"#,
            ),
        ));
        let adapter = TwelveDataAdapter::new(http, 5_000);

        let candles = adapter
            .candles(
                CandlesRequest {
                    symbol: symbol("AAPL"),
                    resolution: Resolution::Day,
                    from: None,
                    to: None,
                },
                key(),
            )
            .await
            .expect("candles should parse");

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].date, "2024-01-02");
        assert_eq!(candles[1].date, "2024-01-03");
    }

    #[tokio::test]
    async fn indicator_endpoint_is_the_lowercased_name() {
        let http = Arc::new(ScriptedHttpClient::new().on(
            "/rsi?symbol=AAPL",
            HttpResponse::ok(
                r#"{"values":[{"datetime":"2024-01-03","rsi":"61.20"},{"datetime":"2024-01-02","rsi":"55.10"}],"status":"ok"}"#,
            ),
        ));
        let adapter = TwelveDataAdapter::new(http.clone(), 5_000);

        let series = adapter
            .technical_indicator(
                IndicatorRequest {
                    symbol: symbol("AAPL"),
                    indicator: String::from("RSI"),
                    interval: String::from("daily"),
                    time_period: 14,
                },
                key(),
            )
            .await
            .expect("indicator should parse");

        assert_eq!(series.name, "RSI");
        assert_eq!(series.series[0].timestamp, "2024-01-02");
        assert_eq!(series.series[0].value, 55.1);
        assert!(http.requests()[0].url.contains("interval=1day"));
        assert!(http.requests()[0].url.contains("time_period=14"));
    }

    #[tokio::test]
    async fn hostile_indicator_names_are_rejected() {
        let http = Arc::new(ScriptedHttpClient::new());
        let adapter = TwelveDataAdapter::new(http.clone(), 5_000);

        let error = adapter
            .technical_indicator(
                IndicatorRequest {
                    symbol: symbol("AAPL"),
                    indicator: String::from("../admin"),
                    interval: String::from("daily"),
                    time_period: 14,
                },
                key(),
            )
            .await
            .expect_err("must fail");
        assert!(error.message().contains("unsupported indicator"));
        assert_eq!(http.request_count(), 0);
    }
}
