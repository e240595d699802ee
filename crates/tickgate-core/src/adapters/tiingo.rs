//! Tiingo adapter.
//!
//! REST API under `https://api.tiingo.com` with `Authorization: Token`
//! header auth. Some proxies strip the header and Tiingo answers 403; the
//! adapter falls back to `token=` query auth once before giving up.

use std::sync::Arc;

use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::{days_ago, today};
use crate::domain::{Candle, CompanyInfo, NewsItem, Quote};
use crate::http_client::{HttpClient, HttpRequest};
use crate::key_pool::ApiKey;
use crate::provider::{
    AdapterFuture, CandlesRequest, CapabilitySet, CompanyRequest, DailyPriceMap,
    DailyPricesRequest, NewsRequest, Operation, OutputSize, ProviderAdapter, QuoteRequest,
    SourceError,
};
use crate::source::ProviderId;

const BASE_URL: &str = "https://api.tiingo.com";
const PROVIDER: ProviderId = ProviderId::Tiingo;

const CAPABILITIES: CapabilitySet = CapabilitySet::new(&[
    Operation::Quote,
    Operation::Candles,
    Operation::DailyPrices,
    Operation::News,
    Operation::CompanyOverview,
]);

pub struct TiingoAdapter {
    http: Arc<dyn HttpClient>,
    timeout_ms: u64,
}

impl TiingoAdapter {
    pub fn new(http: Arc<dyn HttpClient>, timeout_ms: u64) -> Self {
        Self { http, timeout_ms }
    }

    async fn fetch(&self, path_and_query: String, key: &ApiKey) -> Result<String, SourceError> {
        let url = format!("{BASE_URL}{path_and_query}");
        let request = HttpRequest::get(&url)
            .with_header("authorization", format!("Token {}", key.credential))
            .with_timeout_ms(self.timeout_ms);

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|error| SourceError::transport(PROVIDER, error))?;

        if response.status == 403 {
            let separator = if path_and_query.contains('?') { '&' } else { '?' };
            let fallback = HttpRequest::get(format!(
                "{url}{separator}token={}",
                urlencoding::encode(&key.credential)
            ))
            .with_timeout_ms(self.timeout_ms);

            let retried = self
                .http
                .execute(fallback)
                .await
                .map_err(|error| SourceError::transport(PROVIDER, error))?;
            if !retried.is_success() {
                return Err(SourceError::http(PROVIDER, retried.status, &retried.body));
            }
            return Ok(retried.body);
        }

        if !response.is_success() {
            return Err(SourceError::http(PROVIDER, response.status, &response.body));
        }
        Ok(response.body)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IexPayload {
    #[serde(default)]
    ticker: Option<String>,
    #[serde(default)]
    last: Option<f64>,
    #[serde(default)]
    tngo_last: Option<f64>,
    #[serde(default)]
    prev_close: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    #[serde(default)]
    open: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyBarPayload {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    adj_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsPayload {
    #[serde(default)]
    id: Option<i64>,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaPayload {
    #[serde(default)]
    ticker: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, SourceError> {
    serde_json::from_str(body)
        .map_err(|error| SourceError::payload(PROVIDER, format!("unparseable response: {error}")))
}

fn bar_to_candle(bar: DailyBarPayload) -> Candle {
    Candle {
        date: bar.date.chars().take(10).collect(),
        open: bar.open,
        high: bar.high,
        low: bar.low,
        close: bar.close,
        volume: bar.volume.unwrap_or(0.0).max(0.0) as u64,
        adj_close: bar.adj_close,
    }
}

fn published_unix(raw: Option<&str>) -> i64 {
    raw.and_then(|text| OffsetDateTime::parse(text, &Rfc3339).ok())
        .map(|dt| dt.unix_timestamp())
        .unwrap_or(0)
}

impl ProviderAdapter for TiingoAdapter {
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
                    format!("/iex/?tickers={}", urlencoding::encode(symbol)),
                    &key,
                )
                .await?;
            let payload: Vec<IexPayload> = parse_json(&body)?;

            let entry = payload.into_iter().next().ok_or_else(|| {
                SourceError::payload(PROVIDER, format!("no quote data for symbol '{symbol}'"))
            })?;

            let current = entry.last.or(entry.tngo_last).ok_or_else(|| {
                SourceError::payload(PROVIDER, format!("no last price for symbol '{symbol}'"))
            })?;
            let prev_close = entry.prev_close.unwrap_or(current);
            let change = current - prev_close;
            let percent_change = if prev_close != 0.0 {
                change / prev_close * 100.0
            } else {
                0.0
            };

            Ok(Quote {
                symbol: entry.ticker.unwrap_or_else(|| symbol.to_owned()),
                current,
                change,
                percent_change,
                day_high: entry.high.unwrap_or(current),
                day_low: entry.low.unwrap_or(current),
                day_open: entry.open.unwrap_or(current),
                prev_close,
            })
        })
    }

    fn candles<'a>(&'a self, req: CandlesRequest, key: ApiKey) -> AdapterFuture<'a, Vec<Candle>> {
        Box::pin(async move {
            let start = req.from.clone().unwrap_or_else(|| days_ago(365));
            let end = req.to.clone().unwrap_or_else(today);
            let body = self
                .fetch(
                    format!(
                        "/tiingo/daily/{}/prices?startDate={}&endDate={}",
                        urlencoding::encode(req.symbol.as_str()),
                        urlencoding::encode(&start),
                        urlencoding::encode(&end),
                    ),
                    &key,
                )
                .await?;
            let payload: Vec<DailyBarPayload> = parse_json(&body)?;
            Ok(payload.into_iter().map(bar_to_candle).collect())
        })
    }

    fn daily_prices<'a>(
        &'a self,
        req: DailyPricesRequest,
        key: ApiKey,
    ) -> AdapterFuture<'a, DailyPriceMap> {
        Box::pin(async move {
            let start = match req.output_size {
                OutputSize::Compact => days_ago(150),
                OutputSize::Full => String::from("1990-01-01"),
            };
            let body = self
                .fetch(
                    format!(
                        "/tiingo/daily/{}/prices?startDate={}",
                        urlencoding::encode(req.symbol.as_str()),
                        urlencoding::encode(&start),
                    ),
                    &key,
                )
                .await?;
            let payload: Vec<DailyBarPayload> = parse_json(&body)?;

            let mut map = DailyPriceMap::new();
            for bar in payload {
                let candle = bar_to_candle(bar);
                map.insert(candle.date.clone(), candle);
            }
            Ok(map)
        })
    }

    fn news<'a>(&'a self, req: NewsRequest, key: ApiKey) -> AdapterFuture<'a, Vec<NewsItem>> {
        Box::pin(async move {
            let body = self
                .fetch(
                    format!(
                        "/tiingo/news?tickers={}&limit=50",
                        urlencoding::encode(req.symbol.as_str())
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
                .map(|item| NewsItem {
                    id: item.id,
                    headline: item.title,
                    summary: item.description,
                    url: item.url,
                    datetime: published_unix(item.published_date.as_deref()),
                    source: item.source,
                    category: req.category.clone(),
                    related: (!item.tags.is_empty()).then(|| item.tags.join(",")),
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
                    format!("/tiingo/daily/{}", urlencoding::encode(symbol)),
                    &key,
                )
                .await?;
            let payload: MetaPayload = parse_json(&body)?;

            let name = payload.name.ok_or_else(|| {
                SourceError::payload(PROVIDER, format!("no company data for symbol '{symbol}'"))
            })?;

            Ok(CompanyInfo {
                symbol: payload.ticker.unwrap_or_else(|| symbol.to_owned()),
                name,
                industry: None,
                sector: None,
                market_cap: None,
                shares_outstanding: None,
                description: payload.description,
                peers: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Symbol;
    use crate::http_client::{HttpResponse, ScriptedHttpClient};

    fn key() -> ApiKey {
        ApiKey {
            credential: String::from("tiingo-key"),
            index: 0,
        }
    }

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    #[tokio::test]
    async fn iex_quote_computes_change_fields() {
        let http = Arc::new(ScriptedHttpClient::new().on(
            "/iex/?tickers=AAPL",
            HttpResponse::ok(
                r#"[{"ticker":"AAPL","last":150.25,"prevClose":148.75,"high":152.0,"low":148.5,"open":149.0}]"#,
            ),
        ));
        let adapter = TiingoAdapter::new(http.clone(), 5_000);

        let quote = adapter
            .quote(QuoteRequest { symbol: symbol("AAPL") }, key())
            .await
            .expect("quote should parse");

        assert_eq!(quote.current, 150.25);
        assert!((quote.change - 1.5).abs() < 1e-9);
        assert!((quote.percent_change - 1.008403).abs() < 1e-3);

        let sent = http.requests();
        assert_eq!(
            sent[0].headers.get("authorization").map(String::as_str),
            Some("Token tiingo-key")
        );
    }

    #[tokio::test]
    async fn forbidden_header_auth_falls_back_to_query_token() {
        // Rules match in registration order, so the more specific fallback
        // URL has to come first.
        let http = Arc::new(
            ScriptedHttpClient::new()
                .on(
                    "token=tiingo-key",
                    HttpResponse::ok(r#"[{"ticker":"AAPL","last":150.25,"prevClose":148.75}]"#),
                )
                .on("/iex/?tickers=AAPL", HttpResponse::status(403, "forbidden")),
        );
        let adapter = TiingoAdapter::new(http.clone(), 5_000);

        let quote = adapter
            .quote(QuoteRequest { symbol: symbol("AAPL") }, key())
            .await
            .expect("fallback should succeed");
        assert_eq!(quote.current, 150.25);

        let sent = http.requests();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].url.contains("token=tiingo-key"));
        assert!(!sent[1].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn failed_fallback_surfaces_the_second_status() {
        let http = Arc::new(
            ScriptedHttpClient::new()
                .on("token=", HttpResponse::status(401, "bad token"))
                .on("/iex/", HttpResponse::status(403, "forbidden")),
        );
        let adapter = TiingoAdapter::new(http, 5_000);

        let error = adapter
            .quote(QuoteRequest { symbol: symbol("AAPL") }, key())
            .await
            .expect_err("must fail");
        assert_eq!(error.status(), Some(401));
    }

    #[tokio::test]
    async fn daily_bars_truncate_iso_dates() {
        let http = Arc::new(ScriptedHttpClient::new().on(
            "/tiingo/daily/AAPL/prices",
            HttpResponse::ok(
                r#"[{"date":"2024-01-02T00:00:00.000Z","open":149.0,"high":151.0,"low":148.5,"close":150.5,"volume":48000000,"adjClose":150.1}]"#,
            ),
        ));
        let adapter = TiingoAdapter::new(http, 5_000);

        let candles = adapter
            .candles(
                CandlesRequest {
                    symbol: symbol("AAPL"),
                    resolution: "D".parse().expect("valid resolution"),
                    from: Some(String::from("2024-01-01")),
                    to: Some(String::from("2024-01-05")),
                },
                key(),
            )
            .await
            .expect("candles should parse");

        assert_eq!(candles[0].date, "2024-01-02");
        assert_eq!(candles[0].adj_close, Some(150.1));
    }

    #[tokio::test]
    async fn news_parses_rfc3339_published_dates() {
        let http = Arc::new(ScriptedHttpClient::new().on(
            "/tiingo/news",
            HttpResponse::ok(
                r#"[{"id":7,"title":"Apple ships","url":"https://example.test/a","description":"d","publishedDate":"2024-01-02T12:00:00Z","source":"wire","tags":["aapl","tech"]}]"#,
            ),
        ));
        let adapter = TiingoAdapter::new(http, 5_000);

        let items = adapter
            .news(
                NewsRequest {
                    symbol: symbol("AAPL"),
                    category: None,
                    min_id: None,
                },
                key(),
            )
            .await
            .expect("news should parse");

        assert_eq!(items[0].datetime, 1_704_196_800);
        assert_eq!(items[0].related.as_deref(), Some("aapl,tech"));
    }
}
