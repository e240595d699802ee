//! East Money adapter.
//!
//! `push2.eastmoney.com` serves snapshot quotes and `push2his.eastmoney.com`
//! serves klines, both keyed by a `secid` of `<venue>.<code>`. Requests carry
//! a quote.eastmoney.com Referer and go through the shared pacing gate.
//! `fltt=2` asks for plain floats instead of scaled integers.

use std::sync::Arc;

use serde_json::Value;

use super::{days_ago, parse_f64, send_checked, today};
use crate::domain::{Candle, Market, Quote};
use crate::http_client::{HttpClient, HttpRequest};
use crate::key_pool::ApiKey;
use crate::pacing::Pacer;
use crate::provider::{
    AdapterFuture, CandlesRequest, CapabilitySet, DailyPriceMap, DailyPricesRequest, Operation,
    OutputSize, ProviderAdapter, QuoteRequest, Resolution, SourceError,
};
use crate::source::ProviderId;

const QUOTE_URL: &str = "https://push2.eastmoney.com/api/qt/stock/get";
const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
const REFERER: &str = "https://quote.eastmoney.com/";
const PROVIDER: ProviderId = ProviderId::Eastmoney;

const QUOTE_FIELDS: &str = "f43,f44,f45,f46,f57,f58,f60,f169,f170";
const KLINE_FIELDS: &str = "f51,f52,f53,f54,f55,f56,f57";

const CAPABILITIES: CapabilitySet = CapabilitySet::new(&[
    Operation::Quote,
    Operation::Candles,
    Operation::DailyPrices,
]);

pub struct EastMoneyAdapter {
    http: Arc<dyn HttpClient>,
    timeout_ms: u64,
    pacer: Pacer,
}

impl EastMoneyAdapter {
    pub fn new(http: Arc<dyn HttpClient>, timeout_ms: u64, pacer: Pacer) -> Self {
        Self {
            http,
            timeout_ms,
            pacer,
        }
    }

    async fn fetch(&self, url: String) -> Result<Value, SourceError> {
        self.pacer.pace().await;

        let request = HttpRequest::get(url)
            .with_header("referer", REFERER)
            .with_timeout_ms(self.timeout_ms);
        let response = send_checked(self.http.as_ref(), PROVIDER, request).await?;

        serde_json::from_str(&response.body).map_err(|error| {
            SourceError::payload(PROVIDER, format!("unparseable response: {error}"))
        })
    }
}

/// Map a routed symbol onto the `<venue>.<code>` secid.
fn secid(symbol: &str) -> Result<String, SourceError> {
    let code = symbol.rsplit_once('.').map_or(symbol, |(code, _)| code);
    let venue = match Market::classify(symbol) {
        Market::Sh => "1",
        Market::Sz | Market::Bj => "0",
        Market::Hk => "116",
        Market::Us | Market::Unknown => {
            return Err(SourceError::payload(
                PROVIDER,
                format!("symbol '{symbol}' has no eastmoney venue mapping"),
            ))
        }
    };
    Ok(format!("{venue}.{code}"))
}

const fn klt(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::Min1 => "1",
        Resolution::Min5 => "5",
        Resolution::Min15 => "15",
        Resolution::Min30 => "30",
        Resolution::Min60 => "60",
        Resolution::Day => "101",
        Resolution::Week => "102",
        Resolution::Month => "103",
    }
}

fn compact_date(date: &str) -> String {
    date.chars().filter(char::is_ascii_digit).collect()
}

fn numeric(data: &Value, field: &str) -> Option<f64> {
    data.get(field).and_then(Value::as_f64)
}

/// Parse one "date,open,close,high,low,volume,amount" kline row.
fn candle_from_kline(row: &str) -> Option<Candle> {
    let mut parts = row.split(',');
    let date = parts.next()?.to_owned();
    let open = parse_f64(parts.next()?)?;
    let close = parse_f64(parts.next()?)?;
    let high = parse_f64(parts.next()?)?;
    let low = parse_f64(parts.next()?)?;
    let volume = parts.next().and_then(parse_f64).unwrap_or(0.0).max(0.0) as u64;

    Some(Candle {
        date,
        open,
        high,
        low,
        close,
        volume,
        adj_close: None,
    })
}

fn klines(value: &Value, symbol: &str) -> Result<Vec<Candle>, SourceError> {
    let rows = value
        .get("data")
        .and_then(|data| data.get("klines"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            SourceError::payload(PROVIDER, format!("no kline data for symbol '{symbol}'"))
        })?;

    Ok(rows
        .iter()
        .filter_map(Value::as_str)
        .filter_map(candle_from_kline)
        .collect())
}

impl ProviderAdapter for EastMoneyAdapter {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> CapabilitySet {
        CAPABILITIES
    }

    fn quote<'a>(&'a self, req: QuoteRequest, _key: ApiKey) -> AdapterFuture<'a, Quote> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let secid = secid(symbol)?;
            let value = self
                .fetch(format!(
                    "{QUOTE_URL}?secid={secid}&invt=2&fltt=2&fields={QUOTE_FIELDS}"
                ))
                .await?;

            let data = value
                .get("data")
                .filter(|data| !data.is_null())
                .ok_or_else(|| {
                    SourceError::payload(
                        PROVIDER,
                        format!("no quote data for symbol '{symbol}'"),
                    )
                })?;

            let current = numeric(data, "f43").ok_or_else(|| {
                SourceError::payload(PROVIDER, format!("no last price for symbol '{symbol}'"))
            })?;

            Ok(Quote {
                symbol: symbol.to_owned(),
                current,
                change: numeric(data, "f169").unwrap_or(0.0),
                percent_change: numeric(data, "f170").unwrap_or(0.0),
                day_high: numeric(data, "f44").unwrap_or(current),
                day_low: numeric(data, "f45").unwrap_or(current),
                day_open: numeric(data, "f46").unwrap_or(current),
                prev_close: numeric(data, "f60").unwrap_or(current),
            })
        })
    }

    fn candles<'a>(&'a self, req: CandlesRequest, _key: ApiKey) -> AdapterFuture<'a, Vec<Candle>> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let secid = secid(symbol)?;
            let beg = req
                .from
                .as_deref()
                .map(compact_date)
                .unwrap_or_else(|| compact_date(&days_ago(365)));
            let end = req
                .to
                .as_deref()
                .map(compact_date)
                .unwrap_or_else(|| compact_date(&today()));

            let value = self
                .fetch(format!(
                    "{KLINE_URL}?secid={secid}&klt={}&fqt=1&beg={beg}&end={end}&fields1=f1,f2,f3&fields2={KLINE_FIELDS}",
                    klt(req.resolution),
                ))
                .await?;
            klines(&value, symbol)
        })
    }

    fn daily_prices<'a>(
        &'a self,
        req: DailyPricesRequest,
        _key: ApiKey,
    ) -> AdapterFuture<'a, DailyPriceMap> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let secid = secid(symbol)?;
            let beg = match req.output_size {
                OutputSize::Compact => compact_date(&days_ago(150)),
                OutputSize::Full => String::from("19900101"),
            };

            let value = self
                .fetch(format!(
                    "{KLINE_URL}?secid={secid}&klt=101&fqt=1&beg={beg}&end={}&fields1=f1,f2,f3&fields2={KLINE_FIELDS}",
                    compact_date(&today()),
                ))
                .await?;

            let mut map = DailyPriceMap::new();
            for candle in klines(&value, symbol)? {
                map.insert(candle.date.clone(), candle);
            }
            Ok(map)
        })
    }
}
