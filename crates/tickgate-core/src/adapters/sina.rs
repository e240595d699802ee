//! Sina quote adapter.
//!
//! `hq.sinajs.cn` serves real-time quotes for mainland and Hong Kong venues
//! as a javascript assignment, one comma-separated record per symbol. The
//! endpoint needs no credentials but requires a finance.sina.com.cn Referer
//! and IP-level pacing. The payload is GBK-encoded; only numeric columns are
//! consumed, so a lossy decode is safe.

use std::sync::Arc;

use super::{parse_f64, send_checked};
use crate::domain::{Market, Quote};
use crate::http_client::{HttpClient, HttpRequest};
use crate::key_pool::ApiKey;
use crate::pacing::Pacer;
use crate::provider::{
    AdapterFuture, CapabilitySet, Operation, ProviderAdapter, QuoteRequest, SourceError,
};
use crate::source::ProviderId;

const BASE_URL: &str = "https://hq.sinajs.cn";
const REFERER: &str = "https://finance.sina.com.cn/";
const PROVIDER: ProviderId = ProviderId::Sina;

const CAPABILITIES: CapabilitySet = CapabilitySet::new(&[Operation::Quote]);

pub struct SinaAdapter {
    http: Arc<dyn HttpClient>,
    timeout_ms: u64,
    pacer: Pacer,
}

impl SinaAdapter {
    pub fn new(http: Arc<dyn HttpClient>, timeout_ms: u64, pacer: Pacer) -> Self {
        Self {
            http,
            timeout_ms,
            pacer,
        }
    }
}

/// Map a routed symbol onto sina's venue-prefixed code.
fn sina_code(symbol: &str) -> Result<String, SourceError> {
    let (code, market) = match symbol.rsplit_once('.') {
        Some((code, _)) => (code, Market::classify(symbol)),
        None => (symbol, Market::classify(symbol)),
    };

    let mapped = match market {
        Market::Sh => format!("sh{code}"),
        Market::Sz => format!("sz{code}"),
        Market::Bj => format!("bj{code}"),
        Market::Hk => format!("rt_hk{code}"),
        Market::Us | Market::Unknown => {
            return Err(SourceError::payload(
                PROVIDER,
                format!("symbol '{symbol}' has no sina venue mapping"),
            ))
        }
    };
    Ok(mapped)
}

/// Extract the quoted record body from `var hq_str_xx="...";`.
fn record_body(body: &str) -> Option<&str> {
    let start = body.find('"')? + 1;
    let end = body.rfind('"')?;
    (end >= start).then(|| &body[start..end])
}

fn field(fields: &[&str], index: usize) -> f64 {
    fields.get(index).and_then(|raw| parse_f64(raw)).unwrap_or(0.0)
}

fn quote_from_record(symbol: &str, code: &str, record: &str) -> Result<Quote, SourceError> {
    let fields: Vec<&str> = record.split(',').collect();
    if fields.len() < 6 {
        return Err(SourceError::payload(
            PROVIDER,
            format!("truncated quote record for symbol '{symbol}'"),
        ));
    }

    if code.starts_with("rt_hk") {
        // en-name, name, open, prev_close, high, low, current, change, pct
        let current = field(&fields, 6);
        return Ok(Quote {
            symbol: symbol.to_owned(),
            current,
            change: field(&fields, 7),
            percent_change: field(&fields, 8),
            day_high: field(&fields, 4),
            day_low: field(&fields, 5),
            day_open: field(&fields, 2),
            prev_close: field(&fields, 3),
        });
    }

    // name, open, prev_close, current, high, low, ...
    let current = field(&fields, 3);
    let prev_close = field(&fields, 2);
    let change = current - prev_close;
    let percent_change = if prev_close != 0.0 {
        change / prev_close * 100.0
    } else {
        0.0
    };

    Ok(Quote {
        symbol: symbol.to_owned(),
        current,
        change,
        percent_change,
        day_high: field(&fields, 4),
        day_low: field(&fields, 5),
        day_open: field(&fields, 1),
        prev_close,
    })
}

impl ProviderAdapter for SinaAdapter {
    fn id(&self) -> ProviderId {
        PROVIDER
    }

    fn capabilities(&self) -> CapabilitySet {
        CAPABILITIES
    }

    fn quote<'a>(&'a self, req: QuoteRequest, _key: ApiKey) -> AdapterFuture<'a, Quote> {
        Box::pin(async move {
            let symbol = req.symbol.as_str();
            let code = sina_code(symbol)?;

            self.pacer.pace().await;

            let request = HttpRequest::get(format!("{BASE_URL}/list={code}"))
                .with_header("referer", REFERER)
                .with_timeout_ms(self.timeout_ms);
            let response = send_checked(self.http.as_ref(), PROVIDER, request).await?;

            let record = record_body(&response.body).ok_or_else(|| {
                SourceError::payload(PROVIDER, format!("malformed quote payload for '{symbol}'"))
            })?;
            if record.is_empty() {
                return Err(SourceError::payload(
                    PROVIDER,
                    format!("no quote data for symbol '{symbol}'"),
                ));
            }

            quote_from_record(symbol, &code, record)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Symbol;
    use crate::http_client::{HttpResponse, ScriptedHttpClient};
    use std::time::Duration;

    fn adapter(http: Arc<ScriptedHttpClient>) -> SinaAdapter {
        SinaAdapter::new(http, 5_000, Pacer::new(Duration::from_millis(1)))
    }

    fn key() -> ApiKey {
        ApiKey {
            credential: String::new(),
            index: 0,
        }
    }

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    #[test]
    fn venue_prefixes_follow_the_market() {
        assert_eq!(sina_code("601899.SH").expect("mapped"), "sh601899");
        assert_eq!(sina_code("601899").expect("mapped"), "sh601899");
        assert_eq!(sina_code("000001.SZ").expect("mapped"), "sz000001");
        assert_eq!(sina_code("430047.BJ").expect("mapped"), "bj430047");
        assert_eq!(sina_code("00700").expect("mapped"), "rt_hk00700");
        assert!(sina_code("AAPL").is_err());
    }

    #[tokio::test]
    async fn a_share_record_computes_change_from_prev_close() {
        let http = Arc::new(ScriptedHttpClient::new().on(
            "list=sh601899",
            HttpResponse::ok(
                "var hq_str_sh601899=\"Zijin,18.10,18.05,18.55,18.60,17.95,18.54,18.55,123456789,2280000000.000,2024-06-14,15:00:00,00\";",
            ),
        ));
        let adapter = adapter(http.clone());

        let quote = adapter
            .quote(QuoteRequest { symbol: symbol("601899.SH") }, key())
            .await
            .expect("quote should parse");

        assert_eq!(quote.current, 18.55);
        assert_eq!(quote.prev_close, 18.05);
        assert!((quote.change - 0.5).abs() < 1e-9);
        assert_eq!(quote.day_open, 18.10);

        let sent = http.requests();
        assert_eq!(
            sent[0].headers.get("referer").map(String::as_str),
            Some(REFERER)
        );
    }

    #[tokio::test]
    async fn hk_record_uses_its_own_column_layout() {
        let http = Arc::new(ScriptedHttpClient::new().on(
            "list=rt_hk00700",
            HttpResponse::ok(
                "var hq_str_rt_hk00700=\"TENCENT,Tencent,375.0,372.8,380.2,371.0,378.4,5.6,1.50,0,0,0,0,0\";",
            ),
        ));
        let adapter = adapter(http);

        let quote = adapter
            .quote(QuoteRequest { symbol: symbol("00700.HK") }, key())
            .await
            .expect("quote should parse");

        assert_eq!(quote.current, 378.4);
        assert_eq!(quote.prev_close, 372.8);
        assert_eq!(quote.percent_change, 1.5);
    }

    #[tokio::test]
    async fn empty_record_means_unknown_symbol() {
        let http = Arc::new(
            ScriptedHttpClient::new().on("list=", HttpResponse::ok("var hq_str_sh999999=\"\";")),
        );
        let adapter = adapter(http);

        let error = adapter
            .quote(QuoteRequest { symbol: symbol("999999.SH") }, key())
            .await
            .expect_err("must fail");
        assert!(error.message().contains("no quote data"));
    }
}
