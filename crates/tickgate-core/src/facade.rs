//! Tool facade.
//!
//! The only place operation-specific argument shapes appear. Each entry
//! validates the string-typed arguments from the transport, builds the typed
//! request, binds it into an executor closure and hands that to the
//! dispatcher. Typed per-operation methods are exposed alongside the
//! name-based [`Gateway::call_tool`] entry point.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::dispatch::{Attempt, Dispatched};
use crate::domain::{Candle, CompanyInfo, Financials, IndicatorSeries, NewsItem, Quote, Symbol};
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::provider::{
    CandlesRequest, CompanyRequest, DailyPriceMap, DailyPricesRequest, IndicatorRequest,
    MetricsRequest, NewsRequest, Operation, QuoteRequest, StatementKind, StatementRequest,
};
use crate::source::ProviderId;

/// Outcome of one tool call, ready for the transport envelope.
#[derive(Debug, Serialize)]
pub struct ToolReply {
    pub tool: &'static str,
    pub data: Value,
    pub provider: ProviderId,
    pub attempts: Vec<Attempt>,
    pub total_duration_ms: u64,
}

impl Gateway {
    pub async fn get_quote(&self, req: QuoteRequest) -> Result<Dispatched<Quote>, GatewayError> {
        let symbol = req.symbol.clone();
        self.dispatch(Operation::Quote, Some(&symbol), move |adapter, key| {
            adapter.quote(req.clone(), key)
        })
        .await
    }

    pub async fn get_candles(
        &self,
        req: CandlesRequest,
    ) -> Result<Dispatched<Vec<Candle>>, GatewayError> {
        let symbol = req.symbol.clone();
        self.dispatch(Operation::Candles, Some(&symbol), move |adapter, key| {
            adapter.candles(req.clone(), key)
        })
        .await
    }

    pub async fn get_daily_prices(
        &self,
        req: DailyPricesRequest,
    ) -> Result<Dispatched<DailyPriceMap>, GatewayError> {
        let symbol = req.symbol.clone();
        self.dispatch(Operation::DailyPrices, Some(&symbol), move |adapter, key| {
            adapter.daily_prices(req.clone(), key)
        })
        .await
    }

    pub async fn get_news(&self, req: NewsRequest) -> Result<Dispatched<Vec<NewsItem>>, GatewayError> {
        let symbol = req.symbol.clone();
        self.dispatch(Operation::News, Some(&symbol), move |adapter, key| {
            adapter.news(req.clone(), key)
        })
        .await
    }

    pub async fn get_company_overview(
        &self,
        req: CompanyRequest,
    ) -> Result<Dispatched<CompanyInfo>, GatewayError> {
        let symbol = req.symbol.clone();
        self.dispatch(Operation::CompanyOverview, Some(&symbol), move |adapter, key| {
            adapter.company_overview(req.clone(), key)
        })
        .await
    }

    pub async fn get_basic_financials(
        &self,
        req: CompanyRequest,
    ) -> Result<Dispatched<Financials>, GatewayError> {
        let symbol = req.symbol.clone();
        self.dispatch(Operation::BasicFinancials, Some(&symbol), move |adapter, key| {
            adapter.basic_financials(req.clone(), key)
        })
        .await
    }

    pub async fn get_company_metrics(
        &self,
        req: MetricsRequest,
    ) -> Result<Dispatched<CompanyInfo>, GatewayError> {
        let symbol = req.symbol.clone();
        self.dispatch(Operation::CompanyMetrics, Some(&symbol), move |adapter, key| {
            adapter.company_metrics(req.clone(), key)
        })
        .await
    }

    pub async fn get_statement(
        &self,
        req: StatementRequest,
    ) -> Result<Dispatched<Financials>, GatewayError> {
        let operation = match req.kind {
            StatementKind::Income => Operation::IncomeStatement,
            StatementKind::Balance => Operation::BalanceSheet,
            StatementKind::CashFlow => Operation::CashFlow,
        };
        let symbol = req.symbol.clone();
        self.dispatch(operation, Some(&symbol), move |adapter, key| {
            adapter.statement(req.clone(), key)
        })
        .await
    }

    pub async fn get_technical_indicator(
        &self,
        req: IndicatorRequest,
    ) -> Result<Dispatched<IndicatorSeries>, GatewayError> {
        let symbol = req.symbol.clone();
        self.dispatch(
            Operation::TechnicalIndicator,
            Some(&symbol),
            move |adapter, key| adapter.technical_indicator(req.clone(), key),
        )
        .await
    }

    /// Name-based entry point used by the transport layer.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<ToolReply, GatewayError> {
        let operation = Operation::from_tool_name(name).ok_or_else(|| {
            GatewayError::invalid_argument("name", format!("unknown tool '{name}'"))
        })?;
        let symbol = parse_symbol(arguments)?;

        match operation {
            Operation::Quote => {
                let result = self.get_quote(QuoteRequest { symbol }).await?;
                Ok(reply(operation, result))
            }
            Operation::Candles => {
                let resolution = optional_str(arguments, "resolution")
                    .map(|raw| raw.parse())
                    .transpose()?
                    .unwrap_or(crate::provider::Resolution::Day);
                let result = self
                    .get_candles(CandlesRequest {
                        symbol,
                        resolution,
                        from: optional_str(arguments, "from"),
                        to: optional_str(arguments, "to"),
                    })
                    .await?;
                Ok(reply(operation, result))
            }
            Operation::DailyPrices => {
                let output_size = optional_str(arguments, "outputsize")
                    .map(|raw| raw.parse())
                    .transpose()?
                    .unwrap_or_default();
                let result = self
                    .get_daily_prices(DailyPricesRequest { symbol, output_size })
                    .await?;
                Ok(reply(operation, result))
            }
            Operation::News => {
                let result = self
                    .get_news(NewsRequest {
                        symbol,
                        category: optional_str(arguments, "category"),
                        min_id: optional_int(arguments, "minId")?,
                    })
                    .await?;
                Ok(reply(operation, result))
            }
            Operation::CompanyOverview => {
                let result = self.get_company_overview(CompanyRequest { symbol }).await?;
                Ok(reply(operation, result))
            }
            Operation::BasicFinancials => {
                let result = self.get_basic_financials(CompanyRequest { symbol }).await?;
                Ok(reply(operation, result))
            }
            Operation::CompanyMetrics => {
                let result = self
                    .get_company_metrics(MetricsRequest {
                        symbol,
                        metric_type: optional_str(arguments, "metricType"),
                    })
                    .await?;
                Ok(reply(operation, result))
            }
            Operation::IncomeStatement | Operation::BalanceSheet | Operation::CashFlow => {
                let kind = match operation {
                    Operation::IncomeStatement => StatementKind::Income,
                    Operation::BalanceSheet => StatementKind::Balance,
                    _ => StatementKind::CashFlow,
                };
                let result = self.get_statement(StatementRequest { symbol, kind }).await?;
                Ok(reply(operation, result))
            }
            Operation::TechnicalIndicator => {
                let indicator = required_str(arguments, "indicator")?.to_owned();
                let time_period = optional_int(arguments, "time_period")?
                    .map(|raw| {
                        u32::try_from(raw).map_err(|_| {
                            GatewayError::invalid_argument(
                                "time_period",
                                "must be a positive integer",
                            )
                        })
                    })
                    .transpose()?
                    .unwrap_or(14);
                let result = self
                    .get_technical_indicator(IndicatorRequest {
                        symbol,
                        indicator,
                        interval: optional_str(arguments, "interval")
                            .unwrap_or_else(|| String::from("daily")),
                        time_period,
                    })
                    .await?;
                Ok(reply(operation, result))
            }
        }
    }
}

fn reply<T: Serialize>(operation: Operation, dispatched: Dispatched<T>) -> ToolReply {
    ToolReply {
        tool: operation.tool_name(),
        data: serde_json::to_value(&dispatched.data).expect("records serialize to JSON"),
        provider: dispatched.provider,
        attempts: dispatched.attempts,
        total_duration_ms: dispatched.total_duration_ms,
    }
}

fn parse_symbol(arguments: &Map<String, Value>) -> Result<Symbol, GatewayError> {
    let raw = required_str(arguments, "symbol")?;
    Ok(Symbol::parse(raw)?)
}

fn required_str<'a>(
    arguments: &'a Map<String, Value>,
    field: &'static str,
) -> Result<&'a str, GatewayError> {
    match arguments.get(field) {
        Some(Value::String(text)) if !text.trim().is_empty() => Ok(text),
        Some(Value::String(_)) => Err(GatewayError::invalid_argument(field, "must not be empty")),
        Some(_) => Err(GatewayError::invalid_argument(field, "must be a string")),
        None => Err(GatewayError::invalid_argument(field, "is required")),
    }
}

fn optional_str(arguments: &Map<String, Value>, field: &str) -> Option<String> {
    arguments
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

/// Arguments arrive string-typed from JSON, but plain numbers are accepted.
fn optional_int(
    arguments: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<i64>, GatewayError> {
    match arguments.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number.as_i64().map(Some).ok_or_else(|| {
            GatewayError::invalid_argument(field, "must be an integer")
        }),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => text.trim().parse::<i64>().map(Some).map_err(|_| {
            GatewayError::invalid_argument(field, format!("not an integer: '{}'", text.trim()))
        }),
        Some(_) => Err(GatewayError::invalid_argument(field, "must be an integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn required_string_rejects_blank_and_missing() {
        let empty = args(&[("symbol", json!("  "))]);
        assert!(required_str(&empty, "symbol").is_err());

        let missing = args(&[]);
        let error = required_str(&missing, "symbol").expect_err("must fail");
        assert!(error.to_string().contains("symbol"));

        let wrong_type = args(&[("symbol", json!(42))]);
        assert!(required_str(&wrong_type, "symbol").is_err());
    }

    #[test]
    fn optional_int_accepts_strings_and_numbers() {
        let as_string = args(&[("minId", json!("42"))]);
        assert_eq!(optional_int(&as_string, "minId").expect("parses"), Some(42));

        let as_number = args(&[("minId", json!(42))]);
        assert_eq!(optional_int(&as_number, "minId").expect("parses"), Some(42));

        let garbage = args(&[("minId", json!("abc"))]);
        assert!(optional_int(&garbage, "minId").is_err());

        let blank = args(&[("minId", json!(""))]);
        assert_eq!(optional_int(&blank, "minId").expect("parses"), None);
    }
}
