//! Static tool schemas served by `tools/list`.

use serde_json::{json, Value};

struct ToolSpec {
    name: &'static str,
    description: &'static str,
    required: &'static [(&'static str, &'static str)],
    optional: &'static [(&'static str, &'static str)],
}

const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "get_stock_quote",
        description: "Real-time quote for a symbol (price, change, day range)",
        required: &[("symbol", "Ticker symbol, e.g. AAPL or 601899.SH")],
        optional: &[],
    },
    ToolSpec {
        name: "get_quote",
        description: "Alias of get_stock_quote",
        required: &[("symbol", "Ticker symbol, e.g. AAPL or 601899.SH")],
        optional: &[],
    },
    ToolSpec {
        name: "get_stock_candles",
        description: "OHLCV candles for a symbol over a date range",
        required: &[("symbol", "Ticker symbol")],
        optional: &[
            ("resolution", "Candle resolution: 1, 5, 15, 30, 60, D, W, M (default D)"),
            ("from", "Range start, YYYY-MM-DD"),
            ("to", "Range end, YYYY-MM-DD"),
        ],
    },
    ToolSpec {
        name: "get_daily_prices",
        description: "Daily price history keyed by date",
        required: &[("symbol", "Ticker symbol")],
        optional: &[("outputsize", "compact or full (default compact)")],
    },
    ToolSpec {
        name: "get_news",
        description: "Recent news articles for a symbol",
        required: &[("symbol", "Ticker symbol")],
        optional: &[
            ("category", "Filter articles by category"),
            ("minId", "Only articles with id greater than this"),
        ],
    },
    ToolSpec {
        name: "get_company_overview",
        description: "Company profile: name, industry, market cap",
        required: &[("symbol", "Ticker symbol")],
        optional: &[],
    },
    ToolSpec {
        name: "get_company_basic_financials",
        description: "Headline financial metrics for a company",
        required: &[("symbol", "Ticker symbol")],
        optional: &[],
    },
    ToolSpec {
        name: "get_company_metrics",
        description: "Company metric snapshot",
        required: &[("symbol", "Ticker symbol")],
        optional: &[("metricType", "Metric group to request (default all)")],
    },
    ToolSpec {
        name: "get_income_statement",
        description: "Latest annual income statement",
        required: &[("symbol", "Ticker symbol")],
        optional: &[],
    },
    ToolSpec {
        name: "get_balance_sheet",
        description: "Latest annual balance sheet",
        required: &[("symbol", "Ticker symbol")],
        optional: &[],
    },
    ToolSpec {
        name: "get_cash_flow",
        description: "Latest annual cash-flow statement",
        required: &[("symbol", "Ticker symbol")],
        optional: &[],
    },
    ToolSpec {
        name: "get_technical_indicator",
        description: "Technical-indicator series (RSI, SMA, EMA, ...)",
        required: &[
            ("symbol", "Ticker symbol"),
            ("indicator", "Indicator name, e.g. RSI"),
        ],
        optional: &[
            ("interval", "Series interval (default daily)"),
            ("time_period", "Lookback period (default 14)"),
        ],
    },
];

/// `tools/list` result payload.
pub fn tools_list() -> Value {
    let tools: Vec<Value> = TOOLS.iter().map(tool_schema).collect();
    json!({ "tools": tools })
}

fn tool_schema(spec: &ToolSpec) -> Value {
    let mut properties = serde_json::Map::new();
    for (name, description) in spec.required.iter().chain(spec.optional) {
        properties.insert(
            (*name).to_owned(),
            json!({ "type": "string", "description": description }),
        );
    }
    let required: Vec<&str> = spec.required.iter().map(|(name, _)| *name).collect();

    json!({
        "name": spec.name,
        "description": spec.description,
        "inputSchema": {
            "type": "object",
            "properties": properties,
            "required": required,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickgate_core::Operation;

    #[test]
    fn every_gateway_operation_is_listed() {
        let listed = tools_list();
        let names: Vec<&str> = listed["tools"]
            .as_array()
            .expect("tools array")
            .iter()
            .filter_map(|tool| tool["name"].as_str())
            .collect();

        for operation in Operation::ALL {
            assert!(
                names.contains(&operation.tool_name()),
                "{} is not listed",
                operation.tool_name()
            );
        }
        assert!(names.contains(&"get_quote"));
    }

    #[test]
    fn schemas_mark_symbol_as_required() {
        let listed = tools_list();
        for tool in listed["tools"].as_array().expect("tools array") {
            let required = tool["inputSchema"]["required"]
                .as_array()
                .expect("required array");
            assert!(
                required.iter().any(|field| field == "symbol"),
                "{} does not require symbol",
                tool["name"]
            );
        }
    }
}
