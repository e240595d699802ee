//! Stdio request loop.
//!
//! One JSON-RPC request per line on stdin, one response per line on stdout.
//! Each request runs on its own task so slow upstreams never block the read
//! loop; a single writer task serializes stdout. Logs go to stderr only.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use tickgate_core::{Gateway, GatewayError};

use crate::rpc::{
    tool_error_result, tool_result, RpcRequest, RpcResponse, ToolCallParams, INVALID_PARAMS,
    INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::schema;

pub async fn serve(gateway: Arc<Gateway>) -> std::io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = reply_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if stdout.write_all(b"\n").await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let gateway = gateway.clone();
        let reply_tx = reply_tx.clone();
        tokio::spawn(async move {
            if let Some(response) = handle_line(&gateway, &line).await {
                let _ = reply_tx.send(response.to_line());
            }
        });
    }

    info!("stdin closed, draining in-flight requests");
    drop(reply_tx);
    let _ = writer.await;
    Ok(())
}

async fn handle_line(gateway: &Gateway, line: &str) -> Option<RpcResponse> {
    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(parse_error) => {
            debug!(%parse_error, "unparseable request line");
            return Some(RpcResponse::failure(
                Value::Null,
                PARSE_ERROR,
                format!("parse error: {parse_error}"),
            ));
        }
    };

    if request.jsonrpc.as_deref() != Some("2.0") {
        let id = request.id.clone().unwrap_or(Value::Null);
        return Some(RpcResponse::failure(
            id,
            INVALID_REQUEST,
            "expected jsonrpc 2.0",
        ));
    }

    if request.is_notification() {
        return None;
    }
    let id = request.id.clone().unwrap_or(Value::Null);

    match request.method.as_str() {
        "tools/list" => Some(RpcResponse::success(id, schema::tools_list())),
        "tools/call" => {
            let params: ToolCallParams =
                match serde_json::from_value(request.params.unwrap_or(Value::Null)) {
                    Ok(params) => params,
                    Err(params_error) => {
                        return Some(RpcResponse::failure(
                            id,
                            INVALID_PARAMS,
                            format!("invalid tools/call params: {params_error}"),
                        ))
                    }
                };

            let request_id = Uuid::new_v4();
            let span = info_span!("tool_call", %request_id, tool = params.name.as_str());
            let outcome = async {
                let outcome = gateway.call_tool(&params.name, &params.arguments).await;
                match &outcome {
                    Ok(reply) => info!(
                        provider = %reply.provider,
                        attempts = reply.attempts.len(),
                        duration_ms = reply.total_duration_ms,
                        "tool call served"
                    ),
                    Err(call_error) => error!(%call_error, "tool call failed"),
                }
                outcome
            }
            .instrument(span)
            .await;

            Some(RpcResponse::success(id, call_outcome_to_result(outcome)))
        }
        other => Some(RpcResponse::failure(
            id,
            METHOD_NOT_FOUND,
            format!("unknown method '{other}'"),
        )),
    }
}

fn call_outcome_to_result(
    outcome: Result<tickgate_core::ToolReply, GatewayError>,
) -> Value {
    match outcome {
        Ok(reply) => tool_result(reply.data.to_string(), false),
        Err(call_error) => tool_error_result(&call_error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tickgate_core::{GatewayConfig, HttpResponse, ProviderId, ScriptedHttpClient};

    fn gateway_with_finnhub() -> Arc<Gateway> {
        let http = Arc::new(ScriptedHttpClient::new().on(
            "finnhub.io",
            HttpResponse::ok(
                r#"{"c":150.25,"d":1.5,"dp":1.01,"h":152.0,"l":148.5,"o":149.0,"pc":148.75,"t":1704067200}"#,
            ),
        ));
        let mut config = GatewayConfig::default();
        config
            .credentials
            .insert(ProviderId::Finnhub, String::from("fh-key"));
        Arc::new(Gateway::new(config, http))
    }

    #[tokio::test]
    async fn tools_list_answers_with_the_catalog() {
        let gateway = gateway_with_finnhub();
        let response = handle_line(&gateway, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
            .await
            .expect("response expected");

        let result = response.result.expect("result present");
        assert!(result["tools"].as_array().expect("array").len() >= 12);
    }

    #[tokio::test]
    async fn tools_call_wraps_the_record_in_a_text_envelope() {
        let gateway = gateway_with_finnhub();
        let line = r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"get_stock_quote","arguments":{"symbol":"AAPL"}}}"#;

        let response = handle_line(&gateway, line).await.expect("response expected");
        let result = response.result.expect("result present");

        assert!(result.get("isError").is_none());
        let text = result["content"][0]["text"].as_str().expect("text payload");
        let record: Value = serde_json::from_str(text).expect("payload is json");
        assert_eq!(record["symbol"], json!("AAPL"));
    }

    #[tokio::test]
    async fn invalid_arguments_become_is_error_envelopes() {
        let gateway = gateway_with_finnhub();
        let line = r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"get_stock_quote","arguments":{}}}"#;

        let response = handle_line(&gateway, line).await.expect("response expected");
        let result = response.result.expect("result present");

        assert_eq!(result["isError"], json!(true));
        assert!(result["content"][0]["text"]
            .as_str()
            .expect("text payload")
            .contains("symbol"));
    }

    #[tokio::test]
    async fn malformed_lines_report_parse_errors() {
        let gateway = gateway_with_finnhub();
        let response = handle_line(&gateway, "{not json").await.expect("response expected");
        assert_eq!(response.error.expect("error present").code, PARSE_ERROR);
    }

    #[tokio::test]
    async fn unknown_methods_are_method_not_found() {
        let gateway = gateway_with_finnhub();
        let response = handle_line(
            &gateway,
            r#"{"jsonrpc":"2.0","id":4,"method":"quotes/stream"}"#,
        )
        .await
        .expect("response expected");
        assert_eq!(response.error.expect("error present").code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let gateway = gateway_with_finnhub();
        let response = handle_line(&gateway, r#"{"jsonrpc":"2.0","method":"tools/list"}"#).await;
        assert!(response.is_none());
    }
}
