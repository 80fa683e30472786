//! Wire helpers for the node's JSON-RPC log-subscription dialect.

use serde_json::{json, Value};

/// Subscription request for one program's logs at finalized commitment.
pub fn logs_subscribe_request(program_id: &str, sub_id: usize) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": sub_id,
        "method": "logsSubscribe",
        "params": [
            { "mentions": [program_id] },
            { "commitment": "finalized" }
        ]
    })
}

/// One observed transaction from a `logsNotification` push.
#[derive(Debug, Clone, PartialEq)]
pub struct LogNotification {
    pub signature: String,
    pub program_id: Option<String>,
    pub slot: Option<i64>,
    pub log_lines: usize,
}

/// Parse a websocket frame into a notification. Subscription confirmations,
/// unrelated methods, and frames without a signature yield `None`.
pub fn parse_log_notification(text: &str) -> Option<LogNotification> {
    let msg: Value = serde_json::from_str(text).ok()?;
    if msg.get("method")?.as_str()? != "logsNotification" {
        return None;
    }

    let result = msg.get("params")?.get("result")?;
    let value = result.get("value")?;
    let signature = value.get("signature")?.as_str()?.to_string();

    Some(LogNotification {
        signature,
        program_id: value
            .get("programId")
            .and_then(Value::as_str)
            .map(str::to_string),
        slot: result
            .get("context")
            .and_then(|c| c.get("slot"))
            .and_then(Value::as_i64),
        log_lines: value
            .get("logs")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0),
    })
}
