//! Local tool implementations
//!
//! Tools every control plane can run without a worker fleet. Anything not
//! listed here is worker-bound and dispatched by capability `tool:<name>`.

use chrono::Utc;
use serde_json::{json, Value};

use swarmlink_types::{Result, SwarmlinkError};

const LOCAL_TOOLS: &[&str] = &["calculate", "currentDatetime", "wordCount"];

/// Whether a tool runs in-process on the control plane
pub fn is_local_tool(name: &str) -> bool {
    LOCAL_TOOLS.contains(&name)
}

/// Execute a local tool. Returns `None` for worker-bound tools.
pub fn run_local_tool(name: &str, params: &Value) -> Option<Result<Value>> {
    match name {
        "calculate" => Some(calculate(params)),
        "currentDatetime" => Some(Ok(json!({
            "iso": Utc::now().to_rfc3339(),
            "epochMs": Utc::now().timestamp_millis(),
        }))),
        "wordCount" => Some(word_count(params)),
        _ => None,
    }
}

/// Left-to-right evaluation of `number (op number)*` with + - * /
fn calculate(params: &Value) -> Result<Value> {
    let expression = params
        .get("expression")
        .and_then(Value::as_str)
        .ok_or_else(|| SwarmlinkError::internal("calculate requires an 'expression' string"))?;

    let tokens: Vec<&str> = expression.split_whitespace().collect();
    if tokens.is_empty() || tokens.len() % 2 == 0 {
        return Err(SwarmlinkError::internal(format!(
            "malformed expression: {expression}"
        )));
    }

    let parse = |t: &str| {
        t.parse::<f64>()
            .map_err(|_| SwarmlinkError::internal(format!("not a number: {t}")))
    };

    let mut acc = parse(tokens[0])?;
    for pair in tokens[1..].chunks(2) {
        let rhs = parse(pair[1])?;
        acc = match pair[0] {
            "+" => acc + rhs,
            "-" => acc - rhs,
            "*" => acc * rhs,
            "/" => {
                if rhs == 0.0 {
                    return Err(SwarmlinkError::internal("division by zero"));
                }
                acc / rhs
            }
            op => {
                return Err(SwarmlinkError::internal(format!("unknown operator: {op}")));
            }
        };
    }

    Ok(json!({ "expression": expression, "result": acc }))
}

fn word_count(params: &Value) -> Result<Value> {
    let text = params
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| SwarmlinkError::internal("wordCount requires a 'text' string"))?;
    Ok(json!({
        "words": text.split_whitespace().count(),
        "characters": text.chars().count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_tool_detection() {
        assert!(is_local_tool("calculate"));
        assert!(is_local_tool("currentDatetime"));
        assert!(!is_local_tool("webSearch"));
    }

    #[test]
    fn calculate_left_to_right() {
        let result = run_local_tool("calculate", &json!({"expression": "2 + 3 * 4"}))
            .unwrap()
            .unwrap();
        // Left-to-right, no precedence: (2 + 3) * 4
        assert_eq!(result["result"], 20.0);
    }

    #[test]
    fn calculate_rejects_division_by_zero() {
        let result = run_local_tool("calculate", &json!({"expression": "1 / 0"})).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn calculate_rejects_malformed_input() {
        assert!(run_local_tool("calculate", &json!({"expression": "1 +"}))
            .unwrap()
            .is_err());
        assert!(run_local_tool("calculate", &json!({}))
            .unwrap()
            .is_err());
    }

    #[test]
    fn word_count_counts_words_and_chars() {
        let result = run_local_tool("wordCount", &json!({"text": "hello brave world"}))
            .unwrap()
            .unwrap();
        assert_eq!(result["words"], 3);
    }

    #[test]
    fn worker_bound_tools_return_none() {
        assert!(run_local_tool("webSearch", &json!({"query": "x"})).is_none());
    }
}
