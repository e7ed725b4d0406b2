//! Command modules, one per primitive category.

pub mod blob;
pub mod counter;
pub mod info;
pub mod kv;
pub mod leader;
pub mod list;
pub mod lock;
pub mod mq;
pub mod queue;
pub mod set;
pub mod table;
pub mod topic;
pub mod transaction;

/// Parse a KEY=VALUE pair from the command line.
pub fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err("key cannot be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

/// Interpret a CLI value argument: valid JSON passes through as JSON,
/// anything else becomes a string.
pub fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_split_on_the_first_equals() {
        assert_eq!(
            parse_pair("k=v=w").unwrap(),
            ("k".to_string(), "v=w".to_string())
        );
        assert!(parse_pair("no-equals").is_err());
        assert!(parse_pair("=v").is_err());
    }

    #[test]
    fn values_prefer_json() {
        assert_eq!(parse_value("42"), serde_json::json!(42));
        assert_eq!(parse_value(r#"{"a":1}"#), serde_json::json!({"a":1}));
        assert_eq!(parse_value("plain text"), serde_json::json!("plain text"));
    }
}
