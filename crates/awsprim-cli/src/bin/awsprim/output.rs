//! Output formatting and the stderr error envelope.
//!
//! Every command emits one canonical JSON object (or a list of them) on
//! stdout. `--format value` prints just the primary scalar for piping;
//! `--format json-lines` emits one record per line for enumerations;
//! `--format table` prints an aligned human layout. Errors go to stderr
//! as a cause line and a solution line.

use awsprim_core::PrimitiveError;
use clap::ValueEnum;
use serde_json::Value;

/// Output format selector for `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per command (default).
    #[default]
    Json,
    /// One JSON record per line for enumerations.
    JsonLines,
    /// Only the primary scalar.
    Value,
    /// Aligned human-readable layout.
    Table,
}

/// Print one record.
pub fn emit(record: &impl serde::Serialize, primary: &str, format: OutputFormat) {
    let value = match serde_json::to_value(record) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Error: failed to serialize output: {e}");
            return;
        }
    };
    match format {
        OutputFormat::Json | OutputFormat::JsonLines => println!("{value}"),
        OutputFormat::Value => println!("{primary}"),
        OutputFormat::Table => println!("{}", render_table(&value)),
    }
}

/// Print an enumeration. JSON wraps the items under `key` with a count;
/// json-lines emits one record per item.
pub fn emit_list<T: serde::Serialize>(
    items: &[T],
    key: &str,
    primary: impl Fn(&T) -> String,
    format: OutputFormat,
) {
    match format {
        OutputFormat::JsonLines => {
            for item in items {
                if let Ok(value) = serde_json::to_value(item) {
                    println!("{value}");
                }
            }
        }
        OutputFormat::Value => {
            for item in items {
                println!("{}", primary(item));
            }
        }
        OutputFormat::Json => {
            let wrapped = serde_json::json!({
                key: items.iter().filter_map(|i| serde_json::to_value(i).ok()).collect::<Vec<_>>(),
                "count": items.len(),
            });
            println!("{wrapped}");
        }
        OutputFormat::Table => {
            for item in items {
                if let Ok(value) = serde_json::to_value(item) {
                    println!("{}", render_table(&value));
                    println!();
                }
            }
            println!("{} item(s)", items.len());
        }
    }
}

/// Render a JSON object as aligned `key  value` rows.
fn render_table(value: &Value) -> String {
    let Value::Object(map) = value else {
        return value.to_string();
    };
    let width = map.keys().map(String::len).max().unwrap_or(0);
    map.iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{key:<width$}  {rendered}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Two-section stderr envelope: cause, then remedy.
pub fn print_error(error: &PrimitiveError) {
    eprintln!("Error: {error}");
    eprintln!();
    eprintln!("Solution: {}", error.solution());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rendering_aligns_keys() {
        let value = serde_json::json!({"key": "deploy", "value": 42});
        let table = render_table(&value);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.starts_with("key    ")));
        assert!(lines.iter().any(|l| l.contains("42")));
    }

    #[test]
    fn non_objects_render_as_json() {
        assert_eq!(render_table(&serde_json::json!([1, 2])), "[1,2]");
    }
}
