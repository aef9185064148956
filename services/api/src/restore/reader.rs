//! services/api/src/restore/reader.rs
//!
//! Reads a raw dump file into a sequence of JSON records. A dump is either a
//! single JSON array or newline-delimited JSON as written by database export
//! tools. Missing or unreadable dumps yield no records so that a restore can
//! still proceed with the sources it has.

use serde_json::Value;
use std::path::Path;
use tracing::{error, warn};

/// Returns the records stored in `path`, or an empty list when the file is
/// absent or cannot be parsed.
pub async fn read_records(path: &Path) -> Vec<Value> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("File not found: {}", path.display());
            return Vec::new();
        }
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    match parse_records(&content) {
        Some(records) => records,
        None => {
            error!("Failed to parse {} as JSON or NDJSON", path.display());
            Vec::new()
        }
    }
}

/// Parses dump content, first as one JSON document, then line by line.
pub fn parse_records(content: &str) -> Option<Vec<Value>> {
    if let Ok(document) = serde_json::from_str::<Value>(content) {
        return Some(match document {
            Value::Array(records) => records,
            other => vec![other],
        });
    }

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(serde_json::from_str::<Value>)
        .collect::<Result<Vec<_>, _>>()
        .ok()
}
