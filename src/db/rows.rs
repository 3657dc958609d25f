// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Lenient row decoding shared by the storage backends.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, Result};

/// Decode every row that parses; log and skip the rest.
pub fn decode_rows<T: DeserializeOwned>(
    collection: &str,
    rows: impl IntoIterator<Item = (String, Value)>,
) -> Vec<T> {
    rows.into_iter()
        .filter_map(|(id, row)| decode_row(collection, &id, row))
        .collect()
}

/// Decode one row, logging a corrupt record instead of failing.
pub fn decode_row<T: DeserializeOwned>(collection: &str, id: &str, row: Value) -> Option<T> {
    match serde_json::from_value(row) {
        Ok(value) => Some(value),
        Err(e) => {
            let err = AppError::DataCorruption(format!("{}/{}: {}", collection, id, e));
            tracing::error!(collection, id, error = %err, "Skipping corrupt record");
            None
        }
    }
}

/// Encode a record as a JSON row.
pub fn encode_row<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode row: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use serde_json::json;

    #[test]
    fn test_decode_rows_skips_corrupt_records() {
        let rows = vec![
            ("1".to_string(), json!({"athlete_id": "1", "display_name": "Ok"})),
            ("2".to_string(), json!({"display_name": "No id"})),
            ("3".to_string(), json!("not even an object")),
            ("4".to_string(), json!({"athlete_id": 4.0, "display_name": "Float"})),
        ];

        let users: Vec<User> = decode_rows("users", rows);

        assert_eq!(users.len(), 2);
        assert_eq!(users[1].athlete_id.as_str(), "4");
    }
}
