//! Serialized form of the identity list: one JSON array of record objects.

use facegate_core::{Claim, Identity, Roster, StoreError};
use serde_json::Value;

/// Parse the stored list into raw records. Anything but a JSON array is
/// corrupt.
pub(crate) fn parse_list(raw: &str) -> Result<Vec<Value>, StoreError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(records)) => Ok(records),
        Ok(other) => Err(StoreError::Corrupt(format!(
            "expected a JSON array, found {}",
            kind(&other)
        ))),
        Err(err) => Err(StoreError::Corrupt(err.to_string())),
    }
}

pub(crate) fn encode(records: &[Value]) -> Result<String, StoreError> {
    Ok(serde_json::to_string(records)?)
}

/// Decode each record on its own; records that do not fit the schema are
/// counted and left out. Every record's username and email are claimed
/// either way.
pub(crate) fn decode(records: Vec<Value>) -> Roster {
    let mut roster = Roster::default();

    for (position, record) in records.into_iter().enumerate() {
        roster.claims.push(claim(&record));
        let decoded = serde_json::from_value::<Identity>(record)
            .map_err(|e| e.to_string())
            .and_then(|identity| identity.check_schema().map(|()| identity));

        match decoded {
            Ok(identity) => roster.identities.push(identity),
            Err(reason) => {
                roster.rejected += 1;
                tracing::warn!(position, %reason, "stored identity failed schema check");
            }
        }
    }

    roster
}

fn claim(record: &Value) -> Claim {
    Claim::new(
        record.get("username").and_then(Value::as_str),
        record.get("email").and_then(Value::as_str),
    )
}

pub(crate) fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(matches!(parse_list(r#"{"a":1}"#), Err(StoreError::Corrupt(_))));
        assert!(matches!(parse_list("not json"), Err(StoreError::Corrupt(_))));
        assert!(parse_list("[]").unwrap().is_empty());
    }

    #[test]
    fn test_decode_counts_rejected() {
        let records = vec![
            json!({
                "id": "1",
                "username": "alice",
                "email": "alice@x.com",
                "descriptor": [0.1, 0.2],
                "registrationDate": "2024-01-01T00:00:00.000Z",
                "lastLogin": "2024-01-02T00:00:00.000Z"
            }),
            json!({ "id": "2", "username": "missing-fields" }),
            json!({
                "id": "",
                "username": "blank",
                "email": "blank@x.com",
                "descriptor": [],
                "registrationDate": "2024-01-01T00:00:00.000Z",
                "lastLogin": "2024-01-01T00:00:00.000Z"
            }),
            json!("just a string"),
        ];

        let roster = decode(records);
        assert_eq!(roster.identities.len(), 1);
        assert_eq!(roster.identities[0].username(), "alice");
        assert_eq!(roster.rejected, 3);
        assert_eq!(roster.claims.len(), 4);
        assert!(roster.username_taken("missing-fields"));
        assert!(roster.email_taken("BLANK@x.com"));
    }

    #[test]
    fn test_null_descriptor_component_keeps_claim() {
        let mut descriptor = vec![json!(0.1); 128];
        descriptor[3] = Value::Null;
        let roster = decode(vec![json!({
            "id": "1",
            "username": "alice",
            "email": "alice@x.com",
            "faceDescriptor": descriptor,
            "registrationDate": "2024-01-01T00:00:00.000Z",
            "lastLogin": "2024-01-01T00:00:00.000Z"
        })]);

        assert!(roster.identities.is_empty());
        assert_eq!(roster.rejected, 1);
        assert!(roster.username_taken("ALICE"));
        assert!(roster.email_taken("alice@x.com"));
    }

    #[test]
    fn test_record_id() {
        assert_eq!(record_id(&json!({"id": "abc"})), Some("abc"));
        assert_eq!(record_id(&json!({"id": 5})), None);
        assert_eq!(record_id(&json!([1])), None);
    }
}
