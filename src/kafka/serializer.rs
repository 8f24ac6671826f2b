use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How typed keys and values are turned into record bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// UTF-8 bytes of a string value. Anything else is rejected.
    #[default]
    String,
    /// Compact JSON.
    Json,
}

impl Encoding {
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Encoding::String => match serde_json::to_value(value)? {
                Value::String(s) => Ok(s.into_bytes()),
                other => Err(Error::Serialization(format!(
                    "string encoding expects a string, got {}",
                    kind(&other)
                ))),
            },
            Encoding::Json => serde_json::to_vec(value).map_err(Into::into),
        }
    }
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

    #[derive(Serialize)]
    struct OrderPlaced {
        order_id: u64,
        customer: String,
    }

    #[test]
    fn test_string_encoding_writes_raw_utf8() {
        let bytes = Encoding::String.encode("cust-1").unwrap();
        assert_eq!(bytes, b"cust-1");

        // no JSON quoting
        let bytes = Encoding::String.encode(&"héllo".to_string()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "héllo");
    }

    #[test]
    fn test_string_encoding_rejects_non_strings() {
        let order = OrderPlaced {
            order_id: 7,
            customer: "cust-1".to_string(),
        };

        match Encoding::String.encode(&order) {
            Err(Error::Serialization(msg)) => assert!(msg.contains("an object")),
            other => panic!("expected serialization error, got {:?}", other),
        }
        assert!(Encoding::String.encode(&42).is_err());
    }

    #[test]
    fn test_json_encoding() {
        let order = OrderPlaced {
            order_id: 7,
            customer: "cust-1".to_string(),
        };

        let bytes = Encoding::Json.encode(&order).unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, json!({"order_id": 7, "customer": "cust-1"}));

        assert_eq!(Encoding::Json.encode("plain").unwrap(), b"\"plain\"");
    }
}
