//! Message values exchanged with peers.
//!
//! A message is a structured value. The only outer shape the service echoes
//! is [`Value::Dictionary`]; every other shape is dropped with a diagnostic.

use std::collections::HashMap;

/// A structured message value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed 64-bit integer
    Int64(i64),
    /// UTF-8 string
    String(String),
    /// Opaque binary data
    Data(Vec<u8>),
    /// 16-byte UUID
    Uuid([u8; 16]),
    /// Ordered list of values
    Array(Vec<Value>),
    /// Keyed mapping of string keys to values; the only echoable shape
    Dictionary(HashMap<String, Value>),
}

impl Value {
    /// Short name of the variant, used in shape-rejection diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int64(_) => "int64",
            Value::String(_) => "string",
            Value::Data(_) => "data",
            Value::Uuid(_) => "uuid",
            Value::Array(_) => "array",
            Value::Dictionary(_) => "dictionary",
        }
    }

    /// Whether the outer shape is the keyed-mapping type
    pub fn is_dictionary(&self) -> bool {
        matches!(self, Value::Dictionary(_))
    }

    /// Create an integer value
    pub fn int64(n: i64) -> Value {
        Value::Int64(n)
    }

    /// Create a string value
    pub fn string<S: Into<String>>(s: S) -> Value {
        Value::String(s.into())
    }

    /// Create a binary data value
    pub fn data<B: Into<Vec<u8>>>(data: B) -> Value {
        Value::Data(data.into())
    }

    /// Create a UUID value
    pub fn uuid(bytes: [u8; 16]) -> Value {
        Value::Uuid(bytes)
    }

    /// Create an array value
    pub fn array(values: Vec<Value>) -> Value {
        Value::Array(values)
    }

    /// Create a dictionary value from key/value pairs
    pub fn dictionary<K, I>(entries: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Dictionary(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::int64(1).type_name(), "int64");
        assert_eq!(Value::string("hi").type_name(), "string");
        assert_eq!(Value::data(vec![0u8]).type_name(), "data");
        assert_eq!(Value::uuid([0u8; 16]).type_name(), "uuid");
        assert_eq!(Value::array(vec![]).type_name(), "array");
        assert_eq!(
            Value::dictionary([("k", Value::int64(1))]).type_name(),
            "dictionary"
        );
    }

    #[test]
    fn test_only_dictionary_is_echoable() {
        assert!(Value::dictionary([("text", Value::string("hi"))]).is_dictionary());
        assert!(!Value::int64(42).is_dictionary());
        assert!(!Value::string("hi").is_dictionary());
        assert!(!Value::array(vec![Value::int64(1)]).is_dictionary());
    }

    #[test]
    fn test_dictionary_helper() {
        let value = Value::dictionary([("n", Value::int64(1)), ("s", Value::string("x"))]);
        match value {
            Value::Dictionary(map) => {
                assert_eq!(map.len(), 2);
                assert_eq!(map.get("n"), Some(&Value::Int64(1)));
                assert_eq!(map.get("s"), Some(&Value::String("x".to_string())));
            }
            other => panic!("unexpected value: {:?}", other),
        }
    }
}
