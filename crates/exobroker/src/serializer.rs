//! # Serialization boundary
//!
//! Serializers are identified by a format code. The broker uses them to agree
//! on a wire format with a target and, on the local typed path, to normalize
//! arguments exactly as a remote hop would.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Error;
use crate::error::Result;

/// Format code of the built-in JSON serializer.
pub const JSON: &str = "json";

pub trait Serializer: Send + Sync + 'static {
    fn format(&self) -> &str;
    fn encode(&self, value: &Value) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Value>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn format(&self) -> &str {
        JSON
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Picks the wire format for a target.
pub trait FormatSelector: Send + Sync + 'static {
    /// `advertised` comes from the target, `preferred` from the call context
    /// (empty means no preference). Returns `None` if nothing fits.
    fn select(&self, advertised: &[String], serializers: &SerializerSet, preferred: &[String]) -> Option<String>;
}

/// First advertised format that a local serializer handles and the caller allows.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstSupported;

impl FormatSelector for FirstSupported {
    fn select(&self, advertised: &[String], serializers: &SerializerSet, preferred: &[String]) -> Option<String> {
        advertised
            .iter()
            .filter(|f| serializers.contains(f))
            .find(|f| preferred.is_empty() || preferred.contains(*f))
            .cloned()
    }
}

/// The serializers available in this process, keyed by format code.
#[derive(Clone)]
pub struct SerializerSet {
    by_format: BTreeMap<String, Arc<dyn Serializer>>,
}

impl SerializerSet {
    /// A set holding only the JSON serializer.
    pub fn new() -> Self {
        let mut set = Self {
            by_format: BTreeMap::new(),
        };
        set.insert(Arc::new(JsonSerializer));
        set
    }

    pub fn insert(&mut self, serializer: Arc<dyn Serializer>) {
        self.by_format.insert(serializer.format().to_string(), serializer);
    }

    pub fn contains(&self, format: &str) -> bool {
        self.by_format.contains_key(format)
    }

    pub fn formats(&self) -> Vec<String> {
        self.by_format.keys().cloned().collect()
    }

    pub fn get(&self, format: &str) -> Result<Arc<dyn Serializer>> {
        self.by_format.get(format).cloned().ok_or_else(|| Error::NoSerializer {
            format: format.to_string(),
        })
    }

    /// Encodes then decodes `args` through `format`.
    pub fn round_trip(&self, format: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        let serializer = self.get(format)?;
        let bytes = serializer.encode(&Value::Array(args))?;
        match serializer.decode(&bytes)? {
            Value::Array(args) => Ok(args),
            other => Err(Error::Codec(format!("expected an argument array after round-trip, got {other}"))),
        }
    }
}

impl Default for SerializerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Msgpackish;

    impl Serializer for Msgpackish {
        fn format(&self) -> &str {
            "msgpack"
        }

        fn encode(&self, _value: &Value) -> Result<Vec<u8>> {
            Err(Error::Codec("unsupported".into()))
        }

        fn decode(&self, _bytes: &[u8]) -> Result<Value> {
            Err(Error::Codec("unsupported".into()))
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_supported_respects_target_order() {
        let mut set = SerializerSet::new();
        set.insert(Arc::new(Msgpackish));

        let chosen = FirstSupported.select(&strings(&["protobuf", "msgpack", "json"]), &set, &[]);
        assert_eq!(chosen.as_deref(), Some("msgpack"));

        let chosen = FirstSupported.select(&strings(&["msgpack", "json"]), &set, &strings(&["json"]));
        assert_eq!(chosen.as_deref(), Some("json"));

        let chosen = FirstSupported.select(&strings(&["protobuf"]), &set, &[]);
        assert!(chosen.is_none());
    }

    #[test]
    fn test_round_trip_preserves_arguments() {
        let set = SerializerSet::new();
        let args = vec![json!(1), json!({"k": [true, null]})];
        assert_eq!(set.round_trip(JSON, args.clone()).unwrap(), args);
    }

    #[test]
    fn test_missing_serializer() {
        let set = SerializerSet::new();
        let err = set.round_trip("cbor", vec![]).unwrap_err();
        assert!(matches!(err, Error::NoSerializer { format } if format == "cbor"));
    }
}
