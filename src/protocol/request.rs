//! Typed method requests.
//!
//! Each request struct knows its remote method name, validates its own
//! shape and renders the positional parameter list sent in the `method`
//! message. [`Connection::request`](crate::Connection::request) runs the
//! validation before anything touches the wire.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// MethodRequest
// ============================================================================

/// A strongly-typed remote method invocation.
pub trait MethodRequest {
    /// Remote method name.
    const METHOD: &'static str;

    /// Type the `result` value is decoded into.
    type Output: DeserializeOwned;

    /// Checks the request shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] describing the first problem found.
    fn validate(&self) -> Result<()>;

    /// Renders the ordered parameter list.
    fn into_params(self) -> Vec<Value>;
}

// ============================================================================
// GetRealTimeData
// ============================================================================

/// Fetches the current value of a set of live data fields.
///
/// # Format
///
/// ```json
/// { "msg": "method", "id": "1", "method": "getRealTimeData", "params": [["cpu", "memory"]] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetRealTimeData {
    /// Field names to fetch.
    pub fields: Vec<String>,
}

impl GetRealTimeData {
    /// Creates a request for the given fields.
    #[must_use]
    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl MethodRequest for GetRealTimeData {
    const METHOD: &'static str = "getRealTimeData";
    type Output = Value;

    fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::invalid_argument(
                "getRealTimeData requires at least one field",
            ));
        }
        if let Some(index) = self.fields.iter().position(String::is_empty) {
            return Err(Error::invalid_argument(format!(
                "getRealTimeData field {index} is empty"
            )));
        }
        Ok(())
    }

    fn into_params(self) -> Vec<Value> {
        vec![Value::from(self.fields)]
    }
}

// ============================================================================
// SetMetadata
// ============================================================================

/// Stores key/value metadata on the remote session.
///
/// # Format
///
/// ```json
/// { "msg": "method", "id": "2", "method": "setMetadata", "params": [{"region": "eu"}] }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetMetadata {
    /// Metadata entries.
    pub entries: Map<String, Value>,
}

impl SetMetadata {
    /// Creates an empty metadata update.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one entry.
    #[inline]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }
}

/// Acknowledgement returned by `setMetadata`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetadataAck {
    /// Number of entries the server stored.
    pub stored: u64,
}

impl MethodRequest for SetMetadata {
    const METHOD: &'static str = "setMetadata";
    type Output = Option<MetadataAck>;

    fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(Error::invalid_argument(
                "setMetadata requires at least one entry",
            ));
        }
        if self.entries.keys().any(String::is_empty) {
            return Err(Error::invalid_argument("setMetadata keys must be non-empty"));
        }
        Ok(())
    }

    fn into_params(self) -> Vec<Value> {
        vec![Value::Object(self.entries)]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_get_real_time_data_params() {
        let request = GetRealTimeData::new(["cpu", "memory"]);
        assert!(request.validate().is_ok());
        assert_eq!(request.into_params(), vec![json!(["cpu", "memory"])]);
    }

    #[test]
    fn test_get_real_time_data_validation() {
        let empty = GetRealTimeData::new(Vec::<String>::new());
        assert!(matches!(
            empty.validate(),
            Err(Error::InvalidArgument { .. })
        ));

        let blank = GetRealTimeData::new(["cpu", ""]);
        let err = blank.validate().expect_err("blank field");
        assert!(err.to_string().contains("field 1"));
    }

    #[test]
    fn test_set_metadata_params() {
        let request = SetMetadata::new().with("region", "eu").with("tier", 2);
        assert!(request.validate().is_ok());
        assert_eq!(
            request.into_params(),
            vec![json!({"region": "eu", "tier": 2})]
        );
    }

    #[test]
    fn test_set_metadata_validation() {
        assert!(SetMetadata::new().validate().is_err());
        assert!(SetMetadata::new().with("", 1).validate().is_err());
    }

    #[test]
    fn test_metadata_ack_decodes_partial() {
        let ack: Option<MetadataAck> = serde_json::from_value(json!({})).expect("decode");
        assert_eq!(ack, Some(MetadataAck { stored: 0 }));

        let none: Option<MetadataAck> = serde_json::from_value(Value::Null).expect("decode");
        assert_eq!(none, None);
    }
}
