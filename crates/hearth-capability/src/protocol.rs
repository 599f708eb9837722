//! Wire types for the remote capability protocol.
//!
//! The capability server speaks JSON-RPC 2.0 with three methods:
//! `initialize` (handshake), `tools/list` (capability discovery), and
//! `tools/call` (invocation).  This module defines the frames, the
//! discovery/invocation payloads, and the typed parameter schema decoded
//! from a capability's declared `inputSchema`.  Anything transport-shaped
//! lives in [`crate::transport`]; session lifecycle lives in
//! [`crate::session`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CapabilityError, Result};

/// Protocol revision this client implements.  The handshake rejects servers
/// announcing a different revision.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC method names understood by capability servers.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const LIST_CAPABILITIES: &str = "tools/list";
    pub const INVOKE_CAPABILITY: &str = "tools/call";
}

/// Standard JSON-RPC error codes, as servers report them.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ---------------------------------------------------------------------------
// JSON-RPC frames
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Request identifier; this client always sends a number.
    #[serde(default)]
    pub id: Option<Value>,
    /// The method to invoke.
    pub method: String,
    /// Method parameters (`null` when the method takes none).
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    /// Build a request frame with a numeric id.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: Some(Value::from(id)),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Echoed from the request.
    #[serde(default)]
    pub id: Option<Value>,
    /// Present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Construct a success response (used by in-process test servers).
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Construct an error response (used by in-process test servers).
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Collapse the frame into its payload: the result value on success, the
    /// error object on failure.  A frame carrying neither is treated as an
    /// empty success (`null`), which some servers emit for void methods.
    pub fn into_payload(self) -> std::result::Result<Value, JsonRpcError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code (negative numbers are reserved by JSON-RPC).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ---------------------------------------------------------------------------
// Handshake payloads
// ---------------------------------------------------------------------------

/// Server identity returned by `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// The `initialize` result payload.  Unknown fields (such as the server's
/// advertised capability flags) are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

// ---------------------------------------------------------------------------
// Capability discovery
// ---------------------------------------------------------------------------

/// A capability as the remote server describes it in `tools/list`.
///
/// The parameter schema arrives as raw JSON here; [`ParamSchema::decode`]
/// turns it into the typed form at adapt time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// Machine-readable capability name, unique per server.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON-Schema-shaped description of the accepted arguments.
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// The `tools/list` result payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCapabilitiesResult {
    pub tools: Vec<CapabilityDescriptor>,
}

// ---------------------------------------------------------------------------
// Parameter schemas
// ---------------------------------------------------------------------------

/// The argument types this client accepts in a capability schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Boolean,
    List,
    Mapping,
}

impl ParamType {
    /// Map a JSON-Schema type tag to a supported variant.
    pub fn from_type_tag(tag: &str) -> Option<Self> {
        match tag {
            "string" => Some(ParamType::String),
            "number" | "integer" => Some(ParamType::Number),
            "boolean" => Some(ParamType::Boolean),
            "array" => Some(ParamType::List),
            "object" => Some(ParamType::Mapping),
            _ => None,
        }
    }

    /// Whether `value` inhabits this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::List => value.is_array(),
            ParamType::Mapping => value.is_object(),
        }
    }

    /// Stable name used in validation messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::List => "list",
            ParamType::Mapping => "mapping",
        }
    }
}

/// One named parameter in a capability's schema.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub description: Option<String>,
}

/// The decoded parameter schema of one capability.
#[derive(Debug, Clone, Default)]
pub struct ParamSchema {
    params: Vec<ParamSpec>,
}

impl ParamSchema {
    /// Decode a capability's declared `inputSchema`.
    ///
    /// Missing or `null` schemas mean "no arguments".  Every declared
    /// property must carry a supported type tag; anything else is rejected
    /// here, at discovery time, rather than accepted silently and failed at
    /// call time.
    pub fn decode(schema: &Value, capability: &str) -> Result<Self> {
        if schema.is_null() {
            return Ok(Self::default());
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut params = Vec::new();
        if let Some(properties) = properties {
            for (name, spec) in properties {
                let tag = spec.get("type").and_then(Value::as_str);
                let param_type = tag.and_then(ParamType::from_type_tag).ok_or_else(|| {
                    CapabilityError::UnsupportedParamType {
                        capability: capability.to_string(),
                        param: name.clone(),
                        type_tag: tag.unwrap_or("(missing)").to_string(),
                    }
                })?;
                params.push(ParamSpec {
                    name: name.clone(),
                    param_type,
                    required: required.contains(&name.as_str()),
                    description: spec
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
            }
        }

        Ok(Self { params })
    }

    /// All declared parameters.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// True when the capability takes no arguments.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Invocation payloads
// ---------------------------------------------------------------------------

/// A single content block within a `tools/call` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    /// The content type (e.g. `"text"`).
    #[serde(rename = "type")]
    pub part_type: String,
    /// Textual content, absent for non-text parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentPart {
    /// Create a text content block.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            part_type: "text".into(),
            text: Some(value.into()),
        }
    }
}

/// The `tools/call` result payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResult {
    /// Content blocks returned by the capability.
    #[serde(default)]
    pub content: Vec<ContentPart>,
    /// Whether the call failed on the remote side.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallResult {
    /// A successful result with a single text block (used by test servers).
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::text(value)],
            is_error: false,
        }
    }

    /// Concatenate all text blocks, one per line, skipping non-text parts.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter(|part| part.part_type == "text")
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_has_wire_shape() {
        let request = JsonRpcRequest::new(7, methods::LIST_CAPABILITIES, Value::Null);
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["jsonrpc"], "2.0");
        assert_eq!(wire["id"], 7);
        assert_eq!(wire["method"], "tools/list");
    }

    #[test]
    fn response_payload_success_and_error() {
        let ok = JsonRpcResponse::success(Some(json!(1)), json!({"tools": []}));
        assert_eq!(ok.into_payload().unwrap()["tools"], json!([]));

        let err = JsonRpcResponse::error(Some(json!(2)), error_codes::METHOD_NOT_FOUND, "nope");
        let rpc = err.into_payload().unwrap_err();
        assert_eq!(rpc.code, error_codes::METHOD_NOT_FOUND);
        assert_eq!(rpc.message, "nope");
    }

    #[test]
    fn empty_response_is_null_payload() {
        let response: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 3})).unwrap();
        assert_eq!(response.into_payload().unwrap(), Value::Null);
    }

    #[test]
    fn initialize_result_ignores_capability_flags() {
        let result: InitializeResult = serde_json::from_value(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "home-hub", "version": "1.2.0" }
        }))
        .unwrap();
        assert_eq!(result.protocol_version, PROTOCOL_VERSION);
        assert_eq!(result.server_info.name, "home-hub");
    }

    #[test]
    fn descriptor_parses_camel_case_schema() {
        let descriptor: CapabilityDescriptor = serde_json::from_value(json!({
            "name": "get_weather_now",
            "description": "Current weather for a city",
            "inputSchema": {
                "type": "object",
                "properties": { "city": { "type": "string" } },
                "required": ["city"]
            }
        }))
        .unwrap();
        assert_eq!(descriptor.name, "get_weather_now");
        assert!(descriptor.input_schema.is_object());
    }

    #[test]
    fn decode_typed_schema() {
        let schema = ParamSchema::decode(
            &json!({
                "type": "object",
                "properties": {
                    "city": { "type": "string", "description": "City name" },
                    "days": { "type": "integer" },
                    "detailed": { "type": "boolean" }
                },
                "required": ["city"]
            }),
            "get_weather_now",
        )
        .unwrap();

        let city = schema.get("city").unwrap();
        assert_eq!(city.param_type, ParamType::String);
        assert!(city.required);
        assert_eq!(city.description.as_deref(), Some("City name"));

        let days = schema.get("days").unwrap();
        assert_eq!(days.param_type, ParamType::Number);
        assert!(!days.required);

        assert_eq!(schema.params().len(), 3);
    }

    #[test]
    fn decode_missing_schema_means_no_arguments() {
        assert!(ParamSchema::decode(&Value::Null, "x").unwrap().is_empty());
        assert!(ParamSchema::decode(&json!({"type": "object"}), "x").unwrap().is_empty());
    }

    #[test]
    fn decode_rejects_unsupported_type_tag() {
        let err = ParamSchema::decode(
            &json!({"properties": {"blob": {"type": "binary"}}}),
            "upload",
        )
        .unwrap_err();
        match err {
            CapabilityError::UnsupportedParamType { capability, param, type_tag } => {
                assert_eq!(capability, "upload");
                assert_eq!(param, "blob");
                assert_eq!(type_tag, "binary");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn decode_rejects_missing_type_tag() {
        let err = ParamSchema::decode(&json!({"properties": {"x": {}}}), "t").unwrap_err();
        match err {
            CapabilityError::UnsupportedParamType { type_tag, .. } => {
                assert_eq!(type_tag, "(missing)");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn param_type_matches_values() {
        assert!(ParamType::String.matches(&json!("东莞")));
        assert!(ParamType::Number.matches(&json!(26)));
        assert!(ParamType::Number.matches(&json!(26.5)));
        assert!(ParamType::Boolean.matches(&json!(true)));
        assert!(ParamType::List.matches(&json!([1, 2])));
        assert!(ParamType::Mapping.matches(&json!({"a": 1})));
        assert!(!ParamType::String.matches(&json!(1)));
        assert!(!ParamType::Number.matches(&json!("26")));
    }

    #[test]
    fn joined_text_skips_non_text_parts() {
        let result: CallResult = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "line one" },
                { "type": "image" },
                { "type": "text", "text": "line two" }
            ]
        }))
        .unwrap();
        assert_eq!(result.joined_text(), "line one\nline two");
        assert!(!result.is_error);
    }

    #[test]
    fn error_result_round_trips_flag() {
        let result: CallResult = serde_json::from_value(json!({
            "content": [{ "type": "text", "text": "boom" }],
            "isError": true
        }))
        .unwrap();
        assert!(result.is_error);
        assert_eq!(result.joined_text(), "boom");
    }
}
