//! Serializable tool descriptors for catalog and client consumption.

use serde::Serialize;
use serde_json::Value as JsonValue;

/// One parameter as advertised in a tool's native manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterManifest {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    pub required: bool,
    /// Auth services that may supply this parameter from verified claims.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub auth_services: Vec<String>,
}

/// Native manifest: what the tool does, what it takes, who may call it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolManifest {
    pub description: String,
    pub parameters: Vec<ParameterManifest>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub auth_required: Vec<String>,
}

/// Client-facing manifest: tool name, description, and a JSON Schema object
/// describing the expected arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientManifest {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
}
