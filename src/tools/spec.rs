//! Parameter specifications for tool definitions.
//!
//! A tool declares two parameter lists: bind parameters (passed positionally
//! to the database at execution time) and template parameters (substituted
//! into statement text before execution). Both share the same spec shape;
//! template specs additionally carry a rendering rule.

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::collections::HashSet;

use crate::error::ConfigError;
use crate::models::ParameterManifest;

fn default_true() -> bool {
    true
}

/// Declared value kind for a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Float,
    Boolean,
    Array,
}

impl ParamKind {
    /// Kind name used in manifests and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Array => "array",
        }
    }

    /// Corresponding JSON Schema type name.
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
        }
    }

    /// Check whether a JSON value is acceptable for this kind.
    ///
    /// Integers accept only whole numbers; floats accept any number. Element
    /// checks for arrays are the caller's job since the element kind lives on
    /// the spec, not here.
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
        }
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a template parameter is rendered into statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateRendering {
    /// Bare insertion, validated against the identifier allow-list.
    Identifier,
    /// Comma-joined identifiers, each validated.
    IdentifierList,
    /// Single-quoted SQL literal with embedded quotes escaped.
    Literal,
    /// Comma-joined quoted literals, for IN (...) slots.
    LiteralList,
}

/// A verified-claim source for a parameter value.
///
/// When present, the parameter's value is taken from the named auth
/// service's verified claim instead of caller input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSource {
    pub service: String,
    pub claim: String,
}

/// One declared tool parameter, template or bind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Element kind, required when `kind` is `Array`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<ParamKind>,
    /// Rendering rule; only meaningful on template parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendering: Option<TemplateRendering>,
    /// Auth services whose verified claims supply this value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auth_claims: Vec<ClaimSource>,
}

impl ParamSpec {
    /// A parameter is effectively required when it is declared required and
    /// carries no default to fall back on.
    pub fn is_required(&self) -> bool {
        self.required && self.default.is_none()
    }

    /// Element kind for array parameters. Callers must only use this after
    /// `validate` accepted the spec.
    pub fn element_kind(&self) -> ParamKind {
        self.items.unwrap_or(ParamKind::String)
    }

    /// Rendering rule with kind-appropriate defaults when none is declared.
    pub fn effective_rendering(&self) -> TemplateRendering {
        self.rendering.unwrap_or(match self.kind {
            ParamKind::Array => TemplateRendering::IdentifierList,
            _ => TemplateRendering::Identifier,
        })
    }

    /// True when the value comes from verified identity claims, not callers.
    pub fn is_claim_sourced(&self) -> bool {
        !self.auth_claims.is_empty()
    }

    /// Native manifest entry for this parameter.
    pub fn manifest(&self) -> ParameterManifest {
        ParameterManifest {
            name: self.name.clone(),
            param_type: self.kind.as_str().to_string(),
            description: self.description.clone(),
            required: self.is_required(),
            auth_services: self
                .auth_claims
                .iter()
                .map(|c| c.service.clone())
                .collect(),
        }
    }

    /// JSON Schema fragment for this parameter.
    pub fn json_schema(&self) -> JsonValue {
        let mut schema = match self.kind {
            ParamKind::Array => json!({
                "type": "array",
                "description": self.description,
                "items": { "type": self.element_kind().json_type() },
            }),
            kind => json!({
                "type": kind.json_type(),
                "description": self.description,
            }),
        };
        if let (Some(default), Some(obj)) = (&self.default, schema.as_object_mut()) {
            obj.insert("default".to_string(), default.clone());
        }
        schema
    }

    /// Configuration-time validation of one spec.
    pub fn validate(&self, tool: &str) -> Result<(), ConfigError> {
        if !is_valid_identifier(&self.name) {
            return Err(ConfigError::invalid_parameter(
                tool,
                &self.name,
                "name must start with a letter or underscore and contain \
                 only letters, digits, and underscores",
            ));
        }
        match (self.kind, self.items) {
            (ParamKind::Array, None) => {
                return Err(ConfigError::invalid_parameter(
                    tool,
                    &self.name,
                    "array parameter requires an element kind in 'items'",
                ));
            }
            (ParamKind::Array, Some(ParamKind::Array)) => {
                return Err(ConfigError::invalid_parameter(
                    tool,
                    &self.name,
                    "nested arrays are not supported",
                ));
            }
            (ParamKind::Array, Some(_)) => {}
            (_, Some(_)) => {
                return Err(ConfigError::invalid_parameter(
                    tool,
                    &self.name,
                    "only array parameters take an element kind",
                ));
            }
            (_, None) => {}
        }
        if let Some(default) = &self.default {
            if !self.default_matches(default) {
                return Err(ConfigError::invalid_parameter(
                    tool,
                    &self.name,
                    format!("default value does not match declared kind '{}'", self.kind),
                ));
            }
        }
        for claim in &self.auth_claims {
            if claim.service.is_empty() || claim.claim.is_empty() {
                return Err(ConfigError::invalid_parameter(
                    tool,
                    &self.name,
                    "auth claim entries need both a service and a claim name",
                ));
            }
        }
        Ok(())
    }

    fn default_matches(&self, default: &JsonValue) -> bool {
        if default.is_null() {
            return true;
        }
        if !self.kind.accepts(default) {
            return false;
        }
        if let (ParamKind::Array, Some(elements)) = (self.kind, default.as_array()) {
            let element_kind = self.element_kind();
            return elements
                .iter()
                .all(|e| e.is_null() || element_kind.accepts(e));
        }
        true
    }
}

/// Allow-list check for values inserted into SQL as identifiers and for
/// parameter names themselves: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Merge bind and template specs into the single ordered list used for
/// request validation and manifest generation.
///
/// Bind parameters come first, then template parameters. Duplicate names
/// across the two lists are a configuration error.
pub fn combine_parameters(
    tool: &str,
    bind_specs: &[ParamSpec],
    template_specs: &[ParamSpec],
) -> Result<Vec<ParamSpec>, ConfigError> {
    let mut seen = HashSet::new();
    let mut combined = Vec::with_capacity(bind_specs.len() + template_specs.len());
    for spec in bind_specs.iter().chain(template_specs.iter()) {
        spec.validate(tool)?;
        if !seen.insert(spec.name.clone()) {
            return Err(ConfigError::DuplicateParameter {
                tool: tool.to_string(),
                name: spec.name.clone(),
            });
        }
        combined.push(spec.clone());
    }
    Ok(combined)
}

/// JSON Schema object describing the caller-visible arguments.
///
/// Claim-sourced parameters are omitted: their values come from verified
/// identity claims, so clients never supply them.
pub fn input_schema(params: &[ParamSpec]) -> JsonValue {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for spec in params {
        if spec.is_claim_sourced() {
            continue;
        }
        properties.insert(spec.name.clone(), spec.json_schema());
        if spec.is_required() {
            required.push(JsonValue::String(spec.name.clone()));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
