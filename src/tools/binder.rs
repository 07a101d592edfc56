//! Parameter Binder: turns validated request values into the ordered
//! positional argument list for the resolved statement.
//!
//! The binder never inspects statement text. Position i of its output
//! corresponds to the i-th bind marker; that correspondence is a
//! configuration-time contract.

use serde_json::Value as JsonValue;

use crate::error::{ToolError, ToolResult};
use crate::models::BindValue;
use crate::tools::params::{ParamValues, json_kind};
use crate::tools::spec::{ParamKind, ParamSpec};

/// Statement text after template substitution, paired with the bind values
/// extracted in bind-spec order. This is exactly what the executor receives.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStatement {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

/// Extract and coerce bind values in declaration order.
pub fn bind(bind_specs: &[ParamSpec], values: &ParamValues) -> ToolResult<Vec<BindValue>> {
    let mut out = Vec::with_capacity(bind_specs.len());
    for spec in bind_specs {
        let value = match values.get(&spec.name).cloned().or_else(|| spec.default.clone()) {
            Some(v) => v,
            None => return Err(ToolError::missing_parameter(&spec.name)),
        };
        out.push(coerce(spec, spec.kind, &value)?);
    }
    Ok(out)
}

fn coerce(spec: &ParamSpec, kind: ParamKind, value: &JsonValue) -> ToolResult<BindValue> {
    if value.is_null() {
        return Ok(BindValue::Null);
    }
    let mismatch = || ToolError::type_mismatch(&spec.name, kind.as_str(), json_kind(value));
    match kind {
        ParamKind::String => value
            .as_str()
            .map(|s| BindValue::Text(s.to_string()))
            .ok_or_else(mismatch),
        ParamKind::Integer => match value.as_i64() {
            Some(i) => Ok(BindValue::Int(i)),
            None if value.is_u64() => Err(ToolError::type_mismatch(
                &spec.name,
                kind.as_str(),
                "integer out of range",
            )),
            None => Err(mismatch()),
        },
        ParamKind::Float => value.as_f64().map(BindValue::Float).ok_or_else(mismatch),
        ParamKind::Boolean => value.as_bool().map(BindValue::Bool).ok_or_else(mismatch),
        ParamKind::Array => {
            let elements = value.as_array().ok_or_else(mismatch)?;
            let element_kind = spec.element_kind();
            let coerced = elements
                .iter()
                .map(|element| coerce(spec, element_kind, element))
                .collect::<ToolResult<Vec<BindValue>>>()?;
            Ok(BindValue::Array(coerced))
        }
    }
}
