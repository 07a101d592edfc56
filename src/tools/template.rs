//! Template Resolver: substitutes declared template parameters into
//! statement text before the database ever sees it.
//!
//! Placeholders look like `{{name}}` (whitespace inside the braces is
//! tolerated). Substitution happens only on pre-declared named slots, and
//! every rendered value passes either the identifier allow-list or literal
//! quoting. The output is plain text; malformed SQL past this point is the
//! database's to reject.

use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::error::{ToolError, ToolResult};
use crate::tools::params::ParamValues;
use crate::tools::spec::{ParamSpec, TemplateRendering, is_valid_identifier};

/// Substitute every template placeholder in `statement`.
///
/// Values come from `values`, falling back to each spec's default. A
/// placeholder with no rendered value, declared or not, is an error: no
/// template token may survive into the text sent to the database.
pub fn resolve(
    statement: &str,
    specs: &[ParamSpec],
    values: &ParamValues,
) -> ToolResult<String> {
    let mut rendered: HashMap<&str, String> = HashMap::with_capacity(specs.len());
    for spec in specs {
        let value = match values.get(&spec.name).cloned().or_else(|| spec.default.clone()) {
            Some(v) => v,
            None => return Err(ToolError::missing_parameter(&spec.name)),
        };
        rendered.insert(spec.name.as_str(), render(spec, &value)?);
    }

    let mut out = String::with_capacity(statement.len());
    let mut rest = statement;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unterminated braces are ordinary text.
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let token = after[..end].trim();
        match rendered.get(token) {
            Some(replacement) => out.push_str(replacement),
            None => return Err(ToolError::missing_parameter(token)),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn render(spec: &ParamSpec, value: &JsonValue) -> ToolResult<String> {
    match spec.effective_rendering() {
        TemplateRendering::Identifier => render_identifier(&spec.name, value),
        TemplateRendering::Literal => render_literal(&spec.name, value),
        TemplateRendering::IdentifierList => render_list(&spec.name, value, render_identifier),
        TemplateRendering::LiteralList => render_list(&spec.name, value, render_literal),
    }
}

fn render_list(
    name: &str,
    value: &JsonValue,
    render_element: fn(&str, &JsonValue) -> ToolResult<String>,
) -> ToolResult<String> {
    let Some(elements) = value.as_array() else {
        return Err(ToolError::template_rejected(name, value.to_string()));
    };
    let parts = elements
        .iter()
        .map(|element| render_element(name, element))
        .collect::<ToolResult<Vec<String>>>()?;
    Ok(parts.join(", "))
}

fn render_identifier(name: &str, value: &JsonValue) -> ToolResult<String> {
    let Some(s) = value.as_str() else {
        return Err(ToolError::template_rejected(name, value.to_string()));
    };
    if !is_valid_identifier(s) {
        return Err(ToolError::template_rejected(name, s));
    }
    Ok(s.to_string())
}

fn render_literal(name: &str, value: &JsonValue) -> ToolResult<String> {
    match value {
        JsonValue::Null => Ok("NULL".to_string()),
        JsonValue::Bool(true) => Ok("TRUE".to_string()),
        JsonValue::Bool(false) => Ok("FALSE".to_string()),
        JsonValue::Number(n) => Ok(n.to_string()),
        JsonValue::String(s) => {
            // Backslashes are escape characters on some databases, so a
            // quoted rendering cannot be made portable for them. NUL never
            // belongs in statement text.
            if s.contains('\\') || s.contains('\0') {
                return Err(ToolError::template_rejected(name, s));
            }
            Ok(format!("'{}'", s.replace('\'', "''")))
        }
        other => Err(ToolError::template_rejected(name, other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::spec::ParamKind;
    use serde_json::json;

    fn spec(name: &str, kind: ParamKind, rendering: TemplateRendering) -> ParamSpec {
        ParamSpec {
            name: name.to_string(),
            kind,
            description: String::new(),
            required: true,
            default: None,
            items: None,
            rendering: Some(rendering),
            auth_claims: vec![],
        }
    }

    fn values(pairs: &[(&str, JsonValue)]) -> ParamValues {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_substitutes_every_occurrence() {
        let specs = vec![spec("table", ParamKind::String, TemplateRendering::Identifier)];
        let sql = resolve(
            "SELECT * FROM {{table}} WHERE {{ table }}.id = :1",
            &specs,
            &values(&[("table", json!("users"))]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM users WHERE users.id = :1");
    }

    #[test]
    fn test_identifier_injection_rejected() {
        let specs = vec![spec("table", ParamKind::String, TemplateRendering::Identifier)];
        let err = resolve(
            "SELECT * FROM {{table}}",
            &specs,
            &values(&[("table", json!("users; DROP TABLE x"))]),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::TemplateRenderRejected { name, .. } if name == "table"));
    }

    #[test]
    fn test_identifier_rejects_non_string() {
        let specs = vec![spec("table", ParamKind::String, TemplateRendering::Identifier)];
        let err = resolve(
            "SELECT * FROM {{table}}",
            &specs,
            &values(&[("table", json!(42))]),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::TemplateRenderRejected { .. }));
    }

    #[test]
    fn test_literal_quotes_and_escapes() {
        let specs = vec![spec("label", ParamKind::String, TemplateRendering::Literal)];
        let sql = resolve(
            "SELECT {{label}} AS tag",
            &specs,
            &values(&[("label", json!("O'Brien"))]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT 'O''Brien' AS tag");
    }

    #[test]
    fn test_literal_rejects_backslash() {
        let specs = vec![spec("label", ParamKind::String, TemplateRendering::Literal)];
        let err = resolve(
            "SELECT {{label}}",
            &specs,
            &values(&[("label", json!("a\\'; DROP TABLE x --"))]),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::TemplateRenderRejected { .. }));
    }

    #[test]
    fn test_literal_renders_scalars_bare() {
        let specs = vec![
            spec("n", ParamKind::Integer, TemplateRendering::Literal),
            spec("flag", ParamKind::Boolean, TemplateRendering::Literal),
            spec("none", ParamKind::String, TemplateRendering::Literal),
        ];
        let sql = resolve(
            "SELECT {{n}}, {{flag}}, {{none}}",
            &specs,
            &values(&[("n", json!(7)), ("flag", json!(true)), ("none", JsonValue::Null)]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT 7, TRUE, NULL");
    }

    #[test]
    fn test_identifier_list_expansion() {
        let specs = vec![spec("cols", ParamKind::Array, TemplateRendering::IdentifierList)];
        let sql = resolve(
            "SELECT {{cols}} FROM users",
            &specs,
            &values(&[("cols", json!(["name", "email"]))]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT name, email FROM users");
    }

    #[test]
    fn test_literal_list_expansion() {
        let specs = vec![spec("depts", ParamKind::Array, TemplateRendering::LiteralList)];
        let sql = resolve(
            "SELECT * FROM users WHERE dept IN ({{depts}})",
            &specs,
            &values(&[("depts", json!(["Sales", "HR"]))]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM users WHERE dept IN ('Sales', 'HR')");
    }

    #[test]
    fn test_list_element_injection_rejected() {
        let specs = vec![spec("cols", ParamKind::Array, TemplateRendering::IdentifierList)];
        let err = resolve(
            "SELECT {{cols}} FROM users",
            &specs,
            &values(&[("cols", json!(["name", "1; DELETE FROM users"]))]),
        )
        .unwrap_err();
        assert!(matches!(err, ToolError::TemplateRenderRejected { .. }));
    }

    #[test]
    fn test_missing_template_value() {
        let specs = vec![spec("table", ParamKind::String, TemplateRendering::Identifier)];
        let err = resolve("SELECT * FROM {{table}}", &specs, &ParamValues::new()).unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter { name } if name == "table"));
    }

    #[test]
    fn test_default_fallback() {
        let mut table = spec("table", ParamKind::String, TemplateRendering::Identifier);
        table.default = Some(json!("users"));
        let sql = resolve("SELECT * FROM {{table}}", &[table], &ParamValues::new()).unwrap();
        assert_eq!(sql, "SELECT * FROM users");
    }

    #[test]
    fn test_undeclared_placeholder_is_missing() {
        let err = resolve("SELECT * FROM {{mystery}}", &[], &ParamValues::new()).unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter { name } if name == "mystery"));
    }

    #[test]
    fn test_unterminated_braces_pass_through() {
        let sql = resolve("SELECT '{{' FROM t", &[], &ParamValues::new()).unwrap();
        assert_eq!(sql, "SELECT '{{' FROM t");
    }

    #[test]
    fn test_extra_values_ignored() {
        let specs = vec![spec("table", ParamKind::String, TemplateRendering::Identifier)];
        let sql = resolve(
            "SELECT * FROM {{table}}",
            &specs,
            &values(&[("table", json!("users")), ("noise", json!("x"))]),
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM users");
    }
}
