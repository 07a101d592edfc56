//! Error types for the SQL tool server.
//!
//! This module defines all error types using `thiserror`. Invocation errors
//! (`ToolError`) separate caller-input problems from backend problems so MCP
//! clients can decide whether to fix their arguments or report an outage.
//! Startup problems get their own type (`ConfigError`) and never surface
//! through a tool call.

use thiserror::Error;

/// Errors produced while invoking a tool.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("missing required parameter '{name}'")]
    MissingParameter { name: String },

    #[error("parameter '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("template parameter '{name}' rejected unsafe value: {value}")]
    TemplateRenderRejected { name: String, value: String },

    #[error("query execution failed: {message}")]
    ExecutionFailed {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("invocation canceled before the query completed")]
    ExecutionCanceled,

    #[error("failed to decode result row: {message}")]
    ResultDecodeFailed {
        column: Option<String>,
        message: String,
    },
}

impl ToolError {
    /// Create a missing parameter error.
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    /// Create a type mismatch error naming the expected and actual kinds.
    pub fn type_mismatch(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a template rejection error for a value that failed the safety check.
    pub fn template_rejected(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::TemplateRenderRejected {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Create an execution failure with an optional SQLSTATE code.
    pub fn execution_failed(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a decode failure, optionally naming the offending column.
    pub fn decode_failed(column: Option<String>, message: impl Into<String>) -> Self {
        Self::ResultDecodeFailed {
            column,
            message: message.into(),
        }
    }

    /// True when the caller can fix this error by changing the request
    /// (as opposed to a backend/database problem).
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter { .. }
                | Self::TypeMismatch { .. }
                | Self::TemplateRenderRejected { .. }
        )
    }

    /// The parameter name this error is about, if any.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::MissingParameter { name } => Some(name),
            Self::TypeMismatch { name, .. } => Some(name),
            Self::TemplateRenderRejected { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Stable kind label for logs and observability events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingParameter { .. } => "missing_parameter",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::TemplateRenderRejected { .. } => "template_render_rejected",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::ExecutionCanceled => "execution_canceled",
            Self::ResultDecodeFailed { .. } => "result_decode_failed",
        }
    }
}

/// Convert sqlx errors into the invocation taxonomy.
impl From<sqlx::Error> for ToolError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                ToolError::execution_failed(db_err.message(), code)
            }
            sqlx::Error::ColumnDecode { index, source } => ToolError::decode_failed(
                Some(index.to_string()),
                format!("column decode failed: {source}"),
            ),
            sqlx::Error::Decode(source) => {
                ToolError::decode_failed(None, format!("decode failed: {source}"))
            }
            sqlx::Error::ColumnNotFound(col) => {
                ToolError::decode_failed(Some(col.clone()), format!("column not found: {col}"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => ToolError::decode_failed(
                Some(index.to_string()),
                format!("column index {index} out of bounds (len: {len})"),
            ),
            other => ToolError::execution_failed(other.to_string(), None),
        }
    }
}

/// Result type alias for tool invocations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Convert ToolError to MCP ErrorData for semantic error categorization.
/// Caller-input problems map to invalid_params; backend problems to
/// internal_error. The offending parameter name rides along in `data`.
impl From<ToolError> for rmcp::ErrorData {
    fn from(err: ToolError) -> Self {
        let data = err
            .parameter()
            .map(|name| serde_json::json!({ "parameter": name }));
        if err.is_caller_fault() {
            rmcp::ErrorData::invalid_params(err.to_string(), data)
        } else {
            rmcp::ErrorData::internal_error(err.to_string(), data)
        }
    }
}

/// Errors raised while loading configuration and building the tool registry.
/// These abort startup; they are never returned from an invocation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no source named '{name}' configured")]
    UnknownSource { name: String },

    #[error("invalid source URL for '{id}': {message}")]
    InvalidSourceUrl { id: String, message: String },

    #[error("failed to connect source '{id}': {message}")]
    SourceConnect { id: String, message: String },

    #[error("duplicate tool name '{name}'")]
    DuplicateTool { name: String },

    #[error("tool '{tool}': duplicate parameter name '{name}'")]
    DuplicateParameter { tool: String, name: String },

    #[error("tool '{tool}': parameter '{name}': {message}")]
    InvalidParameter {
        tool: String,
        name: String,
        message: String,
    },

    #[error(
        "tool '{tool}': array parameter '{name}' cannot be bound on {db}; \
         use a template parameter with list rendering instead"
    )]
    UnsupportedBind {
        tool: String,
        name: String,
        db: String,
    },

    #[error("failed to load tools file '{path}': {message}")]
    ToolsFile { path: String, message: String },

    #[error("auth service '{name}': {message}")]
    InvalidAuthService { name: String, message: String },
}

impl ConfigError {
    /// Create an unknown source error.
    pub fn unknown_source(name: impl Into<String>) -> Self {
        Self::UnknownSource { name: name.into() }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(
        tool: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            tool: tool.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a tools file error.
    pub fn tools_file(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolsFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an auth service configuration error.
    pub fn invalid_auth_service(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAuthService {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Top-level server errors: configuration failures plus transport
/// lifecycle failures that end the process.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ServerError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameter_display() {
        let err = ToolError::missing_parameter("user_id");
        assert_eq!(err.to_string(), "missing required parameter 'user_id'");
    }

    #[test]
    fn test_type_mismatch_names_kinds() {
        let err = ToolError::type_mismatch("age", "integer", "string");
        assert!(err.to_string().contains("expected integer"));
        assert!(err.to_string().contains("got string"));
    }

    #[test]
    fn test_caller_fault_classification() {
        assert!(ToolError::missing_parameter("x").is_caller_fault());
        assert!(ToolError::type_mismatch("x", "integer", "string").is_caller_fault());
        assert!(ToolError::template_rejected("t", "users; DROP").is_caller_fault());
        assert!(!ToolError::execution_failed("boom", None).is_caller_fault());
        assert!(!ToolError::ExecutionCanceled.is_caller_fault());
        assert!(!ToolError::decode_failed(None, "bad").is_caller_fault());
    }

    #[test]
    fn test_caller_fault_maps_to_invalid_params() {
        let err = ToolError::missing_parameter("user_id");
        let mcp_err: rmcp::ErrorData = err.into();
        // invalid_params uses -32602
        assert_eq!(mcp_err.code.0, -32602);
        assert_eq!(mcp_err.data.unwrap()["parameter"], "user_id");
    }

    #[test]
    fn test_backend_fault_maps_to_internal_error() {
        let err = ToolError::execution_failed("table missing", Some("42P01".into()));
        let mcp_err: rmcp::ErrorData = err.into();
        // internal_error uses -32603
        assert_eq!(mcp_err.code.0, -32603);
    }

    #[test]
    fn test_canceled_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData = ToolError::ExecutionCanceled.into();
        assert_eq!(mcp_err.code.0, -32603);
    }

    #[test]
    fn test_sqlx_decode_error_maps_to_result_decode_failed() {
        let err: ToolError = sqlx::Error::ColumnNotFound("email".to_string()).into();
        assert!(matches!(err, ToolError::ResultDecodeFailed { .. }));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::unknown_source("warehouse");
        assert_eq!(err.to_string(), "no source named 'warehouse' configured");
    }
}
