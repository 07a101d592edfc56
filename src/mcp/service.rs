//! MCP service implementation using rmcp.
//!
//! Tools are declared in configuration, not in code, so this handler
//! implements `list_tools` and `call_tool` directly instead of using the
//! static tool-router macros.

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, JsonObject,
        ListToolsResult, PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
        Tool,
    },
    service::RequestContext,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::auth::{AuthRegistry, VerifiedAuth};
use crate::db::QueryContext;
use crate::tools::{SqlTool, ToolRegistry};

#[derive(Clone)]
pub struct ToolService {
    tools: Arc<ToolRegistry>,
    auth: Arc<AuthRegistry>,
    /// True when the peer is a local process (stdio). Local peers are
    /// trusted for every configured auth service; remote peers must prove
    /// each service with its token header.
    local_peer: bool,
    query_timeout: Duration,
}

impl ToolService {
    pub fn new(
        tools: Arc<ToolRegistry>,
        auth: Arc<AuthRegistry>,
        local_peer: bool,
        query_timeout: Duration,
    ) -> Self {
        Self {
            tools,
            auth,
            local_peer,
            query_timeout,
        }
    }

    /// Authorization outcome for one request. HTTP requests carry their
    /// headers in the request extensions; anything else is header-less and
    /// only trusted when the peer is local.
    fn request_auth(&self, context: &RequestContext<RoleServer>) -> VerifiedAuth {
        if let Some(parts) = context.extensions.get::<axum::http::request::Parts>() {
            self.auth.verify_headers(&parts.headers)
        } else if self.local_peer {
            self.auth.local_trust()
        } else {
            VerifiedAuth::default()
        }
    }

    /// Catalog of the tools this peer is allowed to see.
    fn tool_listing(&self, verified: &VerifiedAuth) -> ListToolsResult {
        let tools = self
            .tools
            .list()
            .iter()
            .filter(|tool| tool.authorized(&verified.services))
            .map(|tool| tool_entry(tool))
            .collect();
        ListToolsResult {
            meta: Default::default(),
            tools,
            next_cursor: None,
        }
    }
}

fn tool_entry(tool: &SqlTool) -> Tool {
    let manifest = tool.client_manifest();
    let schema = match &manifest.input_schema {
        JsonValue::Object(map) => map.clone(),
        _ => JsonObject::new(),
    };
    Tool::new(
        manifest.name.clone(),
        manifest.description.clone(),
        Arc::new(schema),
    )
}

impl ServerHandler for ToolService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sqltool-mcp-server".to_owned(),
                title: Some("SQL Tool MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Preconfigured SQL statements exposed as tools.\n\
                \n\
                Each tool runs one parameterized statement against its configured\n\
                database source. Call `tools/list` to see the available tools and\n\
                their parameters, then call a tool with its arguments. Results are\n\
                returned as a JSON array of row objects in query order.\n\
                \n\
                Tools that declare required auth services are hidden until the\n\
                request proves those services."
                    .to_string(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let verified = self.request_auth(&context);
        Ok(self.tool_listing(&verified))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let Some(tool) = self.tools.get(&request.name) else {
            return Err(McpError::invalid_params(
                format!("unknown tool '{}'", request.name),
                None,
            ));
        };

        let verified = self.request_auth(&context);
        if !tool.authorized(&verified.services) {
            return Err(McpError::invalid_params(
                format!("tool '{}' requires authorization", request.name),
                None,
            ));
        }

        let empty = JsonObject::new();
        let arguments = request.arguments.as_ref().unwrap_or(&empty);
        let values = tool.parse_params(arguments, &verified.claims)?;

        debug!(tool = %request.name, "Tool call accepted");
        let ctx = QueryContext::with_cancellation(context.ct.clone(), self.query_timeout);
        let records = tool.invoke(&ctx, &values).await?;

        let json = serde_json::to_string(&records)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}
