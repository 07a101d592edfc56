//! MCP server integration module.
//!
//! Bridges the configured tool registry onto the MCP protocol using the
//! rmcp framework.

pub mod service;

pub use service::ToolService;
