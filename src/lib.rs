//! SQL Tool MCP Server Library
//!
//! Exposes preconfigured, parameterized SQL statements as MCP (Model
//! Context Protocol) tools backed by SQLite, PostgreSQL, or MySQL
//! sources. Tools are declared in a JSON file; each invocation resolves
//! template parameters into the statement text, binds the remaining
//! parameters positionally, executes, and returns rows as JSON.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{ConfigError, ServerError, ToolError};
pub use mcp::ToolService;
pub use tools::{SqlTool, ToolRegistry};
