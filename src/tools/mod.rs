//! Tool layer: parameter handling, statement resolution, and the facade
//! that turns one configured SQL statement into a callable tool.

pub mod binder;
pub mod observer;
pub mod params;
pub mod registry;
pub mod spec;
pub mod sql_tool;
pub mod template;

pub use binder::ResolvedStatement;
pub use observer::{
    CollectingObserver, InvocationEvent, InvocationObserver, InvocationOutcome, TracingObserver,
};
pub use params::{ClaimMap, ParamValues, parse_params};
pub use registry::{ToolRegistry, ToolsFile};
pub use spec::{ClaimSource, ParamKind, ParamSpec, TemplateRendering};
pub use sql_tool::{SqlTool, ToolDefinition};
