//! Data models shared across the tool pipeline.

pub mod manifest;
pub mod value;

pub use manifest::{ClientManifest, ParameterManifest, ToolManifest};
pub use value::{BindValue, Record, ScalarValue};
