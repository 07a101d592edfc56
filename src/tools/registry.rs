//! Tools-file decoding and the startup tool registry.

use serde::de::{DeserializeSeed, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::db::SourceRegistry;
use crate::error::ConfigError;
use crate::tools::observer::InvocationObserver;
use crate::tools::sql_tool::{SqlTool, ToolDefinition};

/// Decoded tools file: a top-level `tools` object keyed by tool name.
///
/// Entries keep document order, including duplicate names, so the
/// registry can reject a duplicate instead of silently dropping one.
#[derive(Debug, Clone, Default)]
pub struct ToolsFile {
    pub tools: Vec<(String, ToolDefinition)>,
}

impl<'de> Deserialize<'de> for ToolsFile {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FileVisitor;

        impl<'de> Visitor<'de> for FileVisitor {
            type Value = ToolsFile;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a tools file with a top-level \"tools\" object")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut tools = None;
                while let Some(key) = access.next_key::<String>()? {
                    if key == "tools" {
                        tools = Some(access.next_value_seed(ToolEntries)?);
                    } else {
                        access.next_value::<IgnoredAny>()?;
                    }
                }
                Ok(ToolsFile {
                    tools: tools.unwrap_or_default(),
                })
            }
        }

        deserializer.deserialize_map(FileVisitor)
    }
}

/// Streams the `tools` object entry by entry. A derived map would
/// collapse duplicate keys before we ever saw them.
struct ToolEntries;

impl<'de> DeserializeSeed<'de> for ToolEntries {
    type Value = Vec<(String, ToolDefinition)>;

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = Vec<(String, ToolDefinition)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of tool name to tool definition")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, definition)) =
                    access.next_entry::<String, ToolDefinition>()?
                {
                    entries.push((name, definition));
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// All configured tools, keyed by name. Built once at startup and shared
/// read-only across connections.
#[derive(Debug)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<SqlTool>>,
}

impl ToolRegistry {
    /// Validate every definition against the connected sources and build
    /// the name-to-tool map. Fails on the first bad definition.
    pub fn build(
        file: ToolsFile,
        sources: &SourceRegistry,
        observer: Arc<dyn InvocationObserver>,
    ) -> Result<Self, ConfigError> {
        let mut tools = HashMap::with_capacity(file.tools.len());
        for (name, definition) in file.tools {
            let source = sources.get(&definition.source)?;
            let tool = SqlTool::new(&name, definition, source, observer.clone())?;
            if tools.insert(name.clone(), Arc::new(tool)).is_some() {
                return Err(ConfigError::DuplicateTool { name });
            }
        }
        info!(tools = tools.len(), "Tool registry ready");
        Ok(Self { tools })
    }

    pub fn get(&self, name: &str) -> Option<Arc<SqlTool>> {
        self.tools.get(name).cloned()
    }

    /// All tools, sorted by name for stable listings.
    pub fn list(&self) -> Vec<Arc<SqlTool>> {
        let mut tools: Vec<_> = self.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
