//! The SQL tool facade: one configured statement exposed as a callable tool.
//!
//! A `SqlTool` is built once at startup from its definition and stays
//! read-only afterwards, so concurrent invocations share it freely. Each
//! invocation runs the linear pipeline resolve -> bind -> execute ->
//! materialize and fails fast at the first stage that errors.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::auth::is_authorized;
use crate::db::{self, QueryContext, Source};
use crate::error::{ConfigError, ToolResult};
use crate::models::{ClientManifest, Record, ToolManifest};
use crate::tools::binder::{self, ResolvedStatement};
use crate::tools::observer::{InvocationEvent, InvocationObserver, InvocationOutcome};
use crate::tools::params::{self, ClaimMap, ParamValues};
use crate::tools::spec::{ParamKind, ParamSpec, TemplateRendering, combine_parameters};
use crate::tools::template;

/// One tool as declared in the tools file. Immutable after decode.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Name of the configured source this tool executes against.
    pub source: String,
    #[serde(default)]
    pub description: String,
    /// Statement text with `{{template}}` slots and positional bind markers.
    pub statement: String,
    /// Bind parameters, in bind-marker order.
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
    /// Template parameters substituted into the statement text.
    #[serde(default)]
    pub template_parameters: Vec<ParamSpec>,
    /// Auth services that must all be verified before this tool is offered.
    #[serde(default)]
    pub auth_required: Vec<String>,
}

/// A configured SQL statement exposed through the tool-calling surface.
pub struct SqlTool {
    name: String,
    definition: ToolDefinition,
    source: Arc<Source>,
    all_params: Vec<ParamSpec>,
    manifest: ToolManifest,
    client_manifest: ClientManifest,
    observer: Arc<dyn InvocationObserver>,
}

impl std::fmt::Debug for SqlTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlTool")
            .field("name", &self.name)
            .field("source", &self.source.id())
            .field("params", &self.all_params.len())
            .finish_non_exhaustive()
    }
}

impl SqlTool {
    /// Validate a definition against its source and precompute both
    /// manifests. All configuration errors surface here, at startup.
    pub fn new(
        name: impl Into<String>,
        definition: ToolDefinition,
        source: Arc<Source>,
        observer: Arc<dyn InvocationObserver>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();

        for spec in &definition.parameters {
            if spec.rendering.is_some() {
                return Err(ConfigError::invalid_parameter(
                    &name,
                    &spec.name,
                    "rendering applies only to template parameters",
                ));
            }
            if spec.kind == ParamKind::Array
                && !source.database_type().supports_array_binds()
            {
                return Err(ConfigError::UnsupportedBind {
                    tool: name,
                    name: spec.name.clone(),
                    db: source.database_type().to_string(),
                });
            }
        }
        for spec in &definition.template_parameters {
            let is_list = matches!(
                spec.effective_rendering(),
                TemplateRendering::IdentifierList | TemplateRendering::LiteralList
            );
            if is_list != (spec.kind == ParamKind::Array) {
                let message = if is_list {
                    "list rendering requires an array parameter"
                } else {
                    "array template parameters require a list rendering"
                };
                return Err(ConfigError::invalid_parameter(&name, &spec.name, message));
            }
        }

        let all_params = combine_parameters(
            &name,
            &definition.parameters,
            &definition.template_parameters,
        )?;

        let manifest = ToolManifest {
            description: definition.description.clone(),
            parameters: all_params.iter().map(ParamSpec::manifest).collect(),
            auth_required: definition.auth_required.clone(),
        };
        let client_manifest = ClientManifest {
            name: name.clone(),
            description: definition.description.clone(),
            input_schema: crate::tools::spec::input_schema(&all_params),
        };

        Ok(Self {
            name,
            definition,
            source,
            all_params,
            manifest,
            client_manifest,
            observer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.definition.description
    }

    pub fn source_id(&self) -> &str {
        self.source.id()
    }

    /// Static manifest for discovery UIs, computed at construction.
    pub fn manifest(&self) -> &ToolManifest {
        &self.manifest
    }

    /// Static manifest for machine clients, computed at construction.
    pub fn client_manifest(&self) -> &ClientManifest {
        &self.client_manifest
    }

    /// Advisory authorization predicate: true when the tool requires no
    /// auth service, or every required service was verified. Enforcement is
    /// the calling layer's job.
    pub fn authorized(&self, verified_services: &[String]) -> bool {
        is_authorized(&self.definition.auth_required, verified_services)
    }

    /// This tool never needs an interactive authorization flow.
    pub fn requires_interactive_authorization(&self) -> bool {
        false
    }

    /// Validate raw caller arguments and claims against the combined
    /// parameter list.
    pub fn parse_params(
        &self,
        data: &serde_json::Map<String, serde_json::Value>,
        claims: &ClaimMap,
    ) -> ToolResult<ParamValues> {
        params::parse_params(&self.all_params, data, claims)
    }

    /// Run template substitution and bind extraction, producing the exact
    /// statement and argument list the executor would receive.
    pub fn resolve_statement(&self, values: &ParamValues) -> ToolResult<ResolvedStatement> {
        let sql = template::resolve(
            &self.definition.statement,
            &self.definition.template_parameters,
            values,
        )?;
        let binds = binder::bind(&self.definition.parameters, values)?;
        Ok(ResolvedStatement { sql, binds })
    }

    /// Execute the tool: resolve, bind, execute, materialize.
    ///
    /// Either the full ordered record sequence is returned or an error;
    /// never both. One observer event is emitted per attempt.
    pub async fn invoke(
        &self,
        ctx: &QueryContext,
        values: &ParamValues,
    ) -> ToolResult<Vec<Record>> {
        let start = Instant::now();
        let mut statement_text = None;
        let mut executed = false;

        let result = async {
            let resolved = self.resolve_statement(values)?;
            statement_text = Some(resolved.sql.clone());
            executed = true;
            let rows = db::execute(&self.source, &resolved, ctx).await?;
            db::materialize(&rows)
        }
        .await;

        self.observer.record(&InvocationEvent {
            invocation_id: Uuid::new_v4(),
            tool: self.name.clone(),
            statement: statement_text,
            parameter_count: values.len(),
            executed,
            outcome: match &result {
                Ok(records) => InvocationOutcome::Succeeded {
                    rows: records.len(),
                },
                Err(e) => InvocationOutcome::Failed {
                    error: e.kind().to_string(),
                },
            },
            elapsed: start.elapsed(),
        });

        result
    }
}
