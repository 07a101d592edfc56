//! Per-invocation observability.
//!
//! One structured event is emitted per invocation attempt through an
//! injectable observer, so diagnostics can be turned off in production and
//! asserted on in tests instead of leaking to stdout.

use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Terminal state of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    Succeeded { rows: usize },
    Failed { error: String },
}

/// Structured record of one invocation attempt.
#[derive(Debug, Clone)]
pub struct InvocationEvent {
    pub invocation_id: Uuid,
    pub tool: String,
    /// Resolved statement text; absent when the pipeline failed before
    /// template resolution completed.
    pub statement: Option<String>,
    pub parameter_count: usize,
    /// Whether a database call was actually issued.
    pub executed: bool,
    pub outcome: InvocationOutcome,
    pub elapsed: Duration,
}

/// Observability hook invoked once per invocation.
pub trait InvocationObserver: Send + Sync {
    fn record(&self, event: &InvocationEvent);
}

/// Default observer: structured tracing events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl InvocationObserver for TracingObserver {
    fn record(&self, event: &InvocationEvent) {
        match &event.outcome {
            InvocationOutcome::Succeeded { rows } => {
                info!(
                    tool = %event.tool,
                    invocation_id = %event.invocation_id,
                    params = event.parameter_count,
                    rows = rows,
                    elapsed_ms = event.elapsed.as_millis() as u64,
                    "Tool invocation completed"
                );
            }
            InvocationOutcome::Failed { error } => {
                warn!(
                    tool = %event.tool,
                    invocation_id = %event.invocation_id,
                    params = event.parameter_count,
                    executed = event.executed,
                    error = %error,
                    elapsed_ms = event.elapsed.as_millis() as u64,
                    "Tool invocation failed"
                );
            }
        }
    }
}

/// Observer that keeps every event in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<InvocationEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<InvocationEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl InvocationObserver for CollectingObserver {
    fn record(&self, event: &InvocationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
