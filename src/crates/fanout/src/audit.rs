//! Audit events.
//!
//! The engine records one event per run start/end, per terminal model
//! transition and per synthesis decision. Where the events go is up to the
//! [`AuditLogger`] the caller injects; a failing logger never stops a run.

use crate::error::AuditError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

/// What an audit event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditOperation {
    ExecuteStart,
    ExecuteEnd,
    ModelProcessingComplete,
    ModelProcessingFailed,
    ModelProcessingCancelled,
    SynthesisStart,
    SynthesisComplete,
    SynthesisFailed,
    SynthesisSkipped,
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One structured audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub level: AuditLevel,
    pub operation: AuditOperation,
    pub message: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub correlation_id: String,
}

impl AuditEvent {
    /// Event stamped with the current time.
    pub fn new(
        level: AuditLevel,
        operation: AuditOperation,
        correlation_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            operation,
            message: message.into(),
            inputs: Map::new(),
            outputs: Map::new(),
            metadata: Map::new(),
            correlation_id: correlation_id.into(),
        }
    }

    pub fn info(
        operation: AuditOperation,
        correlation_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(AuditLevel::Info, operation, correlation_id, message)
    }

    pub fn warn(
        operation: AuditOperation,
        correlation_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(AuditLevel::Warn, operation, correlation_id, message)
    }

    pub fn error(
        operation: AuditOperation,
        correlation_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(AuditLevel::Error, operation, correlation_id, message)
    }

    /// Add an input field.
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    /// Add an output field.
    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }

    /// Add a metadata field.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Destination for audit events.
pub trait AuditLogger: Send + Sync {
    /// Record an event.
    fn log(&self, event: AuditEvent) -> Result<(), AuditError>;

    /// Flush and stop accepting events.
    fn close(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Send an event, reporting (not propagating) sink failures.
pub(crate) fn emit(logger: &dyn AuditLogger, event: AuditEvent) {
    let operation = event.operation;
    if let Err(e) = logger.log(event) {
        warn!(operation = %operation, error = %e, "Failed to record audit event");
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditLogger;

impl AuditLogger for NoopAuditLogger {
    fn log(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Forwards events to `tracing` at the matching level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        let outputs = Value::Object(event.outputs);
        match event.level {
            AuditLevel::Info => info!(
                target: "fanout::audit",
                operation = %event.operation,
                correlation_id = %event.correlation_id,
                outputs = %outputs,
                "{}", event.message
            ),
            AuditLevel::Warn => warn!(
                target: "fanout::audit",
                operation = %event.operation,
                correlation_id = %event.correlation_id,
                outputs = %outputs,
                "{}", event.message
            ),
            AuditLevel::Error => error!(
                target: "fanout::audit",
                operation = %event.operation,
                correlation_id = %event.correlation_id,
                outputs = %outputs,
                "{}", event.message
            ),
        }
        Ok(())
    }
}

/// Keeps events in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditLogger {
    events: Mutex<Vec<AuditEvent>>,
    closed: AtomicBool,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded event, in order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Recorded events for one operation.
    pub fn events_for(&self, operation: AuditOperation) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.operation == operation)
            .cloned()
            .collect()
    }

    /// Number of recorded events for one operation.
    pub fn count(&self, operation: AuditOperation) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.operation == operation)
            .count()
    }

    /// Serialize every event as JSON lines.
    pub fn to_json_lines(&self) -> Result<String, AuditError> {
        let events = self.events.lock();
        let mut out = String::new();
        for event in events.iter() {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl AuditLogger for MemoryAuditLogger {
    fn log(&self, event: AuditEvent) -> Result<(), AuditError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AuditError::Closed);
        }
        self.events.lock().push(event);
        Ok(())
    }

    fn close(&self) -> Result<(), AuditError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
