use std::time::Duration;
use thiserror::Error;

use crate::descriptor::ResourceKind;

/// Failures surfaced by the provisioning subsystem.
///
/// Every variant reaches the caller; nothing here is logged and dropped.
#[derive(Debug, Error)]
pub enum ShardError {
    /// A required connection setting is missing or malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The control plane rejected a call (create, attach or refresh).
    #[error("{operation} failed: {source:#}")]
    ControlPlane {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// The resource was created but entered a permanent failure status.
    #[error("{kind} {name} [{id}] entered ERROR state: {}", fault_text(.fault))]
    Resource {
        kind: ResourceKind,
        name: String,
        id: String,
        fault: Option<String>,
    },

    /// The wait budget elapsed while the resource was still pending.
    #[error("{kind} {name} [{id}] not available after {} seconds", .elapsed.as_secs())]
    Timeout {
        kind: ResourceKind,
        name: String,
        id: String,
        elapsed: Duration,
    },

    /// The host asked us to stop while a poll was sleeping.
    #[error("Wait for {kind} {name} [{id}] cancelled after {} seconds", .elapsed.as_secs())]
    Cancelled {
        kind: ResourceKind,
        name: String,
        id: String,
        elapsed: Duration,
    },

    /// A declared dependency is unknown, unresolved, failed or of the wrong kind.
    #[error("Dependency error: {0}")]
    Dependency(String),
}

impl ShardError {
    pub fn control_plane(operation: impl Into<String>, source: anyhow::Error) -> Self {
        ShardError::ControlPlane {
            operation: operation.into(),
            source,
        }
    }

    /// Fault detail reported by the control plane, if this is a resource failure.
    pub fn fault(&self) -> Option<&str> {
        match self {
            ShardError::Resource { fault, .. } => fault.as_deref(),
            _ => None,
        }
    }
}

fn fault_text(fault: &Option<String>) -> &str {
    fault.as_deref().unwrap_or("no fault reported")
}

pub type Result<T> = std::result::Result<T, ShardError>;
