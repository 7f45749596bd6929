//! Error-monitoring collaborator. Reporting is fire-and-forget and never
//! changes control flow.

use tracing::error;

pub trait ErrorMonitor: Send + Sync {
    fn add_error(&self, error: &dyn std::error::Error, context: &[(&str, String)]);
}

/// Reports errors as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl ErrorMonitor for TracingMonitor {
    fn add_error(&self, err: &dyn std::error::Error, context: &[(&str, String)]) {
        let context = context
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        error!(error = %err, %context, "sync error reported");
    }
}
