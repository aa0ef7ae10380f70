//! Progress notifications addressed by correlation id.

use tokio::sync::mpsc;

/// Receives free-text progress updates for a provisioning run.
pub trait ProgressSink: Send + Sync {
    fn send_console_update(&self, correlation_id: &str, message: &str);
}

/// Writes every update to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn send_console_update(&self, correlation_id: &str, message: &str) {
        tracing::info!(correlation_id = %correlation_id, "{}", message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub correlation_id: String,
    pub message: String,
}

/// Forwards updates over an unbounded channel to a host console.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelProgressSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn send_console_update(&self, correlation_id: &str, message: &str) {
        let update = ProgressUpdate {
            correlation_id: correlation_id.to_string(),
            message: message.to_string(),
        };
        if self.tx.send(update).is_err() {
            tracing::debug!(correlation_id = %correlation_id, "Progress receiver dropped");
        }
    }
}
