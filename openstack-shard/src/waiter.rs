//! Readiness waiter.
//!
//! One polling algorithm for every asynchronously provisioned kind. A
//! kind plugs in through [`Waitable`]: where its status lives, which
//! values mean ready and failed, how to re-fetch it, and how to extract a
//! fault message. Each refresh yields a new snapshot; the previous one is
//! dropped, never patched.

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::WaitBudget;
use crate::context::ClientContext;
use crate::control_plane::{
    ControlPlane, NetworkSnapshot, NetworkStatus, ResourceIdentity, ServerSnapshot, ServerStatus,
    VolumeSnapshot, VolumeStatus,
};
use crate::error::{Result, ShardError};
use crate::progress::ProgressSink;
use crate::shutdown::Shutdown;

/// A snapshot type the waiter can drive to readiness.
#[async_trait]
pub trait Waitable: ResourceIdentity + Clone + Send + Sync + Sized {
    type Status: PartialEq + fmt::Display + Send + Sync;

    const READY: Self::Status;
    const ERROR: Self::Status;

    fn status(&self) -> &Self::Status;

    /// Failure detail reported alongside the error status, if any.
    fn fault(&self) -> Option<String> {
        None
    }

    /// Re-fetch the resource by id.
    async fn fetch(control_plane: &dyn ControlPlane, id: &str) -> anyhow::Result<Self>;
}

#[async_trait]
impl Waitable for VolumeSnapshot {
    type Status = VolumeStatus;

    const READY: VolumeStatus = VolumeStatus::Available;
    const ERROR: VolumeStatus = VolumeStatus::Error;

    fn status(&self) -> &VolumeStatus {
        &self.status
    }

    async fn fetch(control_plane: &dyn ControlPlane, id: &str) -> anyhow::Result<Self> {
        control_plane.get_volume(id).await
    }
}

#[async_trait]
impl Waitable for ServerSnapshot {
    type Status = ServerStatus;

    const READY: ServerStatus = ServerStatus::Active;
    const ERROR: ServerStatus = ServerStatus::Error;

    fn status(&self) -> &ServerStatus {
        &self.status
    }

    fn fault(&self) -> Option<String> {
        self.fault.as_ref().map(|f| f.message.clone())
    }

    async fn fetch(control_plane: &dyn ControlPlane, id: &str) -> anyhow::Result<Self> {
        control_plane.get_server(id).await
    }
}

#[async_trait]
impl Waitable for NetworkSnapshot {
    type Status = NetworkStatus;

    const READY: NetworkStatus = NetworkStatus::Active;
    const ERROR: NetworkStatus = NetworkStatus::Error;

    fn status(&self) -> &NetworkStatus {
        &self.status
    }

    async fn fetch(control_plane: &dyn ControlPlane, id: &str) -> anyhow::Result<Self> {
        control_plane.get_network(id).await
    }
}

/// Result of one waiter invocation. Exactly one variant per wait; each
/// carries the last snapshot observed.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome<S> {
    Ready {
        snapshot: S,
        elapsed: Duration,
    },
    Errored {
        snapshot: S,
        fault: Option<String>,
        elapsed: Duration,
    },
    TimedOut {
        snapshot: S,
        elapsed: Duration,
    },
    Cancelled {
        snapshot: S,
        elapsed: Duration,
    },
}

impl<S> WaitOutcome<S> {
    /// Outcome for kinds whose create call completes synchronously.
    pub fn immediate(snapshot: S) -> Self {
        WaitOutcome::Ready {
            snapshot,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            WaitOutcome::Ready { elapsed, .. }
            | WaitOutcome::Errored { elapsed, .. }
            | WaitOutcome::TimedOut { elapsed, .. }
            | WaitOutcome::Cancelled { elapsed, .. } => *elapsed,
        }
    }

    pub fn snapshot(&self) -> &S {
        match self {
            WaitOutcome::Ready { snapshot, .. }
            | WaitOutcome::Errored { snapshot, .. }
            | WaitOutcome::TimedOut { snapshot, .. }
            | WaitOutcome::Cancelled { snapshot, .. } => snapshot,
        }
    }

    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> WaitOutcome<T> {
        match self {
            WaitOutcome::Ready { snapshot, elapsed } => WaitOutcome::Ready {
                snapshot: f(snapshot),
                elapsed,
            },
            WaitOutcome::Errored {
                snapshot,
                fault,
                elapsed,
            } => WaitOutcome::Errored {
                snapshot: f(snapshot),
                fault,
                elapsed,
            },
            WaitOutcome::TimedOut { snapshot, elapsed } => WaitOutcome::TimedOut {
                snapshot: f(snapshot),
                elapsed,
            },
            WaitOutcome::Cancelled { snapshot, elapsed } => WaitOutcome::Cancelled {
                snapshot: f(snapshot),
                elapsed,
            },
        }
    }
}

impl<S: ResourceIdentity> WaitOutcome<S> {
    /// Ready becomes `Ok`; every other outcome becomes its distinct error.
    pub fn into_result(self) -> Result<S> {
        match self {
            WaitOutcome::Ready { snapshot, .. } => Ok(snapshot),
            WaitOutcome::Errored {
                snapshot, fault, ..
            } => Err(ShardError::Resource {
                kind: snapshot.kind(),
                name: snapshot.name().to_string(),
                id: snapshot.id().to_string(),
                fault,
            }),
            WaitOutcome::TimedOut { snapshot, elapsed } => Err(ShardError::Timeout {
                kind: snapshot.kind(),
                name: snapshot.name().to_string(),
                id: snapshot.id().to_string(),
                elapsed,
            }),
            WaitOutcome::Cancelled { snapshot, elapsed } => Err(ShardError::Cancelled {
                kind: snapshot.kind(),
                name: snapshot.name().to_string(),
                id: snapshot.id().to_string(),
                elapsed,
            }),
        }
    }
}

/// Blocking poll loop for one freshly created resource.
pub struct ReadinessWaiter<'a> {
    progress: &'a dyn ProgressSink,
    correlation_id: &'a str,
    budget: WaitBudget,
    shutdown: Shutdown,
}

impl<'a> ReadinessWaiter<'a> {
    pub fn new(
        progress: &'a dyn ProgressSink,
        correlation_id: &'a str,
        budget: WaitBudget,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            progress,
            correlation_id,
            budget,
            shutdown,
        }
    }

    fn notify(&self, message: &str) {
        self.progress.send_console_update(self.correlation_id, message);
    }

    /// Poll until `initial` (or a refreshed copy) reaches `S::READY`.
    ///
    /// The deadline is wall-clock from this call. Timeout is checked
    /// before the error status on each iteration, and both are checked
    /// before sleeping, so an already failed resource is reported without
    /// another poll. `Err` is returned only when a refresh call itself
    /// fails.
    pub async fn wait_until_ready<S, F, Fut>(
        &self,
        initial: S,
        mut refresh: F,
    ) -> Result<WaitOutcome<S>>
    where
        S: Waitable,
        F: FnMut(String) -> Fut,
        Fut: Future<Output = anyhow::Result<S>>,
    {
        let start = Instant::now();
        let kind = initial.kind();
        let mut current = initial;

        self.notify(&format!(
            "Creating {}: {} [{}]...",
            kind,
            current.name(),
            current.id()
        ));

        while *current.status() != S::READY {
            let elapsed = start.elapsed();

            if elapsed > self.budget.timeout() {
                self.notify(&format!(
                    "{} {} [{}] Not Available After: {} Seconds",
                    kind,
                    current.name(),
                    current.id(),
                    self.budget.timeout_seconds
                ));
                warn!(
                    kind = %kind,
                    name = %current.name(),
                    id = %current.id(),
                    status = %current.status(),
                    elapsed_secs = elapsed.as_secs(),
                    "Readiness wait timed out"
                );
                return Ok(WaitOutcome::TimedOut {
                    snapshot: current,
                    elapsed,
                });
            }

            if *current.status() == S::ERROR {
                let fault = current.fault();
                self.notify(&format!(
                    "{} {} [{}] entered ERROR state: {}",
                    kind,
                    current.name(),
                    current.id(),
                    fault.as_deref().unwrap_or("")
                ));
                warn!(
                    kind = %kind,
                    name = %current.name(),
                    id = %current.id(),
                    fault = fault.as_deref().unwrap_or(""),
                    "Resource entered error state"
                );
                return Ok(WaitOutcome::Errored {
                    snapshot: current,
                    fault,
                    elapsed,
                });
            }

            self.notify(&format!(
                "Waiting for {} {} [{}] To Become Available... ({}s) - {}",
                kind,
                current.name(),
                current.id(),
                elapsed.as_secs(),
                current.status()
            ));

            tokio::select! {
                biased;
                _ = self.shutdown.triggered() => {
                    let elapsed = start.elapsed();
                    self.notify(&format!(
                        "{} {} [{}] Wait Cancelled After ({}) Seconds",
                        kind,
                        current.name(),
                        current.id(),
                        elapsed.as_secs()
                    ));
                    info!(kind = %kind, id = %current.id(), "Readiness wait cancelled by shutdown");
                    return Ok(WaitOutcome::Cancelled {
                        snapshot: current,
                        elapsed,
                    });
                }
                _ = tokio::time::sleep(self.budget.poll_interval()) => {}
            }

            let id = current.id().to_string();
            debug!(kind = %kind, id = %id, "Refreshing resource status");
            current = refresh(id.clone()).await.map_err(|e| {
                ShardError::control_plane(format!("Refresh {} {}", kind, id), e)
            })?;
        }

        let elapsed = start.elapsed();
        self.notify(&format!(
            "{} {} [{}] Was Built After ({}) Seconds",
            kind,
            current.name(),
            current.id(),
            elapsed.as_secs()
        ));
        info!(
            kind = %kind,
            name = %current.name(),
            id = %current.id(),
            elapsed_secs = elapsed.as_secs(),
            "Resource ready"
        );

        Ok(WaitOutcome::Ready {
            snapshot: current,
            elapsed,
        })
    }
}

/// Wait for `initial` using the control plane of `ctx` for refreshes.
pub async fn await_ready<S: Waitable>(
    ctx: &ClientContext,
    correlation_id: &str,
    budget: WaitBudget,
    initial: S,
    shutdown: &Shutdown,
) -> Result<WaitOutcome<S>> {
    let control_plane = ctx.control_plane();
    ReadinessWaiter::new(ctx.progress(), correlation_id, budget, shutdown.clone())
        .wait_until_ready(initial, |id| async move { S::fetch(control_plane, &id).await })
        .await
}
