use std::sync::Arc;

use crate::config::WaitSettings;
use crate::control_plane::ControlPlane;
use crate::progress::ProgressSink;

/// Read-only state shared by every builder and waiter of a run.
///
/// Cloning is cheap; all clones talk to the same control plane.
#[derive(Clone)]
pub struct ClientContext {
    control_plane: Arc<dyn ControlPlane>,
    progress: Arc<dyn ProgressSink>,
    waits: WaitSettings,
}

impl ClientContext {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        progress: Arc<dyn ProgressSink>,
        waits: WaitSettings,
    ) -> Self {
        Self {
            control_plane,
            progress,
            waits,
        }
    }

    pub fn control_plane(&self) -> &dyn ControlPlane {
        self.control_plane.as_ref()
    }

    pub fn progress(&self) -> &dyn ProgressSink {
        self.progress.as_ref()
    }

    pub fn waits(&self) -> &WaitSettings {
        &self.waits
    }
}
