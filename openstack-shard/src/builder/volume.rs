use async_trait::async_trait;
use tracing::info;

use super::{ResolvedDependencies, ResourceBuilder, ResourceHandle};
use crate::context::ClientContext;
use crate::control_plane::CreateVolume;
use crate::descriptor::{ResourceKind, VolumeSpec};
use crate::error::{Result, ShardError};
use crate::shutdown::Shutdown;
use crate::waiter::{self, WaitOutcome};

const PRIORITY: u32 = 2;

/// Block-storage volume, optionally seeded from an image.
pub struct VolumeBuilder {
    spec: VolumeSpec,
}

impl VolumeBuilder {
    pub fn new(spec: VolumeSpec) -> Self {
        Self { spec }
    }

    fn request(&self) -> CreateVolume {
        CreateVolume {
            name: self.spec.name.clone(),
            description: self.spec.description.clone(),
            size: self.spec.size_gb,
            image_ref: self.spec.image_id.clone(),
            bootable: self.spec.bootable,
        }
    }
}

#[async_trait]
impl ResourceBuilder for VolumeBuilder {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Volume
    }

    fn name(&self) -> &str {
        &self.spec.name
    }

    fn correlation_id(&self) -> &str {
        &self.spec.range_id
    }

    fn priority(&self) -> u32 {
        PRIORITY
    }

    async fn create(
        &self,
        ctx: &ClientContext,
        _deps: &ResolvedDependencies,
    ) -> Result<ResourceHandle> {
        let volume = ctx
            .control_plane()
            .create_volume(&self.request())
            .await
            .map_err(|e| {
                ShardError::control_plane(format!("Create volume {}", self.spec.name), e)
            })?;

        info!(
            name = %self.spec.name,
            id = %volume.id,
            size_gb = self.spec.size_gb,
            bootable = self.spec.bootable,
            "Volume create accepted"
        );
        Ok(ResourceHandle::Volume(volume))
    }

    async fn await_ready(
        &self,
        ctx: &ClientContext,
        handle: ResourceHandle,
        shutdown: &Shutdown,
    ) -> Result<WaitOutcome<ResourceHandle>> {
        let volume = match handle {
            ResourceHandle::Volume(volume) => volume,
            other => return Err(super::wrong_handle(ResourceKind::Volume, &other)),
        };
        let outcome =
            waiter::await_ready(ctx, self.correlation_id(), ctx.waits().volume, volume, shutdown)
                .await?;
        Ok(outcome.map(ResourceHandle::Volume))
    }
}
