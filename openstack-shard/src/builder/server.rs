use async_trait::async_trait;
use tracing::{debug, info};

use super::{ResolvedDependencies, ResourceBuilder, ResourceHandle, ResourceKey};
use crate::context::ClientContext;
use crate::control_plane::{BlockDeviceMapping, CreateServer, NetworkAttachment};
use crate::descriptor::{HostSpec, ResourceKind};
use crate::error::{Result, ShardError};
use crate::shutdown::Shutdown;
use crate::user_data;
use crate::waiter::{self, WaitOutcome};

const PRIORITY: u32 = 10;

/// Compute instance booted from its dependency volumes.
pub struct ServerBuilder {
    spec: HostSpec,
}

impl ServerBuilder {
    pub fn new(spec: HostSpec) -> Self {
        Self { spec }
    }

    /// Build the create request from resolved volumes and networks.
    pub fn server_request(&self, deps: &ResolvedDependencies) -> Result<CreateServer> {
        let block_device_mapping_v2 = self
            .spec
            .volumes
            .iter()
            .map(|name| Ok(BlockDeviceMapping::root_volume(&deps.volume(name)?.id)))
            .collect::<Result<Vec<_>>>()?;

        let networks = self
            .spec
            .networks
            .iter()
            .map(|name| {
                Ok(NetworkAttachment {
                    uuid: deps.network(name)?.id.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let user_data = user_data::for_host(
            &self.spec.os_type,
            &self.spec.default_user,
            &self.spec.default_password,
        );
        if user_data.is_none() && !self.spec.os_type.is_empty() {
            debug!(
                host = %self.spec.name,
                os_type = %self.spec.os_type,
                "No user data for OS type"
            );
        }

        Ok(CreateServer {
            name: self.spec.name.clone(),
            image_ref: self.spec.image_id.clone(),
            flavor_ref: self.spec.flavor_id.clone(),
            config_drive: true,
            user_data,
            block_device_mapping_v2,
            networks,
        })
    }
}

#[async_trait]
impl ResourceBuilder for ServerBuilder {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Server
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

    fn dependencies(&self) -> Vec<ResourceKey> {
        let networks = self
            .spec
            .networks
            .iter()
            .map(|name| ResourceKey::new(ResourceKind::Network, name));
        let volumes = self
            .spec
            .volumes
            .iter()
            .map(|name| ResourceKey::new(ResourceKind::Volume, name));
        networks.chain(volumes).collect()
    }

    async fn create(
        &self,
        ctx: &ClientContext,
        deps: &ResolvedDependencies,
    ) -> Result<ResourceHandle> {
        let request = self.server_request(deps)?;

        let server = ctx
            .control_plane()
            .create_server(&request)
            .await
            .map_err(|e| {
                ShardError::control_plane(format!("Create instance {}", self.spec.name), e)
            })?;

        info!(
            name = %self.spec.name,
            id = %server.id,
            flavor = %self.spec.flavor_id,
            volumes = request.block_device_mapping_v2.len(),
            networks = request.networks.len(),
            "Instance create accepted"
        );
        Ok(ResourceHandle::Server(server))
    }

    async fn await_ready(
        &self,
        ctx: &ClientContext,
        handle: ResourceHandle,
        shutdown: &Shutdown,
    ) -> Result<WaitOutcome<ResourceHandle>> {
        let server = match handle {
            ResourceHandle::Server(server) => server,
            other => return Err(super::wrong_handle(ResourceKind::Server, &other)),
        };
        let outcome =
            waiter::await_ready(ctx, self.correlation_id(), ctx.waits().instance, server, shutdown)
                .await?;
        Ok(outcome.map(ResourceHandle::Server))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::test_support::fake_context;
    use crate::control_plane::fake::Call;
    use crate::control_plane::{
        NetworkSnapshot, NetworkStatus, ServerStatus, VolumeSnapshot, VolumeStatus,
    };

    fn spec(os_type: &str) -> HostSpec {
        HostSpec {
            name: "web".to_string(),
            range_id: "range-1".to_string(),
            image_id: "img-ubuntu".to_string(),
            flavor_id: "m1.small".to_string(),
            os_type: os_type.to_string(),
            default_user: "ubuntu".to_string(),
            default_password: "pw".to_string(),
            networks: vec!["lab".to_string()],
            volumes: vec!["root".to_string(), "data".to_string()],
        }
    }

    fn resolved() -> ResolvedDependencies {
        let mut deps = ResolvedDependencies::new();
        deps.insert(
            ResourceKey::new(ResourceKind::Network, "lab"),
            ResourceHandle::Network(NetworkSnapshot {
                id: "net-7".to_string(),
                name: "lab".to_string(),
                status: NetworkStatus::Active,
                subnets: vec!["sub-8".to_string()],
            }),
        );
        for (name, id) in [("root", "vol-3"), ("data", "vol-4")] {
            deps.insert(
                ResourceKey::new(ResourceKind::Volume, name),
                ResourceHandle::Volume(VolumeSnapshot {
                    id: id.to_string(),
                    name: Some(name.to_string()),
                    status: VolumeStatus::Available,
                    size: 10,
                }),
            );
        }
        deps
    }

    #[test]
    fn test_dependencies_are_networks_then_volumes() {
        let builder = ServerBuilder::new(spec("linux"));
        assert_eq!(builder.priority(), 10);
        assert_eq!(
            builder.dependencies(),
            vec![
                ResourceKey::new(ResourceKind::Network, "lab"),
                ResourceKey::new(ResourceKind::Volume, "root"),
                ResourceKey::new(ResourceKind::Volume, "data"),
            ]
        );
    }

    #[test]
    fn test_request_maps_volumes_and_networks() {
        let request = ServerBuilder::new(spec("linux"))
            .server_request(&resolved())
            .unwrap();

        assert_eq!(request.name, "web");
        assert_eq!(request.image_ref, "img-ubuntu");
        assert_eq!(request.flavor_ref, "m1.small");
        assert!(request.config_drive);
        assert!(request.user_data.is_some());
        assert_eq!(
            request.block_device_mapping_v2,
            vec![
                BlockDeviceMapping::root_volume("vol-3"),
                BlockDeviceMapping::root_volume("vol-4"),
            ]
        );
        assert!(request
            .block_device_mapping_v2
            .iter()
            .all(|bdm| bdm.source_type == "volume"
                && bdm.destination_type == "volume"
                && bdm.delete_on_termination));
        assert_eq!(
            request.networks,
            vec![NetworkAttachment {
                uuid: "net-7".to_string()
            }]
        );
    }

    #[test]
    fn test_unrecognized_os_has_no_user_data() {
        let request = ServerBuilder::new(spec("plan9"))
            .server_request(&resolved())
            .unwrap();
        assert!(request.user_data.is_none());
        assert!(request.config_drive);
    }

    #[test]
    fn test_missing_volume_is_a_dependency_error() {
        let mut host = spec("linux");
        host.volumes.push("scratch".to_string());

        let err = ServerBuilder::new(host).server_request(&resolved()).unwrap_err();
        assert!(matches!(err, ShardError::Dependency(_)));
        assert!(err.to_string().contains("Volume 'scratch'"), "{}", err);
    }

    #[tokio::test(start_paused = true)]
    async fn test_instance_error_reports_fault() {
        let (fake, ctx) = fake_context();
        fake.script_server(vec![(ServerStatus::Error, Some("no valid host".to_string()))]);
        let builder = ServerBuilder::new(spec("linux"));

        let handle = builder.create(&ctx, &resolved()).await.unwrap();
        assert!(matches!(fake.calls()[0], Call::CreateServer(_)));

        let err = builder
            .await_ready(&ctx, handle, &Shutdown::never())
            .await
            .unwrap()
            .into_result()
            .unwrap_err();

        match err {
            ShardError::Resource { kind, fault, .. } => {
                assert_eq!(kind, ResourceKind::Server);
                assert_eq!(fault.as_deref(), Some("no valid host"));
            }
            other => panic!("expected resource error, got {other:?}"),
        }
        assert_eq!(fake.refresh_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_instance_becomes_active() {
        let (fake, ctx) = fake_context();
        fake.script_server(vec![
            (ServerStatus::Build, None),
            (ServerStatus::Build, None),
            (ServerStatus::Active, None),
        ]);
        let builder = ServerBuilder::new(spec("linux"));

        let handle = builder.create(&ctx, &resolved()).await.unwrap();
        let outcome = builder
            .await_ready(&ctx, handle, &Shutdown::never())
            .await
            .unwrap();

        assert!(outcome.is_ready());
        assert_eq!(outcome.elapsed(), std::time::Duration::from_secs(30));
        assert_eq!(fake.refresh_count(), 3);
    }
}
