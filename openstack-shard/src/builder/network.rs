use async_trait::async_trait;
use tracing::{debug, info};

use super::{ResolvedDependencies, ResourceBuilder, ResourceHandle};
use crate::context::ClientContext;
use crate::control_plane::{AllocationPool, CreateNetwork, CreateSubnet, NetworkSnapshot};
use crate::descriptor::{NetworkSpec, ResourceKind};
use crate::error::{Result, ShardError};
use crate::shutdown::Shutdown;
use crate::waiter::{self, WaitOutcome};

const PRIORITY: u32 = 0;

/// Network plus one DHCP-enabled IPv4 subnet.
pub struct NetworkBuilder {
    spec: NetworkSpec,
}

impl NetworkBuilder {
    pub fn new(spec: NetworkSpec) -> Self {
        Self { spec }
    }

    fn subnet_request(&self, network_id: &str) -> CreateSubnet {
        CreateSubnet {
            name: format!("{}-Subnet", self.spec.name),
            network_id: network_id.to_string(),
            enable_dhcp: true,
            allocation_pools: vec![AllocationPool {
                start: self.spec.pool_start,
                end: self.spec.pool_end,
            }],
            ip_version: 4,
            cidr: self.spec.cidr.clone(),
            gateway_ip: self.spec.gateway,
        }
    }
}

#[async_trait]
impl ResourceBuilder for NetworkBuilder {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Network
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
        let network = ctx
            .control_plane()
            .create_network(&CreateNetwork {
                name: self.spec.name.clone(),
                admin_state_up: true,
            })
            .await
            .map_err(|e| {
                ShardError::control_plane(format!("Create network {}", self.spec.name), e)
            })?;

        debug!(
            network = %network.name,
            id = %network.id,
            cidr = %self.spec.cidr,
            "Creating subnet"
        );
        let subnet = ctx
            .control_plane()
            .create_subnet(&self.subnet_request(&network.id))
            .await
            .map_err(|e| {
                ShardError::control_plane(
                    format!("Create subnet for network {}", self.spec.name),
                    e,
                )
            })?;

        let mut subnets = network.subnets;
        subnets.push(subnet.id);
        let network = NetworkSnapshot { subnets, ..network };

        info!(
            name = %network.name,
            id = %network.id,
            subnets = ?network.subnets,
            "Network created"
        );
        Ok(ResourceHandle::Network(network))
    }

    async fn await_ready(
        &self,
        ctx: &ClientContext,
        handle: ResourceHandle,
        shutdown: &Shutdown,
    ) -> Result<WaitOutcome<ResourceHandle>> {
        let network = match handle {
            ResourceHandle::Network(network) => network,
            other => return Err(super::wrong_handle(ResourceKind::Network, &other)),
        };
        let subnets = network.subnets.clone();
        let outcome = waiter::await_ready(
            ctx,
            self.correlation_id(),
            ctx.waits().network,
            network,
            shutdown,
        )
        .await?;
        // Keep the subnet we attached if the refreshed copy does not list it yet.
        Ok(outcome.map(|mut refreshed| {
            for subnet in subnets {
                if !refreshed.subnets.contains(&subnet) {
                    refreshed.subnets.push(subnet);
                }
            }
            ResourceHandle::Network(refreshed)
        }))
    }
}
