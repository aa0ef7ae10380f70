use async_trait::async_trait;
use tracing::{debug, info};

use super::{ResolvedDependencies, ResourceBuilder, ResourceHandle, ResourceKey};
use crate::context::ClientContext;
use crate::control_plane::{CreateRouter, RouterSnapshot};
use crate::descriptor::{ResourceKind, RouterSpec};
use crate::error::{Result, ShardError};
use crate::shutdown::Shutdown;
use crate::waiter::WaitOutcome;

const PRIORITY: u32 = 1;

/// Router with one interface on the first subnet of each listed network.
pub struct RouterBuilder {
    spec: RouterSpec,
}

impl RouterBuilder {
    pub fn new(spec: RouterSpec) -> Self {
        Self { spec }
    }

    /// First subnet of every network, in declared order.
    fn subnet_ids(&self, deps: &ResolvedDependencies) -> Result<Vec<String>> {
        self.spec
            .networks
            .iter()
            .map(|name| {
                let network = deps.network(name)?;
                network.subnets.first().cloned().ok_or_else(|| {
                    ShardError::Dependency(format!(
                        "Network {} [{}] has no subnet to attach to router {}",
                        network.name, network.id, self.spec.name
                    ))
                })
            })
            .collect()
    }
}

#[async_trait]
impl ResourceBuilder for RouterBuilder {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Router
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
        self.spec
            .networks
            .iter()
            .map(|name| ResourceKey::new(ResourceKind::Network, name))
            .collect()
    }

    async fn create(
        &self,
        ctx: &ClientContext,
        deps: &ResolvedDependencies,
    ) -> Result<ResourceHandle> {
        // Resolve everything up front so a bad dependency leaves no router behind.
        let subnets = self.subnet_ids(deps)?;

        let router = ctx
            .control_plane()
            .create_router(&CreateRouter {
                name: self.spec.name.clone(),
                admin_state_up: true,
                external_gateway_info: None,
            })
            .await
            .map_err(|e| {
                ShardError::control_plane(format!("Create router {}", self.spec.name), e)
            })?;

        let mut attached = router.attached_subnets.clone();
        for subnet_id in subnets {
            debug!(router = %router.id, subnet = %subnet_id, "Attaching router interface");
            ctx.control_plane()
                .attach_router_subnet(&router.id, &subnet_id)
                .await
                .map_err(|e| {
                    ShardError::control_plane(
                        format!("Attach subnet {} to router {}", subnet_id, self.spec.name),
                        e,
                    )
                })?;
            attached.push(subnet_id);
        }

        info!(name = %router.name, id = %router.id, subnets = ?attached, "Router created");
        Ok(ResourceHandle::Router(RouterSnapshot {
            attached_subnets: attached,
            ..router
        }))
    }

    async fn await_ready(
        &self,
        _ctx: &ClientContext,
        handle: ResourceHandle,
        _shutdown: &Shutdown,
    ) -> Result<WaitOutcome<ResourceHandle>> {
        Ok(WaitOutcome::immediate(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::test_support::fake_context;
    use crate::control_plane::fake::Call;
    use crate::control_plane::{NetworkSnapshot, NetworkStatus};

    fn spec(networks: &[&str]) -> RouterSpec {
        RouterSpec {
            name: "edge".to_string(),
            range_id: "range-1".to_string(),
            networks: networks.iter().map(|n| n.to_string()).collect(),
        }
    }

    fn resolve(deps: &mut ResolvedDependencies, name: &str, subnets: &[&str]) {
        deps.insert(
            ResourceKey::new(ResourceKind::Network, name),
            ResourceHandle::Network(NetworkSnapshot {
                id: format!("{}-id", name),
                name: name.to_string(),
                status: NetworkStatus::Active,
                subnets: subnets.iter().map(|s| s.to_string()).collect(),
            }),
        );
    }

    #[tokio::test]
    async fn test_dependencies_follow_declared_networks() {
        let builder = RouterBuilder::new(spec(&["a", "b"]));
        assert_eq!(builder.priority(), 1);
        assert_eq!(
            builder.dependencies(),
            vec![
                ResourceKey::new(ResourceKind::Network, "a"),
                ResourceKey::new(ResourceKind::Network, "b"),
            ]
        );
    }

    #[tokio::test]
    async fn test_attaches_first_subnet_of_each_network_in_order() {
        let (fake, ctx) = fake_context();
        let mut deps = ResolvedDependencies::new();
        resolve(&mut deps, "a", &["sub-a1", "sub-a2"]);
        resolve(&mut deps, "b", &["sub-b1"]);

        let handle = RouterBuilder::new(spec(&["a", "b"]))
            .create(&ctx, &deps)
            .await
            .unwrap();

        let calls = fake.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0],
            Call::CreateRouter(CreateRouter {
                name: "edge".to_string(),
                admin_state_up: true,
                external_gateway_info: None,
            })
        );
        assert_eq!(
            calls[1..],
            [
                Call::AttachRouterSubnet {
                    router_id: "rtr-1".to_string(),
                    subnet_id: "sub-a1".to_string(),
                },
                Call::AttachRouterSubnet {
                    router_id: "rtr-1".to_string(),
                    subnet_id: "sub-b1".to_string(),
                },
            ]
        );

        let ResourceHandle::Router(router) = handle else {
            panic!("expected router handle");
        };
        assert_eq!(router.attached_subnets, vec!["sub-a1", "sub-b1"]);
    }

    #[tokio::test]
    async fn test_network_without_subnet_creates_nothing() {
        let (fake, ctx) = fake_context();
        let mut deps = ResolvedDependencies::new();
        resolve(&mut deps, "a", &["sub-a1"]);
        resolve(&mut deps, "b", &[]);

        let err = RouterBuilder::new(spec(&["a", "b"]))
            .create(&ctx, &deps)
            .await
            .unwrap_err();

        assert!(matches!(err, ShardError::Dependency(_)));
        assert!(err.to_string().contains("has no subnet"), "{}", err);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_router_without_networks_is_valid() {
        let (fake, ctx) = fake_context();
        let handle = RouterBuilder::new(spec(&[]))
            .create(&ctx, &ResolvedDependencies::new())
            .await
            .unwrap();

        assert_eq!(fake.calls().len(), 1);
        let outcome = RouterBuilder::new(spec(&[]))
            .await_ready(&ctx, handle, &Shutdown::never())
            .await
            .unwrap();
        assert!(outcome.is_ready());
    }
}
