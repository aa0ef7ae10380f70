//! Security groups and their rules. Both are complete when the create
//! call returns, so neither waits.

use async_trait::async_trait;
use tracing::info;

use super::{ResolvedDependencies, ResourceBuilder, ResourceHandle, ResourceKey};
use crate::context::ClientContext;
use crate::control_plane::{CreateSecurityGroup, CreateSecurityGroupRule};
use crate::descriptor::{ResourceKind, SecurityGroupRuleSpec, SecurityGroupSpec};
use crate::error::{Result, ShardError};
use crate::shutdown::Shutdown;
use crate::waiter::WaitOutcome;

const GROUP_PRIORITY: u32 = 4;
const RULE_PRIORITY: u32 = 5;

pub struct SecurityGroupBuilder {
    spec: SecurityGroupSpec,
}

impl SecurityGroupBuilder {
    pub fn new(spec: SecurityGroupSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl ResourceBuilder for SecurityGroupBuilder {
    fn kind(&self) -> ResourceKind {
        ResourceKind::SecurityGroup
    }

    fn name(&self) -> &str {
        &self.spec.name
    }

    fn correlation_id(&self) -> &str {
        &self.spec.range_id
    }

    fn priority(&self) -> u32 {
        GROUP_PRIORITY
    }

    async fn create(
        &self,
        ctx: &ClientContext,
        _deps: &ResolvedDependencies,
    ) -> Result<ResourceHandle> {
        let group = ctx
            .control_plane()
            .create_security_group(&CreateSecurityGroup {
                name: self.spec.name.clone(),
                description: self.spec.description.clone(),
            })
            .await
            .map_err(|e| {
                ShardError::control_plane(format!("Create security group {}", self.spec.name), e)
            })?;

        info!(name = %group.name, id = %group.id, "Security group created");
        Ok(ResourceHandle::SecurityGroup(group))
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

pub struct SecurityGroupRuleBuilder {
    spec: SecurityGroupRuleSpec,
}

impl SecurityGroupRuleBuilder {
    pub fn new(spec: SecurityGroupRuleSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl ResourceBuilder for SecurityGroupRuleBuilder {
    fn kind(&self) -> ResourceKind {
        ResourceKind::SecurityGroupRule
    }

    fn name(&self) -> &str {
        &self.spec.name
    }

    fn correlation_id(&self) -> &str {
        &self.spec.range_id
    }

    fn priority(&self) -> u32 {
        RULE_PRIORITY
    }

    fn dependencies(&self) -> Vec<ResourceKey> {
        vec![ResourceKey::new(
            ResourceKind::SecurityGroup,
            &self.spec.security_group,
        )]
    }

    async fn create(
        &self,
        ctx: &ClientContext,
        deps: &ResolvedDependencies,
    ) -> Result<ResourceHandle> {
        let group = deps.security_group(&self.spec.security_group)?;

        let rule = ctx
            .control_plane()
            .create_security_group_rule(&CreateSecurityGroupRule {
                security_group_id: group.id.clone(),
                direction: self.spec.direction,
                ethertype: self.spec.ether_type,
                protocol: self.spec.protocol.clone(),
                port_range_min: self.spec.port_range_min,
                port_range_max: self.spec.port_range_max,
            })
            .await
            .map_err(|e| {
                ShardError::control_plane(
                    format!("Create security group rule {}", self.spec.name),
                    e,
                )
            })?;

        info!(
            name = %self.spec.name,
            id = %rule.id,
            group = %group.name,
            protocol = %self.spec.protocol,
            ports = %format!("{}-{}", self.spec.port_range_min, self.spec.port_range_max),
            "Security group rule created"
        );
        Ok(ResourceHandle::SecurityGroupRule(rule))
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
