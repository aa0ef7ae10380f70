//! Builders of one run, keyed by (kind, name), with per-slot build state.
//!
//! Each slot is a `watch` channel so an engine can await a dependency
//! without polling the registry. Slots move Pending -> Building -> Ready or
//! Failed and never go back.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::builder::{
    NetworkBuilder, ResolvedDependencies, ResourceBuilder, ResourceHandle, ResourceKey,
    RouterBuilder, SecurityGroupBuilder, SecurityGroupRuleBuilder, ServerBuilder, VolumeBuilder,
};
use crate::context::ClientContext;
use crate::descriptor::Blueprint;
use crate::error::{Result, ShardError};
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    Pending,
    Building,
    Ready(ResourceHandle),
    Failed(String),
}

impl SlotState {
    pub fn is_settled(&self) -> bool {
        matches!(self, SlotState::Ready(_) | SlotState::Failed(_))
    }
}

#[derive(Default)]
pub struct BuildRegistry {
    builders: Vec<Arc<dyn ResourceBuilder>>,
    slots: HashMap<ResourceKey, watch::Sender<SlotState>>,
}

impl BuildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One builder per descriptor. Fails on duplicate names within a kind
    /// or on a dependency that names no descriptor.
    pub fn from_blueprint(blueprint: &Blueprint) -> Result<Self> {
        let mut registry = Self::new();
        for spec in &blueprint.networks {
            registry.register(Arc::new(NetworkBuilder::new(spec.clone())))?;
        }
        for spec in &blueprint.security_groups {
            registry.register(Arc::new(SecurityGroupBuilder::new(spec.clone())))?;
        }
        for spec in &blueprint.security_group_rules {
            registry.register(Arc::new(SecurityGroupRuleBuilder::new(spec.clone())))?;
        }
        for spec in &blueprint.volumes {
            registry.register(Arc::new(VolumeBuilder::new(spec.clone())))?;
        }
        for spec in &blueprint.routers {
            registry.register(Arc::new(RouterBuilder::new(spec.clone())))?;
        }
        for spec in &blueprint.hosts {
            registry.register(Arc::new(ServerBuilder::new(spec.clone())))?;
        }
        registry.validate()?;
        Ok(registry)
    }

    pub fn register(&mut self, builder: Arc<dyn ResourceBuilder>) -> Result<()> {
        let key = builder.key();
        if self.slots.contains_key(&key) {
            return Err(ShardError::Configuration(format!("Duplicate descriptor {}", key)));
        }
        let (tx, _rx) = watch::channel(SlotState::Pending);
        self.slots.insert(key, tx);
        self.builders.push(builder);
        Ok(())
    }

    /// Check every declared dependency names a registered descriptor.
    pub fn validate(&self) -> Result<()> {
        let mut unknown = Vec::new();
        for builder in &self.builders {
            for dep in builder.dependencies() {
                if !self.slots.contains_key(&dep) {
                    unknown.push(format!("{} requires unknown {}", builder.key(), dep));
                }
            }
        }
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(ShardError::Configuration(unknown.join("; ")))
        }
    }

    /// Builders in registration order.
    pub fn builders(&self) -> &[Arc<dyn ResourceBuilder>] {
        &self.builders
    }

    /// Builders sorted by priority; equal priorities keep registration order.
    pub fn in_priority_order(&self) -> Vec<Arc<dyn ResourceBuilder>> {
        let mut ordered = self.builders.clone();
        ordered.sort_by_key(|b| b.priority());
        ordered
    }

    pub fn builder(&self, key: &ResourceKey) -> Option<Arc<dyn ResourceBuilder>> {
        self.builders.iter().find(|b| &b.key() == key).cloned()
    }

    /// Current state of a slot.
    pub fn lookup(&self, key: &ResourceKey) -> Option<SlotState> {
        self.slots.get(key).map(|tx| tx.borrow().clone())
    }

    pub fn subscribe(&self, key: &ResourceKey) -> Option<watch::Receiver<SlotState>> {
        self.slots.get(key).map(|tx| tx.subscribe())
    }

    /// Wait until the slot is Ready or Failed.
    pub async fn settled(&self, key: &ResourceKey) -> Result<SlotState> {
        let mut rx = self.subscribe(key).ok_or_else(|| unknown_key(key))?;
        let state = rx
            .wait_for(SlotState::is_settled)
            .await
            .map_err(|_| ShardError::Dependency(format!("{} slot closed", key)))?;
        Ok(state.clone())
    }

    pub(crate) fn mark_ready(&self, key: &ResourceKey, handle: ResourceHandle) -> Result<()> {
        self.settle(key, SlotState::Ready(handle))
    }

    pub(crate) fn mark_failed(&self, key: &ResourceKey, reason: impl Into<String>) -> Result<()> {
        self.settle(key, SlotState::Failed(reason.into()))
    }

    /// Handles of every dependency of `builder`. All must be Ready.
    pub fn resolve_dependencies(
        &self,
        builder: &dyn ResourceBuilder,
    ) -> Result<ResolvedDependencies> {
        let mut resolved = ResolvedDependencies::new();
        for dep in builder.dependencies() {
            match self.lookup(&dep) {
                Some(SlotState::Ready(handle)) => resolved.insert(dep, handle),
                Some(SlotState::Failed(reason)) => {
                    return Err(ShardError::Dependency(format!(
                        "{} cannot be built: {} failed: {}",
                        builder.key(),
                        dep,
                        reason
                    )))
                }
                Some(_) => {
                    return Err(ShardError::Dependency(format!(
                        "{} cannot be built: {} is not ready",
                        builder.key(),
                        dep
                    )))
                }
                None => return Err(unknown_key(&dep)),
            }
        }
        Ok(resolved)
    }

    fn slot(&self, key: &ResourceKey) -> Result<&watch::Sender<SlotState>> {
        self.slots.get(key).ok_or_else(|| unknown_key(key))
    }

    /// Pending -> Building. Returns false if the slot was already claimed.
    fn claim(&self, key: &ResourceKey) -> Result<bool> {
        Ok(self.slot(key)?.send_if_modified(|state| {
            if *state == SlotState::Pending {
                *state = SlotState::Building;
                true
            } else {
                false
            }
        }))
    }

    /// Building -> Ready or Failed. A slot in any other state is left as is.
    fn settle(&self, key: &ResourceKey, next: SlotState) -> Result<()> {
        let settled = self.slot(key)?.send_if_modified(move |state| {
            if *state == SlotState::Building {
                *state = next;
                true
            } else {
                false
            }
        });
        if settled {
            Ok(())
        } else {
            Err(ShardError::Dependency(format!("{} is not being built", key)))
        }
    }
}

fn unknown_key(key: &ResourceKey) -> ShardError {
    ShardError::Dependency(format!("{} is not registered", key))
}

/// One resource's full unit of work: resolve dependencies, create, wait,
/// and record the outcome in its slot.
///
/// Dependencies must already be Ready; nothing is created otherwise and
/// the slot stays Pending. A slot is built at most once. If the returned
/// future is dropped before it finishes, the slot is marked Failed.
pub async fn provision_resource(
    ctx: &ClientContext,
    registry: &BuildRegistry,
    key: &ResourceKey,
    shutdown: &Shutdown,
) -> Result<ResourceHandle> {
    let builder = registry.builder(key).ok_or_else(|| unknown_key(key))?;
    let deps = registry.resolve_dependencies(builder.as_ref())?;

    if !registry.claim(key)? {
        return Err(ShardError::Dependency(format!(
            "{} has already been started",
            key
        )));
    }

    let unfinished = scopeguard::guard((), |_| {
        warn!(resource = %key, "Provisioning dropped before completion");
        let _ = registry.mark_failed(key, "cancelled");
    });

    info!(
        resource = %key,
        priority = builder.priority(),
        deps = deps.len(),
        "Provisioning resource"
    );
    let result = async {
        let handle = builder.create(ctx, &deps).await?;
        builder
            .await_ready(ctx, handle, shutdown)
            .await?
            .into_result()
    }
    .await;
    scopeguard::ScopeGuard::into_inner(unfinished);

    match result {
        Ok(handle) => {
            registry.mark_ready(key, handle.clone())?;
            Ok(handle)
        }
        Err(e) => {
            error!(resource = %key, error = %e, "Provisioning failed");
            registry.mark_failed(key, e.to_string())?;
            Err(e)
        }
    }
}
