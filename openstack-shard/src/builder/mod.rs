//! Per-kind resource builders.
//!
//! A builder turns one descriptor plus its resolved dependencies into a
//! single create call, and knows how (or whether) to wait for the result.
//! The external engine drives builders only through [`ResourceBuilder`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

use crate::context::ClientContext;
use crate::control_plane::{
    NetworkSnapshot, ResourceIdentity, RouterSnapshot, SecurityGroupRuleSnapshot,
    SecurityGroupSnapshot, ServerSnapshot, VolumeSnapshot,
};
use crate::descriptor::ResourceKind;
use crate::error::{Result, ShardError};
use crate::shutdown::Shutdown;
use crate::waiter::WaitOutcome;

pub mod network;
pub mod router;
pub mod security_group;
pub mod server;
pub mod volume;

pub use network::NetworkBuilder;
pub use router::RouterBuilder;
pub use security_group::{SecurityGroupBuilder, SecurityGroupRuleBuilder};
pub use server::ServerBuilder;
pub use volume::VolumeBuilder;

/// Identifies one descriptor within a run. Names are unique per kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

/// A created resource, as handed back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceHandle {
    Network(NetworkSnapshot),
    SecurityGroup(SecurityGroupSnapshot),
    SecurityGroupRule(SecurityGroupRuleSnapshot),
    Volume(VolumeSnapshot),
    Router(RouterSnapshot),
    Server(ServerSnapshot),
}

impl ResourceHandle {
    fn identity(&self) -> &dyn ResourceIdentity {
        match self {
            ResourceHandle::Network(s) => s,
            ResourceHandle::SecurityGroup(s) => s,
            ResourceHandle::SecurityGroupRule(s) => s,
            ResourceHandle::Volume(s) => s,
            ResourceHandle::Router(s) => s,
            ResourceHandle::Server(s) => s,
        }
    }
}

impl ResourceIdentity for ResourceHandle {
    fn kind(&self) -> ResourceKind {
        self.identity().kind()
    }

    fn id(&self) -> &str {
        self.identity().id()
    }

    fn name(&self) -> &str {
        self.identity().name()
    }
}

fn wrong_handle(expected: ResourceKind, found: &ResourceHandle) -> ShardError {
    ShardError::Dependency(format!(
        "expected a {} handle, got {} [{}]",
        expected,
        found.kind(),
        found.id()
    ))
}

/// Dependency handles that reached Ready, keyed by descriptor.
#[derive(Debug, Clone, Default)]
pub struct ResolvedDependencies {
    handles: HashMap<ResourceKey, ResourceHandle>,
}

impl ResolvedDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ResourceKey, handle: ResourceHandle) {
        self.handles.insert(key, handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    fn get(&self, kind: ResourceKind, name: &str) -> Result<&ResourceHandle> {
        let key = ResourceKey::new(kind, name);
        self.handles
            .get(&key)
            .ok_or_else(|| ShardError::Dependency(format!("{} has not been resolved", key)))
    }

    pub fn network(&self, name: &str) -> Result<&NetworkSnapshot> {
        match self.get(ResourceKind::Network, name)? {
            ResourceHandle::Network(network) => Ok(network),
            other => Err(wrong_handle(ResourceKind::Network, other)),
        }
    }

    pub fn volume(&self, name: &str) -> Result<&VolumeSnapshot> {
        match self.get(ResourceKind::Volume, name)? {
            ResourceHandle::Volume(volume) => Ok(volume),
            other => Err(wrong_handle(ResourceKind::Volume, other)),
        }
    }

    pub fn security_group(&self, name: &str) -> Result<&SecurityGroupSnapshot> {
        match self.get(ResourceKind::SecurityGroup, name)? {
            ResourceHandle::SecurityGroup(group) => Ok(group),
            other => Err(wrong_handle(ResourceKind::SecurityGroup, other)),
        }
    }
}

/// Capability set the external engine invokes for each descriptor.
#[async_trait]
pub trait ResourceBuilder: Send + Sync {
    fn kind(&self) -> ResourceKind;

    fn name(&self) -> &str;

    /// Correlation id for progress updates.
    fn correlation_id(&self) -> &str;

    /// Scheduling hint for the engine.
    fn priority(&self) -> u32;

    /// Descriptors that must be Ready before `create` runs.
    fn dependencies(&self) -> Vec<ResourceKey> {
        Vec::new()
    }

    fn key(&self) -> ResourceKey {
        ResourceKey::new(self.kind(), self.name())
    }

    /// Issue the create call(s). Control-plane rejections are returned as is.
    async fn create(&self, ctx: &ClientContext, deps: &ResolvedDependencies)
        -> Result<ResourceHandle>;

    /// Block until the created resource is usable.
    async fn await_ready(
        &self,
        ctx: &ClientContext,
        handle: ResourceHandle,
        shutdown: &Shutdown,
    ) -> Result<WaitOutcome<ResourceHandle>>;
}
