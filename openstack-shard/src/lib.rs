//! OpenStack provisioning shard: resource builders, a readiness waiter and
//! the control-plane client they talk to.

pub mod builder;
pub mod config;
pub mod context;
pub mod control_plane;
pub mod descriptor;
pub mod error;
pub mod progress;
pub mod registry;
pub mod shutdown;
pub mod user_data;
pub mod waiter;

pub use builder::{ResolvedDependencies, ResourceBuilder, ResourceHandle, ResourceKey};
pub use context::ClientContext;
pub use error::{Result, ShardError};
pub use registry::{provision_resource, BuildRegistry, SlotState};
pub use waiter::{ReadinessWaiter, WaitOutcome, Waitable};
