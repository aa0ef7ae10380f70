//! Control-plane abstraction: create calls, refresh calls, and the
//! immutable snapshots they return.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::descriptor::{Direction, EtherType, ResourceKind};

pub mod openstack;

#[cfg(test)]
pub(crate) mod fake;

/// Identity shared by every snapshot and handle.
pub trait ResourceIdentity {
    fn kind(&self) -> ResourceKind;
    fn id(&self) -> &str;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkStatus {
    Active,
    #[default]
    Build,
    Down,
    Error,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkStatus::Active => "ACTIVE",
            NetworkStatus::Build => "BUILD",
            NetworkStatus::Down => "DOWN",
            NetworkStatus::Error => "ERROR",
            NetworkStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeStatus {
    #[default]
    Creating,
    Downloading,
    Available,
    Error,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VolumeStatus::Creating => "CREATING",
            VolumeStatus::Downloading => "DOWNLOADING",
            VolumeStatus::Available => "AVAILABLE",
            VolumeStatus::Error => "ERROR",
            VolumeStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerStatus {
    Active,
    #[default]
    Build,
    Error,
    Shutoff,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerStatus::Active => "ACTIVE",
            ServerStatus::Build => "BUILD",
            ServerStatus::Error => "ERROR",
            ServerStatus::Shutoff => "SHUTOFF",
            ServerStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: NetworkStatus,
    #[serde(default)]
    pub subnets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub network_id: String,
    #[serde(default)]
    pub cidr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRuleSnapshot {
    pub id: String,
    pub security_group_id: String,
    pub direction: Direction,
    pub ethertype: EtherType,
    pub protocol: Option<String>,
    pub port_range_min: Option<u16>,
    pub port_range_max: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub id: String,
    /// Block storage allows unnamed volumes.
    pub name: Option<String>,
    #[serde(default)]
    pub status: VolumeStatus,
    #[serde(default)]
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Subnets attached as router interfaces, in attach order.
    #[serde(default)]
    pub attached_subnets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFault {
    pub message: String,
    pub code: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: ServerStatus,
    pub fault: Option<ServerFault>,
}

macro_rules! impl_identity {
    ($ty:ty, $kind:expr, |$s:ident| $name:expr) => {
        impl ResourceIdentity for $ty {
            fn kind(&self) -> ResourceKind {
                $kind
            }

            fn id(&self) -> &str {
                &self.id
            }

            fn name(&self) -> &str {
                let $s = self;
                $name
            }
        }
    };
}

impl_identity!(NetworkSnapshot, ResourceKind::Network, |s| &s.name);
impl_identity!(SecurityGroupSnapshot, ResourceKind::SecurityGroup, |s| &s.name);
impl_identity!(SecurityGroupRuleSnapshot, ResourceKind::SecurityGroupRule, |s| &s.id);
impl_identity!(VolumeSnapshot, ResourceKind::Volume, |s| s.name.as_deref().unwrap_or(""));
impl_identity!(RouterSnapshot, ResourceKind::Router, |s| &s.name);
impl_identity!(ServerSnapshot, ResourceKind::Server, |s| &s.name);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateNetwork {
    pub name: String,
    pub admin_state_up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationPool {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateSubnet {
    pub name: String,
    pub network_id: String,
    pub enable_dhcp: bool,
    pub allocation_pools: Vec<AllocationPool>,
    pub ip_version: u8,
    pub cidr: String,
    pub gateway_ip: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateSecurityGroup {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateSecurityGroupRule {
    pub security_group_id: String,
    pub direction: Direction,
    pub ethertype: EtherType,
    pub protocol: String,
    pub port_range_min: u16,
    pub port_range_max: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateVolume {
    pub name: String,
    pub description: String,
    pub size: u32,
    #[serde(rename = "imageRef", skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    pub bootable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRouter {
    pub name: String,
    pub admin_state_up: bool,
    /// Always serialized; `None` means no external gateway.
    pub external_gateway_info: Option<serde_json::Value>,
}

pub const BLOCK_DEVICE_VOLUME: &str = "volume";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDeviceMapping {
    pub uuid: String,
    pub boot_index: u32,
    pub source_type: String,
    pub destination_type: String,
    pub delete_on_termination: bool,
}

impl BlockDeviceMapping {
    /// An existing volume used as the boot disk, destroyed with the server.
    pub fn root_volume(volume_id: &str) -> Self {
        Self {
            uuid: volume_id.to_string(),
            boot_index: 0,
            source_type: BLOCK_DEVICE_VOLUME.to_string(),
            destination_type: BLOCK_DEVICE_VOLUME.to_string(),
            delete_on_termination: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkAttachment {
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateServer {
    pub name: String,
    #[serde(rename = "imageRef")]
    pub image_ref: String,
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    pub config_drive: bool,
    /// Base64-encoded user data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    pub block_device_mapping_v2: Vec<BlockDeviceMapping>,
    pub networks: Vec<NetworkAttachment>,
}

/// The IaaS API as seen by builders and waiters.
///
/// Implementations must be safe for concurrent use; every call is
/// addressed by resource id and carries no per-call session state.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn create_network(&self, req: &CreateNetwork) -> Result<NetworkSnapshot>;

    async fn get_network(&self, id: &str) -> Result<NetworkSnapshot>;

    async fn create_subnet(&self, req: &CreateSubnet) -> Result<SubnetSnapshot>;

    async fn create_security_group(&self, req: &CreateSecurityGroup)
        -> Result<SecurityGroupSnapshot>;

    async fn create_security_group_rule(
        &self,
        req: &CreateSecurityGroupRule,
    ) -> Result<SecurityGroupRuleSnapshot>;

    async fn create_volume(&self, req: &CreateVolume) -> Result<VolumeSnapshot>;

    async fn get_volume(&self, id: &str) -> Result<VolumeSnapshot>;

    async fn create_router(&self, req: &CreateRouter) -> Result<RouterSnapshot>;

    /// Attach a subnet to a router as a new interface.
    async fn attach_router_subnet(&self, router_id: &str, subnet_id: &str) -> Result<()>;

    async fn create_server(&self, req: &CreateServer) -> Result<ServerSnapshot>;

    async fn get_server(&self, id: &str) -> Result<ServerSnapshot>;
}
