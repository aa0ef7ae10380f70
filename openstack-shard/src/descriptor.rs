//! Caller-supplied descriptions of the resources to build.
//!
//! Descriptors are plain data. They are created before provisioning
//! starts and never mutated afterwards; builders only read them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::path::Path;

/// The resource kinds this subsystem can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    SecurityGroup,
    SecurityGroupRule,
    Volume,
    Router,
    Server,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceKind::Network => "Network",
            ResourceKind::SecurityGroup => "Security Group",
            ResourceKind::SecurityGroupRule => "Security Group Rule",
            ResourceKind::Volume => "Volume",
            ResourceKind::Router => "Router",
            ResourceKind::Server => "Instance",
        };
        f.write_str(label)
    }
}

/// Traffic direction of a security group rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EtherType {
    #[serde(rename = "IPv4", alias = "ipv4")]
    Ipv4,
    #[serde(rename = "IPv6", alias = "ipv6")]
    Ipv6,
}

/// Operating system families we know how to generate user data for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
}

impl OsFamily {
    /// Case-insensitive match. Unrecognized families yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        if value.trim().eq_ignore_ascii_case("linux") {
            Some(OsFamily::Linux)
        } else {
            None
        }
    }
}

/// A tenant network with one IPv4 subnet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    /// Correlation id for progress updates.
    #[serde(default)]
    pub range_id: String,
    pub cidr: String,
    pub gateway: Ipv4Addr,
    pub pool_start: Ipv4Addr,
    pub pool_end: Ipv4Addr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    pub name: String,
    #[serde(default)]
    pub range_id: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGroupRuleSpec {
    pub name: String,
    #[serde(default)]
    pub range_id: String,
    /// Name of the parent security group descriptor.
    pub security_group: String,
    pub direction: Direction,
    pub ether_type: EtherType,
    pub protocol: String,
    pub port_range_min: u16,
    pub port_range_max: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    #[serde(default)]
    pub range_id: String,
    #[serde(default)]
    pub description: String,
    pub size_gb: u32,
    /// Source image; `None` creates a blank volume.
    pub image_id: Option<String>,
    #[serde(default)]
    pub bootable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSpec {
    pub name: String,
    #[serde(default)]
    pub range_id: String,
    /// Names of the network descriptors this router connects.
    #[serde(default)]
    pub networks: Vec<String>,
}

/// A compute instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSpec {
    pub name: String,
    #[serde(default)]
    pub range_id: String,
    pub image_id: String,
    pub flavor_id: String,
    /// OS family used to pick a user-data template ("linux", ...).
    #[serde(default)]
    pub os_type: String,
    #[serde(default)]
    pub default_user: String,
    #[serde(default)]
    pub default_password: String,
    /// Names of the network descriptors to attach.
    #[serde(default)]
    pub networks: Vec<String>,
    /// Names of the volume descriptors to attach as root block devices.
    #[serde(default)]
    pub volumes: Vec<String>,
}

/// All descriptors of one provisioning run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub networks: Vec<NetworkSpec>,
    #[serde(default)]
    pub security_groups: Vec<SecurityGroupSpec>,
    #[serde(default)]
    pub security_group_rules: Vec<SecurityGroupRuleSpec>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub routers: Vec<RouterSpec>,
    #[serde(default)]
    pub hosts: Vec<HostSpec>,
}

impl Blueprint {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read blueprint file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse blueprint file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_os_family_parse_is_case_insensitive() {
        assert_eq!(OsFamily::parse("linux"), Some(OsFamily::Linux));
        assert_eq!(OsFamily::parse("Linux"), Some(OsFamily::Linux));
        assert_eq!(OsFamily::parse(" LINUX "), Some(OsFamily::Linux));
        assert_eq!(OsFamily::parse("windows"), None);
        assert_eq!(OsFamily::parse(""), None);
    }

    #[test]
    fn test_kind_display_uses_instance_for_servers() {
        assert_eq!(ResourceKind::Server.to_string(), "Instance");
        assert_eq!(ResourceKind::SecurityGroupRule.to_string(), "Security Group Rule");
    }

    #[test]
    fn test_load_blueprint() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("range.toml");

        let content = r#"
[[networks]]
name = "lab"
range_id = "range-7"
cidr = "10.10.0.0/24"
gateway = "10.10.0.1"
pool_start = "10.10.0.100"
pool_end = "10.10.0.200"

[[security_groups]]
name = "ssh"
description = "allow ssh"

[[security_group_rules]]
name = "ssh-in"
security_group = "ssh"
direction = "ingress"
ether_type = "IPv4"
protocol = "tcp"
port_range_min = 22
port_range_max = 22

[[volumes]]
name = "root"
size_gb = 10
image_id = "img-1"
bootable = true

[[routers]]
name = "edge"
networks = ["lab"]

[[hosts]]
name = "kali"
image_id = "img-1"
flavor_id = "m1.small"
os_type = "Linux"
default_user = "student"
default_password = "changeme"
networks = ["lab"]
volumes = ["root"]
"#;
        fs::write(&path, content).unwrap();

        let blueprint = Blueprint::load(&path).unwrap();
        assert_eq!(blueprint.networks.len(), 1);
        assert_eq!(blueprint.networks[0].range_id, "range-7");
        assert_eq!(blueprint.networks[0].gateway, Ipv4Addr::new(10, 10, 0, 1));
        assert_eq!(blueprint.security_groups[0].description, "allow ssh");
        let rule = &blueprint.security_group_rules[0];
        assert_eq!(rule.direction, Direction::Ingress);
        assert_eq!(rule.ether_type, EtherType::Ipv4);
        assert_eq!(blueprint.volumes[0].image_id.as_deref(), Some("img-1"));
        assert!(blueprint.volumes[0].bootable);
        assert_eq!(blueprint.routers[0].networks, vec!["lab".to_string()]);
        assert_eq!(blueprint.hosts[0].volumes, vec!["root".to_string()]);
        assert_eq!(blueprint.hosts[0].range_id, "");
    }

    #[test]
    fn test_blueprint_rejects_bad_gateway() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("range.toml");
        fs::write(
            &path,
            r#"
[[networks]]
name = "lab"
cidr = "10.10.0.0/24"
gateway = "not-an-ip"
pool_start = "10.10.0.100"
pool_end = "10.10.0.200"
"#,
        )
        .unwrap();

        let err = Blueprint::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse blueprint file"));
    }
}
