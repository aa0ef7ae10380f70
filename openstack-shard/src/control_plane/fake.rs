//! Scripted in-memory control plane for builder and waiter tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::{
    ControlPlane, CreateNetwork, CreateRouter, CreateSecurityGroup, CreateSecurityGroupRule,
    CreateServer, CreateSubnet, CreateVolume, NetworkSnapshot, NetworkStatus, RouterSnapshot,
    SecurityGroupRuleSnapshot, SecurityGroupSnapshot, ServerFault, ServerSnapshot, ServerStatus,
    SubnetSnapshot, VolumeSnapshot, VolumeStatus,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    CreateNetwork(CreateNetwork),
    GetNetwork(String),
    CreateSubnet(CreateSubnet),
    CreateSecurityGroup(CreateSecurityGroup),
    CreateSecurityGroupRule(CreateSecurityGroupRule),
    CreateVolume(CreateVolume),
    GetVolume(String),
    CreateRouter(CreateRouter),
    AttachRouterSubnet { router_id: String, subnet_id: String },
    CreateServer(CreateServer),
    GetServer(String),
}

/// Statuses returned by successive refreshes. The last entry repeats.
struct Script<T: Clone>(Mutex<VecDeque<T>>);

impl<T: Clone> Script<T> {
    fn new(initial: T) -> Self {
        Self(Mutex::new(VecDeque::from([initial])))
    }

    fn set(&self, statuses: Vec<T>) {
        *self.0.lock().unwrap() = statuses.into();
    }

    fn next(&self) -> T {
        let mut queue = self.0.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

pub(crate) struct FakeControlPlane {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicU32,
    network_statuses: Script<NetworkStatus>,
    volume_statuses: Script<VolumeStatus>,
    server_statuses: Script<(ServerStatus, Option<String>)>,
    reject_creates: Mutex<Option<String>>,
}

impl FakeControlPlane {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
            network_statuses: Script::new(NetworkStatus::Active),
            volume_statuses: Script::new(VolumeStatus::Available),
            server_statuses: Script::new((ServerStatus::Active, None)),
            reject_creates: Mutex::new(None),
        }
    }

    pub(crate) fn script_network(&self, statuses: Vec<NetworkStatus>) {
        self.network_statuses.set(statuses);
    }

    pub(crate) fn script_volume(&self, statuses: Vec<VolumeStatus>) {
        self.volume_statuses.set(statuses);
    }

    pub(crate) fn script_server(&self, statuses: Vec<(ServerStatus, Option<String>)>) {
        self.server_statuses.set(statuses);
    }

    /// Make every create/attach call fail with the given message.
    pub(crate) fn reject_creates(&self, message: &str) {
        *self.reject_creates.lock().unwrap() = Some(message.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn refresh_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::GetNetwork(_) | Call::GetVolume(_) | Call::GetServer(_)
                )
            })
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_rejection(&self) -> Result<()> {
        if let Some(message) = self.reject_creates.lock().unwrap().as_ref() {
            bail!("POST failed (400 Bad Request): {}", message);
        }
        Ok(())
    }

    fn allocate_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn create_network(&self, req: &CreateNetwork) -> Result<NetworkSnapshot> {
        self.record(Call::CreateNetwork(req.clone()));
        self.check_rejection()?;
        Ok(NetworkSnapshot {
            id: self.allocate_id("net"),
            name: req.name.clone(),
            status: NetworkStatus::Build,
            subnets: Vec::new(),
        })
    }

    async fn get_network(&self, id: &str) -> Result<NetworkSnapshot> {
        self.record(Call::GetNetwork(id.to_string()));
        Ok(NetworkSnapshot {
            id: id.to_string(),
            name: "refreshed".to_string(),
            status: self.network_statuses.next(),
            subnets: Vec::new(),
        })
    }

    async fn create_subnet(&self, req: &CreateSubnet) -> Result<SubnetSnapshot> {
        self.record(Call::CreateSubnet(req.clone()));
        self.check_rejection()?;
        Ok(SubnetSnapshot {
            id: self.allocate_id("sub"),
            name: req.name.clone(),
            network_id: req.network_id.clone(),
            cidr: req.cidr.clone(),
        })
    }

    async fn create_security_group(
        &self,
        req: &CreateSecurityGroup,
    ) -> Result<SecurityGroupSnapshot> {
        self.record(Call::CreateSecurityGroup(req.clone()));
        self.check_rejection()?;
        Ok(SecurityGroupSnapshot {
            id: self.allocate_id("sg"),
            name: req.name.clone(),
            description: req.description.clone(),
        })
    }

    async fn create_security_group_rule(
        &self,
        req: &CreateSecurityGroupRule,
    ) -> Result<SecurityGroupRuleSnapshot> {
        self.record(Call::CreateSecurityGroupRule(req.clone()));
        self.check_rejection()?;
        Ok(SecurityGroupRuleSnapshot {
            id: self.allocate_id("rule"),
            security_group_id: req.security_group_id.clone(),
            direction: req.direction,
            ethertype: req.ethertype,
            protocol: Some(req.protocol.clone()),
            port_range_min: Some(req.port_range_min),
            port_range_max: Some(req.port_range_max),
        })
    }

    async fn create_volume(&self, req: &CreateVolume) -> Result<VolumeSnapshot> {
        self.record(Call::CreateVolume(req.clone()));
        self.check_rejection()?;
        Ok(VolumeSnapshot {
            id: self.allocate_id("vol"),
            name: Some(req.name.clone()),
            status: VolumeStatus::Creating,
            size: req.size,
        })
    }

    async fn get_volume(&self, id: &str) -> Result<VolumeSnapshot> {
        self.record(Call::GetVolume(id.to_string()));
        Ok(VolumeSnapshot {
            id: id.to_string(),
            name: Some("refreshed".to_string()),
            status: self.volume_statuses.next(),
            size: 0,
        })
    }

    async fn create_router(&self, req: &CreateRouter) -> Result<RouterSnapshot> {
        self.record(Call::CreateRouter(req.clone()));
        self.check_rejection()?;
        Ok(RouterSnapshot {
            id: self.allocate_id("rtr"),
            name: req.name.clone(),
            attached_subnets: Vec::new(),
        })
    }

    async fn attach_router_subnet(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        self.record(Call::AttachRouterSubnet {
            router_id: router_id.to_string(),
            subnet_id: subnet_id.to_string(),
        });
        self.check_rejection()
    }

    async fn create_server(&self, req: &CreateServer) -> Result<ServerSnapshot> {
        self.record(Call::CreateServer(req.clone()));
        self.check_rejection()?;
        Ok(ServerSnapshot {
            id: self.allocate_id("srv"),
            name: req.name.clone(),
            status: ServerStatus::Build,
            fault: None,
        })
    }

    async fn get_server(&self, id: &str) -> Result<ServerSnapshot> {
        self.record(Call::GetServer(id.to_string()));
        let (status, fault) = self.server_statuses.next();
        Ok(ServerSnapshot {
            id: id.to_string(),
            name: "refreshed".to_string(),
            status,
            fault: fault.map(|message| ServerFault {
                message,
                code: Some(500),
            }),
        })
    }
}
