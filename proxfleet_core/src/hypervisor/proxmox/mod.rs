/*
* The Proxmox VE implementation of the hypervisor seam.
*
* Hosts are clusterless: each csv target_host is a standalone api
* with a single node.
*/
mod rest;
mod types;

// Reexport
pub use rest::RestClient;

use super::{
    CloneParams, Hypervisor, Inventory, PowerState, SessionProvider, TaskHandle, TaskState,
    VmStatusInfo,
};
use crate::config::{Credentials, HostConfig, ProxfleetConfig};
use types::{
    agent_enabled, to_text, AgentInterfaces, NetworkEntry, NodeEntry, PoolEntry, QemuEntry,
    StorageEntry, TaskStatus,
};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::OnceCell;

// Error Handling
use log::{debug, info};
use proxfleet_error::{LibError, ProxfleetError, WrapError};

/// An authenticated api handle on one host.
pub struct ProxmoxSession {
    name: String,
    node: String,
    rest: RestClient,
}

impl ProxmoxSession {
    pub async fn open(host: &HostConfig, credentials: &Credentials) -> Result<Self, ProxfleetError> {
        let mut rest = RestClient::new(&host.url, host.verify_tls)?;
        rest.login(credentials).await?;

        let node = match &host.node {
            Some(node) => node.to_owned(),
            None => {
                let nodes: Vec<NodeEntry> = rest.get(&["nodes"]).await?;
                match nodes.into_iter().next() {
                    Some(e) => e.node,
                    None => {
                        let message = format!("No node found on host {}", host.name);
                        return Err(LibError::builder()
                            .msg(&message)
                            .help("Set the node name in the host configuration.")
                            .build()
                            .into());
                    }
                }
            }
        };
        info!("[{}] session opened on node {}", host.name, node);
        Ok(Self {
            name: host.name.clone(),
            node,
            rest,
        })
    }

    async fn qemu_list(&self) -> Result<Vec<QemuEntry>, ProxfleetError> {
        self.rest.get(&["nodes", &self.node, "qemu"]).await
    }
    async fn qemu_config(&self, vmid: u64) -> Result<BTreeMap<String, Value>, ProxfleetError> {
        let vmid = vmid.to_string();
        self.rest
            .get(&["nodes", &self.node, "qemu", &vmid, "config"])
            .await
    }
    async fn vm_post(
        &self,
        vmid: u64,
        path: &[&str],
        body: &[(&str, String)],
    ) -> Result<TaskHandle, ProxfleetError> {
        let vmid = vmid.to_string();
        let mut segments: Vec<&str> = vec!["nodes", self.node.as_str(), "qemu", vmid.as_str()];
        segments.extend(path);
        let upid: String = self.rest.post(&segments, body).await?;
        debug!("[{}] task {}", self.name, upid);
        Ok(TaskHandle(upid))
    }
}

#[async_trait]
impl Hypervisor for ProxmoxSession {
    fn host(&self) -> &str {
        &self.name
    }

    async fn inventory(&self) -> Result<Inventory, ProxfleetError> {
        let qemu = self.qemu_list().await?;
        let pools: Vec<PoolEntry> = self.rest.get(&["pools"]).await?;
        let storages: Vec<StorageEntry> = self.rest.get(&["nodes", &self.node, "storage"]).await?;
        let networks: Vec<NetworkEntry> = self.rest.get(&["nodes", &self.node, "network"]).await?;
        let next_id: Value = self.rest.get(&["cluster", "nextid"]).await?;

        let inventory = Inventory {
            node: self.node.clone(),
            templates: qemu
                .iter()
                .filter(|e| e.is_template())
                .filter_map(|e| e.name.clone().map(|name| (name, e.vmid)))
                .collect(),
            pools: pools.into_iter().map(|e| e.poolid).collect(),
            storages: storages.into_iter().map(|e| e.storage).collect(),
            bridges: networks
                .into_iter()
                .filter(|e| e.is_bridge())
                .map(|e| e.iface)
                .collect(),
            vm_ids: qemu.iter().map(|e| e.vmid).collect(),
            next_id: to_text(&next_id).parse()?,
        };
        Ok(inventory)
    }

    async fn submit_clone(&self, params: &CloneParams) -> Result<TaskHandle, ProxfleetError> {
        let body = [
            ("newid", params.newid.to_string()),
            ("name", params.name.clone()),
            ("full", "1".to_owned()),
            ("pool", params.pool.clone()),
            ("storage", params.storage.clone()),
        ];
        self.vm_post(params.template, &["clone"], &body).await
    }
    async fn submit_start(&self, vmid: u64) -> Result<TaskHandle, ProxfleetError> {
        self.vm_post(vmid, &["status", "start"], &[]).await
    }
    async fn submit_stop(&self, vmid: u64) -> Result<TaskHandle, ProxfleetError> {
        self.vm_post(vmid, &["status", "stop"], &[]).await
    }
    async fn submit_delete(&self, vmid: u64) -> Result<TaskHandle, ProxfleetError> {
        let id = vmid.to_string();
        let upid: String = self
            .rest
            .delete(&["nodes", &self.node, "qemu", &id])
            .await?;
        Ok(TaskHandle(upid))
    }

    async fn network_config(&self, vmid: u64) -> Result<BTreeMap<String, String>, ProxfleetError> {
        let config = self.qemu_config(vmid).await?;
        let interfaces = config
            .iter()
            .filter(|(k, _)| k.starts_with("net") && k[3..].parse::<u8>().is_ok())
            .map(|(k, v)| (k.to_owned(), to_text(v)))
            .collect();
        Ok(interfaces)
    }
    async fn submit_network_config(
        &self,
        vmid: u64,
        changes: &BTreeMap<String, String>,
    ) -> Result<Option<TaskHandle>, ProxfleetError> {
        let id = vmid.to_string();
        let body: Vec<(&str, String)> = changes.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        // The async config endpoint answers null when nothing was queued.
        let upid: Option<String> = self
            .rest
            .post(&["nodes", &self.node, "qemu", &id, "config"], &body)
            .await?;
        Ok(upid.map(TaskHandle))
    }

    async fn poll_task(&self, task: &TaskHandle) -> Result<TaskState, ProxfleetError> {
        let status: TaskStatus = self
            .rest
            .get(&["nodes", &self.node, "tasks", &task.0, "status"])
            .await?;
        let state = match (status.status.as_str(), status.exitstatus) {
            ("stopped", Some(exit)) if exit == "OK" => TaskState::Succeeded,
            ("stopped", Some(exit)) => TaskState::Failed(exit),
            ("stopped", None) => TaskState::Failed("unknown exit status".to_owned()),
            _ => TaskState::Pending,
        };
        Ok(state)
    }

    async fn vm_status(&self, vmid: u64) -> Result<Option<VmStatusInfo>, ProxfleetError> {
        let entry = self.qemu_list().await?.into_iter().find(|e| e.vmid == vmid);
        let entry = match entry {
            Some(v) => v,
            None => return Ok(None),
        };
        let config = self.qemu_config(vmid).await?;
        Ok(Some(VmStatusInfo {
            power: PowerState::from(entry.status.as_deref().unwrap_or_default()),
            agent: agent_enabled(&config),
        }))
    }

    async fn query_guest_ipv4(&self, vmid: u64) -> Result<Vec<Ipv4Addr>, ProxfleetError> {
        let id = vmid.to_string();
        let interfaces: AgentInterfaces = self
            .rest
            .get(&["nodes", &self.node, "qemu", &id, "agent", "network-get-interfaces"])
            .await?;
        Ok(interfaces.ipv4())
    }
}

/// Opens one session per configured host, on first use.
pub struct ProxmoxProvider {
    hosts: BTreeMap<String, HostConfig>,
    credentials: Credentials,
    sessions: HashMap<String, OnceCell<Arc<ProxmoxSession>>>,
}

impl ProxmoxProvider {
    pub fn new(config: &ProxfleetConfig, credentials: Credentials) -> Self {
        let hosts: BTreeMap<String, HostConfig> = config
            .hosts
            .iter()
            .map(|e| (e.name.clone(), e.clone()))
            .collect();
        let sessions = hosts.keys().map(|e| (e.clone(), OnceCell::new())).collect();
        Self {
            hosts,
            credentials,
            sessions,
        }
    }
}

#[async_trait]
impl SessionProvider for ProxmoxProvider {
    fn hosts(&self) -> Vec<String> {
        self.hosts.keys().cloned().collect()
    }
    async fn session(&self, host: &str) -> Result<Arc<dyn Hypervisor>, ProxfleetError> {
        let (config, cell) = match (self.hosts.get(host), self.sessions.get(host)) {
            (Some(config), Some(cell)) => (config, cell),
            _ => {
                let message = format!("Couldn't find host {:?}", host);
                let help = format!(
                    "Available hosts are:\n[{}]",
                    self.hosts().join(",")
                );
                return Err(LibError::builder().msg(&message).help(&help).build().into());
            }
        };
        let session = cell
            .get_or_try_init(|| async {
                match ProxmoxSession::open(config, &self.credentials).await {
                    Ok(v) => Ok(Arc::new(v)),
                    Err(e) => {
                        let message = format!("Couldn't open a session on host {}", host);
                        let help = format!("Check the credentials of {} on {}", self.credentials.user(), config.url);
                        Err(WrapError::builder()
                            .msg(&message)
                            .help(&help)
                            .origin(e.into())
                            .build())
                    }
                }
            })
            .await?;
        let session: Arc<dyn Hypervisor> = session.clone();
        Ok(session)
    }
}
