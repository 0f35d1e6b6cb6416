/*
* Hypervisor compatibility layer.
*
* The orchestrator and executor only talk to hosts through the
* Hypervisor trait: asynchronous requests return a task handle
* that the executor polls on its own schedule.
*
* - proxmox: the reqwest implementation against the Proxmox VE rest api.
* - mock: an in-memory host used by tests.
*/
pub mod proxmox;

#[cfg(test)]
pub mod mock;

// Reexport
pub use proxmox::{ProxmoxProvider, ProxmoxSession};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

// Error Handling
use proxfleet_error::ProxfleetError;

/// An opaque reference to an asynchronous hypervisor operation.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub String);
impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Succeeded,
    /// Terminal failure with the hypervisor exit status.
    Failed(String),
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum PowerState {
    Running,
    Stopped,
    Other(String),
}
impl From<&str> for PowerState {
    fn from(s: &str) -> Self {
        match s {
            "running" => PowerState::Running,
            "stopped" => PowerState::Stopped,
            other => PowerState::Other(other.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct VmStatusInfo {
    pub power: PowerState,
    /// Guest agent enabled in the vm configuration.
    pub agent: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CloneParams {
    /// Template vm id.
    pub template: u64,
    pub newid: u64,
    pub name: String,
    pub pool: String,
    pub storage: String,
}

/// What a host offers, fetched once per batch
/// and consumed by the row validator.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    /// Proxmox node name.
    pub node: String,
    /// Template name -> template vm id.
    pub templates: BTreeMap<String, u64>,
    pub pools: BTreeSet<String>,
    pub storages: BTreeSet<String>,
    pub bridges: BTreeSet<String>,
    /// Vm ids already used on the host.
    pub vm_ids: BTreeSet<u64>,
    /// First free id as reported by the host.
    pub next_id: u64,
}

#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// The host name, as written in the csv `target_host` column.
    fn host(&self) -> &str;

    async fn inventory(&self) -> Result<Inventory, ProxfleetError>;

    async fn submit_clone(&self, params: &CloneParams) -> Result<TaskHandle, ProxfleetError>;
    async fn submit_start(&self, vmid: u64) -> Result<TaskHandle, ProxfleetError>;
    /// Hard power-off.
    async fn submit_stop(&self, vmid: u64) -> Result<TaskHandle, ProxfleetError>;
    async fn submit_delete(&self, vmid: u64) -> Result<TaskHandle, ProxfleetError>;

    /// Current network interfaces (net0, net1, ...) of a vm.
    async fn network_config(&self, vmid: u64) -> Result<BTreeMap<String, String>, ProxfleetError>;
    /// Returns None when the host applied the change synchronously.
    async fn submit_network_config(
        &self,
        vmid: u64,
        changes: &BTreeMap<String, String>,
    ) -> Result<Option<TaskHandle>, ProxfleetError>;

    async fn poll_task(&self, task: &TaskHandle) -> Result<TaskState, ProxfleetError>;

    /// None when the vm doesn't exist on the host.
    async fn vm_status(&self, vmid: u64) -> Result<Option<VmStatusInfo>, ProxfleetError>;

    /// Ipv4 addresses reported by the guest agent.
    async fn query_guest_ipv4(&self, vmid: u64) -> Result<Vec<Ipv4Addr>, ProxfleetError>;
}

/// Hands out an authenticated hypervisor handle per host.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Configured host names.
    fn hosts(&self) -> Vec<String>;

    async fn session(&self, host: &str) -> Result<Arc<dyn Hypervisor>, ProxfleetError>;
}
