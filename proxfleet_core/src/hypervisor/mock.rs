/*
* An in-memory hypervisor for tests.
*
* Requests take effect when they are submitted
* and the returned task reports the scripted terminal state.
*/
use super::{
    CloneParams, Hypervisor, Inventory, PowerState, SessionProvider, TaskHandle, TaskState,
    VmStatusInfo,
};

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

// Error Handling
use proxfleet_error::{LibError, ProxfleetError};

/// How the host answers a kind of request.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Script {
    Succeed,
    /// The task ends with this exit status.
    Fail(String),
    /// The request is refused synchronously.
    Reject(String),
    /// The task never leaves the pending state.
    Hang,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MockVm {
    pub power: PowerState,
    pub agent: bool,
    pub net: BTreeMap<String, String>,
    pub ips: Vec<Ipv4Addr>,
}
impl Default for MockVm {
    fn default() -> Self {
        Self {
            power: PowerState::Stopped,
            agent: true,
            net: BTreeMap::from([(
                "net0".to_owned(),
                "virtio=BC:24:11:00:00:01,bridge=vmbr0,firewall=1".to_owned(),
            )]),
            ips: vec![],
        }
    }
}
impl MockVm {
    pub fn running() -> Self {
        Self {
            power: PowerState::Running,
            ..Default::default()
        }
    }
    pub fn with_ips(mut self, ips: &[&str]) -> Self {
        self.ips = ips.iter().filter_map(|e| e.parse().ok()).collect();
        self
    }
}

#[derive(Debug)]
pub struct MockHost {
    name: String,
    reachable: bool,
    templates: BTreeMap<String, u64>,
    pools: BTreeSet<String>,
    storages: BTreeSet<String>,
    bridges: BTreeSet<String>,
    next_id: u64,
    /// Addresses reported by the guest agent of cloned vms.
    guest_ips: Vec<Ipv4Addr>,
    scripts: HashMap<String, Script>,
    vms: Mutex<BTreeMap<u64, MockVm>>,
    tasks: Mutex<HashMap<String, TaskState>>,
    calls: Mutex<Vec<String>>,
}

impl MockHost {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            reachable: true,
            templates: BTreeMap::new(),
            pools: BTreeSet::from(["students".to_owned()]),
            storages: BTreeSet::from(["local-lvm".to_owned()]),
            bridges: BTreeSet::from(["vmbr0".to_owned(), "vmbr1".to_owned()]),
            next_id: 100,
            guest_ips: vec![],
            scripts: HashMap::new(),
            vms: Mutex::new(BTreeMap::new()),
            tasks: Mutex::new(HashMap::new()),
            calls: Mutex::new(vec![]),
        }
    }
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }
    pub fn with_template(mut self, name: &str, vmid: u64) -> Self {
        self.templates.insert(name.to_owned(), vmid);
        self
    }
    pub fn with_next_id(mut self, id: u64) -> Self {
        self.next_id = id;
        self
    }
    pub fn with_guest_ips(mut self, ips: &[&str]) -> Self {
        self.guest_ips = ips.iter().filter_map(|e| e.parse().ok()).collect();
        self
    }
    pub fn with_vm(self, vmid: u64, vm: MockVm) -> Self {
        self.vms.lock().unwrap().insert(vmid, vm);
        self
    }
    /// Script a request kind: clone, start, stop, delete or network.
    pub fn script(mut self, kind: &str, script: Script) -> Self {
        self.scripts.insert(kind.to_owned(), script);
        self
    }

    pub fn vm(&self, vmid: u64) -> Option<MockVm> {
        self.vms.lock().unwrap().get(&vmid).cloned()
    }
    /// Number of submitted requests of a kind.
    pub fn calls(&self, kind: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == kind)
            .count()
    }

    /// Record the call and resolve its script.
    /// The effect only runs when the script succeeds.
    fn submit(
        &self,
        kind: &str,
        effect: impl FnOnce(&mut BTreeMap<u64, MockVm>),
    ) -> Result<TaskHandle, ProxfleetError> {
        self.calls.lock().unwrap().push(kind.to_owned());
        let script = self.scripts.get(kind).cloned().unwrap_or(Script::Succeed);
        let state = match script {
            Script::Reject(message) => {
                return Err(LibError::builder()
                    .msg(&format!("{} rejected", kind))
                    .help(&message)
                    .build()
                    .into())
            }
            Script::Succeed => {
                effect(&mut self.vms.lock().unwrap());
                TaskState::Succeeded
            }
            Script::Fail(status) => TaskState::Failed(status),
            Script::Hang => TaskState::Pending,
        };
        let mut tasks = self.tasks.lock().unwrap();
        let handle = TaskHandle(format!("UPID:{}:{}:{}", self.name, tasks.len(), kind));
        tasks.insert(handle.0.clone(), state);
        Ok(handle)
    }

    fn missing(vmid: u64) -> ProxfleetError {
        LibError::builder()
            .msg(&format!("Vm {} doesn't exist", vmid))
            .help("")
            .build()
            .into()
    }
}

#[async_trait]
impl Hypervisor for MockHost {
    fn host(&self) -> &str {
        &self.name
    }
    async fn inventory(&self) -> Result<Inventory, ProxfleetError> {
        let mut vm_ids: BTreeSet<u64> = self.vms.lock().unwrap().keys().copied().collect();
        vm_ids.extend(self.templates.values());
        Ok(Inventory {
            node: self.name.clone(),
            templates: self.templates.clone(),
            pools: self.pools.clone(),
            storages: self.storages.clone(),
            bridges: self.bridges.clone(),
            vm_ids,
            next_id: self.next_id,
        })
    }
    async fn submit_clone(&self, params: &CloneParams) -> Result<TaskHandle, ProxfleetError> {
        let newid = params.newid;
        let ips = self.guest_ips.clone();
        self.submit("clone", move |vms| {
            vms.insert(
                newid,
                MockVm {
                    ips,
                    ..Default::default()
                },
            );
        })
    }
    async fn submit_start(&self, vmid: u64) -> Result<TaskHandle, ProxfleetError> {
        self.submit("start", |vms| {
            if let Some(vm) = vms.get_mut(&vmid) {
                vm.power = PowerState::Running;
            }
        })
    }
    async fn submit_stop(&self, vmid: u64) -> Result<TaskHandle, ProxfleetError> {
        self.submit("stop", |vms| {
            if let Some(vm) = vms.get_mut(&vmid) {
                vm.power = PowerState::Stopped;
            }
        })
    }
    async fn submit_delete(&self, vmid: u64) -> Result<TaskHandle, ProxfleetError> {
        self.submit("delete", |vms| {
            vms.remove(&vmid);
        })
    }
    async fn network_config(&self, vmid: u64) -> Result<BTreeMap<String, String>, ProxfleetError> {
        self.vm(vmid).map(|e| e.net).ok_or(Self::missing(vmid))
    }
    async fn submit_network_config(
        &self,
        vmid: u64,
        changes: &BTreeMap<String, String>,
    ) -> Result<Option<TaskHandle>, ProxfleetError> {
        let handle = self.submit("network", |vms| {
            if let Some(vm) = vms.get_mut(&vmid) {
                vm.net.extend(changes.clone());
            }
        })?;
        Ok(Some(handle))
    }
    async fn poll_task(&self, task: &TaskHandle) -> Result<TaskState, ProxfleetError> {
        self.tasks
            .lock()
            .unwrap()
            .get(&task.0)
            .cloned()
            .ok_or(LibError::builder().msg("Unknown task").help(&task.0).build().into())
    }
    async fn vm_status(&self, vmid: u64) -> Result<Option<VmStatusInfo>, ProxfleetError> {
        Ok(self.vm(vmid).map(|e| VmStatusInfo {
            power: e.power,
            agent: e.agent,
        }))
    }
    async fn query_guest_ipv4(&self, vmid: u64) -> Result<Vec<Ipv4Addr>, ProxfleetError> {
        match self.vm(vmid) {
            Some(vm) if vm.power == PowerState::Running => Ok(vm.ips),
            Some(_) => Err(LibError::builder()
                .msg("Guest agent is not running")
                .help("")
                .build()
                .into()),
            None => Err(Self::missing(vmid)),
        }
    }
}

#[derive(Default)]
pub struct MockProvider {
    hosts: BTreeMap<String, Arc<MockHost>>,
}
impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_host(mut self, host: MockHost) -> Self {
        self.hosts.insert(host.name.clone(), Arc::new(host));
        self
    }
    pub fn host(&self, name: &str) -> Arc<MockHost> {
        self.hosts[name].clone()
    }
}

#[async_trait]
impl SessionProvider for MockProvider {
    fn hosts(&self) -> Vec<String> {
        self.hosts.keys().cloned().collect()
    }
    async fn session(&self, host: &str) -> Result<Arc<dyn Hypervisor>, ProxfleetError> {
        match self.hosts.get(host) {
            Some(e) if e.reachable => {
                let session: Arc<dyn Hypervisor> = e.clone();
                Ok(session)
            }
            _ => Err(LibError::builder()
                .msg(&format!("Couldn't open a session on {}", host))
                .help("authentication failure")
                .build()
                .into()),
        }
    }
}
