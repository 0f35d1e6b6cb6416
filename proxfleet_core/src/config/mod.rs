pub mod credentials;
pub mod load;

// Reexport
pub use credentials::{CredentialArgs, Credentials};

use crate::executor::{ExecutorConfig, PollPolicy};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Error Handling
use proxfleet_error::{LibError, ProxfleetError};

pub const CONFIG_DIR: &'static str = "/etc/proxfleet";

/*
* The proxfleet configuration file.
*
* Lists the Proxmox hosts a csv `target_host` can point to,
* and tunes the executor poll loops.
*/
#[derive(Default, Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct ProxfleetConfig {
    #[serde(rename = "host", default)]
    pub hosts: Vec<HostConfig>,
    #[serde(default)]
    pub executor: ExecutorSettings,
}

/// A standalone Proxmox VE host.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct HostConfig {
    /// The name used in the csv `target_host` column.
    pub name: String,
    /// Api base url, ex: "https://10.0.0.1:8006".
    pub url: String,
    /// Proxmox ships self-signed certificates.
    #[serde(default)]
    pub verify_tls: bool,
    /// Proxmox node name, discovered when unset.
    pub node: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct ExecutorSettings {
    #[serde(default = "ExecutorSettings::default_concurrency")]
    pub max_concurrency: usize,
    /// Accepted management networks, any address when empty.
    #[serde(default)]
    pub management_subnets: Vec<Ipv4Net>,
    #[serde(default = "PollSettings::task")]
    pub task: PollSettings,
    #[serde(default = "PollSettings::power")]
    pub power: PollSettings,
    #[serde(default = "PollSettings::agent")]
    pub agent: PollSettings,
}
impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_concurrency: Self::default_concurrency(),
            management_subnets: vec![],
            task: PollSettings::task(),
            power: PollSettings::power(),
            agent: PollSettings::agent(),
        }
    }
}
impl ExecutorSettings {
    fn default_concurrency() -> usize {
        8
    }
    pub fn to_executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            task: self.task.to_policy(),
            power: self.power.to_policy(),
            agent: self.agent.to_policy(),
            management_subnets: self.management_subnets.clone(),
        }
    }
}

/// A poll loop bound as written in the config file.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
pub struct PollSettings {
    pub interval_ms: u64,
    pub timeout_secs: u64,
}
impl PollSettings {
    /// Hypervisor task completion.
    pub fn task() -> Self {
        Self {
            interval_ms: 5000,
            timeout_secs: 900,
        }
    }
    /// Vm power state transitions.
    pub fn power() -> Self {
        Self {
            interval_ms: 2000,
            timeout_secs: 120,
        }
    }
    /// Guest agent ip retrieval.
    pub fn agent() -> Self {
        Self {
            interval_ms: 2000,
            timeout_secs: 180,
        }
    }
    pub fn to_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl ProxfleetConfig {
    pub fn host(&self, name: &str) -> Option<&HostConfig> {
        self.hosts.iter().find(|e| e.name == name)
    }
    /// Reject configurations the provider couldn't serve.
    pub fn check(&self) -> Result<(), ProxfleetError> {
        for (i, host) in self.hosts.iter().enumerate() {
            if self.hosts[..i].iter().any(|e| e.name == host.name) {
                let message = format!("Host {:?} is declared twice.", host.name);
                let help = "Host names must be unique: they are matched against the csv target_host column.";
                return Err(LibError::builder().msg(&message).help(help).build().into());
            }
        }
        if self.executor.max_concurrency == 0 {
            let message = "Executor max_concurrency must be greater than 0.";
            return Err(LibError::builder().msg(message).help("").build().into());
        }
        Ok(())
    }
}
