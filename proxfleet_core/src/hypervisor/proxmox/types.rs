/*
* Proxmox api payloads, only the fields proxfleet reads.
*/
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

#[derive(Debug, Deserialize)]
pub struct NodeEntry {
    pub node: String,
}

#[derive(Debug, Deserialize)]
pub struct QemuEntry {
    pub vmid: u64,
    pub name: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub template: Option<Value>,
}
impl QemuEntry {
    pub fn is_template(&self) -> bool {
        self.template.as_ref().map(is_truthy).unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
pub struct PoolEntry {
    pub poolid: String,
}

#[derive(Debug, Deserialize)]
pub struct StorageEntry {
    pub storage: String,
}

#[derive(Debug, Deserialize)]
pub struct NetworkEntry {
    pub iface: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}
impl NetworkEntry {
    pub fn is_bridge(&self) -> bool {
        matches!(self.kind.as_deref(), Some("bridge") | Some("OVSBridge"))
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskStatus {
    /// "running" or "stopped".
    pub status: String,
    pub exitstatus: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AgentInterfaces {
    #[serde(default)]
    pub result: Vec<AgentInterface>,
}
impl AgentInterfaces {
    pub fn ipv4(&self) -> Vec<Ipv4Addr> {
        self.result
            .iter()
            .flat_map(|e| e.ip_addresses.iter())
            .filter(|e| e.ip_address_type == "ipv4")
            .filter_map(|e| e.ip_address.parse().ok())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentInterface {
    pub name: String,
    #[serde(rename = "ip-addresses", default)]
    pub ip_addresses: Vec<AgentAddress>,
}

#[derive(Debug, Deserialize)]
pub struct AgentAddress {
    #[serde(rename = "ip-address")]
    pub ip_address: String,
    #[serde(rename = "ip-address-type")]
    pub ip_address_type: String,
}

/// Vm config values are loosely typed (1 vs "1").
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_owned(),
        other => other.to_string(),
    }
}

pub fn is_truthy(value: &Value) -> bool {
    matches!(to_text(value).trim(), "1" | "true")
}

/// The guest agent option, either "1" or "enabled=1,fstrim_cloned_disks=1".
pub fn agent_enabled(config: &BTreeMap<String, Value>) -> bool {
    let text = match config.get("agent") {
        Some(v) => to_text(v),
        None => return false,
    };
    text.split(',')
        .find_map(|part| match part.split_once('=') {
            Some(("enabled", v)) => Some(v == "1"),
            Some(_) => None,
            None => Some(part == "1"),
        })
        .unwrap_or(false)
}
