use crate::table::{Field, VmRecord, VmStatus};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/**
The lifecycle operation applied to a batch.

Each variant carries its own row scope, required fields
and required vm state; they are resolved once per batch.
*/
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    ValueEnum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Action {
    /// Validate the csv file before any operation.
    Validation,
    /// Clone vms from templates.
    Clone,
    /// Start vms.
    Start,
    /// Hard power-off vms.
    Stop,
    /// Destroy vms (must be stopped first).
    Delete,
    /// Apply net0/net1 bridges.
    NetworkBridge,
    /// Retrieve management ipv4 addresses from the guest agent.
    ManagementIp,
    /// validation -> clone -> network_bridge -> start -> management_ip.
    Deployment,
}

/// The vm state an action expects in the `status` column.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RequiredState {
    Stopped,
    Running,
}
impl RequiredState {
    pub fn matches(&self, status: &VmStatus) -> bool {
        match self {
            RequiredState::Stopped => status.is_stopped(),
            RequiredState::Running => status.is_running(),
        }
    }
}

impl Action {
    /// Whether a row is concerned by the action at all.
    pub fn in_scope(&self, record: &VmRecord) -> bool {
        match self {
            Action::Validation | Action::Deployment => true,
            Action::Clone => record.value(Field::Status).is_none(),
            Action::NetworkBridge => {
                record.value(Field::Newid).is_some()
                    && (record.value(Field::Net0).is_some() || record.value(Field::Net1).is_some())
            }
            Action::Start | Action::Stop | Action::Delete | Action::ManagementIp => {
                record.value(Field::Newid).is_some()
            }
        }
    }
    pub fn required_fields(&self) -> &'static [Field] {
        match self {
            Action::Validation | Action::Clone | Action::Deployment => &[
                Field::TargetHost,
                Field::TemplateName,
                Field::Pool,
                Field::Storage,
            ],
            Action::Start
            | Action::Stop
            | Action::Delete
            | Action::NetworkBridge
            | Action::ManagementIp => &[Field::TargetHost, Field::Newid],
        }
    }
    pub fn required_state(&self) -> Option<RequiredState> {
        match self {
            Action::Start | Action::Delete => Some(RequiredState::Stopped),
            Action::Stop | Action::ManagementIp => Some(RequiredState::Running),
            _ => None,
        }
    }
    /// Rules that need the host inventory:
    /// templates, pools, storages and ids in use.
    pub fn provisions(&self) -> bool {
        matches!(self, Action::Validation | Action::Clone | Action::Deployment)
    }
    pub fn checks_bridges(&self) -> bool {
        self.provisions() || matches!(self, Action::NetworkBridge)
    }
    /// The state a row reaches on success, used by deployment
    /// to skip rows that are already there.
    pub fn target_state(&self) -> Option<VmStatus> {
        match self {
            Action::Start => Some(VmStatus::Running),
            Action::Stop => Some(VmStatus::Stopped),
            _ => None,
        }
    }
    /// Gerund used in logs and spinners.
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Validation => "Validating",
            Action::Clone => "Cloning",
            Action::Start => "Starting",
            Action::Stop => "Stopping",
            Action::Delete => "Deleting",
            Action::NetworkBridge => "Configuring network bridges of",
            Action::ManagementIp => "Retrieving management ips of",
            Action::Deployment => "Deploying",
        }
    }
}
