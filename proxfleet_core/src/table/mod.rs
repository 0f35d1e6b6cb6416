/*
* The batch table.
*
* One row per virtual machine, in the order of the csv file.
* Rows are never reordered, inserted or removed by proxfleet:
* only the result columns (vm_name, newid, ipv4, status) are rewritten
* by the reconciler.
*/
mod file;
mod reconcile;

// Reexport
pub use reconcile::Summary;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

// Error Handling
use proxfleet_error::{LibError, ProxfleetError};

/// A csv column.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Field {
    StudentName,
    StudentFirstname,
    StudentLogin,
    TargetHost,
    VmName,
    TemplateName,
    Pool,
    Storage,
    Newid,
    Net0,
    Net1,
    Ipv4,
    Status,
}
impl Field {
    /// The canonical header, in file order.
    pub fn columns() -> Vec<String> {
        Field::iter().map(|e| e.to_string()).collect()
    }
}

/// One virtual machine, as described by one csv line.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct VmRecord {
    pub student_name: String,
    pub student_firstname: String,
    pub student_login: String,
    pub target_host: String,
    pub vm_name: String,
    pub template_name: String,
    pub pool: String,
    pub storage: String,
    pub newid: String,
    pub net0: String,
    pub net1: String,
    pub ipv4: String,
    pub status: String,
    /// Columns proxfleet doesn't know, written back as is.
    #[serde(skip)]
    pub extra: BTreeMap<String, String>,
}

impl VmRecord {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::StudentName => &self.student_name,
            Field::StudentFirstname => &self.student_firstname,
            Field::StudentLogin => &self.student_login,
            Field::TargetHost => &self.target_host,
            Field::VmName => &self.vm_name,
            Field::TemplateName => &self.template_name,
            Field::Pool => &self.pool,
            Field::Storage => &self.storage,
            Field::Newid => &self.newid,
            Field::Net0 => &self.net0,
            Field::Net1 => &self.net1,
            Field::Ipv4 => &self.ipv4,
            Field::Status => &self.status,
        }
    }
    pub fn set(&mut self, field: Field, value: &str) {
        let slot = match field {
            Field::StudentName => &mut self.student_name,
            Field::StudentFirstname => &mut self.student_firstname,
            Field::StudentLogin => &mut self.student_login,
            Field::TargetHost => &mut self.target_host,
            Field::VmName => &mut self.vm_name,
            Field::TemplateName => &mut self.template_name,
            Field::Pool => &mut self.pool,
            Field::Storage => &mut self.storage,
            Field::Newid => &mut self.newid,
            Field::Net0 => &mut self.net0,
            Field::Net1 => &mut self.net1,
            Field::Ipv4 => &mut self.ipv4,
            Field::Status => &mut self.status,
        };
        *slot = value.to_owned();
    }
    /// Trimmed cell value, None when empty.
    pub fn value(&self, field: Field) -> Option<&str> {
        let value = self.get(field).trim();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
    /// The parsed vm id, None when the cell is empty.
    pub fn newid(&self) -> Option<Result<u64, ProxfleetError>> {
        self.value(Field::Newid).map(|e| {
            let id = e.parse::<u64>()?;
            if id == 0 {
                return Err(LibError::builder()
                    .msg("Vm id must be a positive integer.")
                    .help("")
                    .build()
                    .into());
            }
            Ok(id)
        })
    }
    pub fn status(&self) -> VmStatus {
        // Infallible.
        VmStatus::from_str(self.get(Field::Status)).unwrap_or_default()
    }
    /// Name derived from the student identity:
    /// the login, or the name followed by the firstname initial.
    pub fn derived_vm_name(&self) -> Option<String> {
        if let Some(login) = self.value(Field::StudentLogin) {
            return Some(login.to_owned());
        }
        match (
            self.value(Field::StudentName),
            self.value(Field::StudentFirstname),
        ) {
            (Some(name), Some(firstname)) => {
                let initial = firstname.chars().next()?;
                Some(format!("{name}{initial}"))
            }
            _ => None,
        }
    }
}

/// The value of the `status` column.
#[derive(Default, Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum VmStatus {
    /// Not provisioned yet.
    #[default]
    Empty,
    Cloned,
    Running,
    Stopped,
    /// Failure marker left by a previous run.
    Error,
    Other(String),
}
impl VmStatus {
    /// A freshly cloned vm is powered off.
    pub fn is_stopped(&self) -> bool {
        matches!(self, VmStatus::Stopped | VmStatus::Cloned)
    }
    pub fn is_running(&self) -> bool {
        matches!(self, VmStatus::Running)
    }
}
impl FromStr for VmStatus {
    type Err = ProxfleetError;
    fn from_str(s: &str) -> Result<Self, ProxfleetError> {
        let res = match s.trim() {
            "" => VmStatus::Empty,
            "cloned" => VmStatus::Cloned,
            "running" => VmStatus::Running,
            "stopped" => VmStatus::Stopped,
            "error" => VmStatus::Error,
            other => VmStatus::Other(other.to_owned()),
        };
        Ok(res)
    }
}
impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let string = match self {
            VmStatus::Empty => "",
            VmStatus::Cloned => "cloned",
            VmStatus::Running => "running",
            VmStatus::Stopped => "stopped",
            VmStatus::Error => "error",
            VmStatus::Other(v) => v,
        };
        write!(f, "{}", string)
    }
}

/// The whole csv file held in memory.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Table {
    /// Header as read from the file.
    pub header: Vec<String>,
    /// Detected field delimiter.
    pub delimiter: u8,
    pub rows: Vec<VmRecord>,
}
impl Default for Table {
    fn default() -> Self {
        Self {
            header: Field::columns(),
            delimiter: b';',
            rows: vec![],
        }
    }
}
impl Table {
    pub fn new(rows: Vec<VmRecord>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    pub fn has_canonical_header(&self) -> bool {
        self.header == Field::columns()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn canonical_columns_follow_file_order() {
        let columns = Field::columns();
        assert_eq!(columns.first().map(|e| e.as_str()), Some("student_name"));
        assert_eq!(columns.get(8).map(|e| e.as_str()), Some("newid"));
        assert_eq!(columns.last().map(|e| e.as_str()), Some("status"));
        assert_eq!(columns.len(), 13);
    }

    #[test]
    fn derive_name_from_identity() {
        let mut record = VmRecord {
            student_name: "dupont".to_owned(),
            student_firstname: "jean".to_owned(),
            ..Default::default()
        };
        assert_eq!(record.derived_vm_name(), Some("dupontj".to_owned()));

        record.student_login = "jdupont".to_owned();
        assert_eq!(record.derived_vm_name(), Some("jdupont".to_owned()));

        let anonymous = VmRecord::default();
        assert_eq!(anonymous.derived_vm_name(), None);
    }

    #[test]
    fn parse_newid() {
        let mut record = VmRecord::default();
        assert!(record.newid().is_none());

        record.newid = " 120 ".to_owned();
        assert_eq!(record.newid().map(|e| e.ok()), Some(Some(120)));

        record.newid = "abc".to_owned();
        assert!(matches!(record.newid(), Some(Err(_))));

        record.newid = "0".to_owned();
        assert!(matches!(record.newid(), Some(Err(_))));
    }

    #[test]
    fn status_round_trip_keeps_unknown_values() {
        let status = VmStatus::from_str("paused").unwrap();
        assert_eq!(status, VmStatus::Other("paused".to_owned()));
        assert_eq!(status.to_string(), "paused");
        assert!(VmStatus::Cloned.is_stopped());
        assert!(!VmStatus::Empty.is_stopped());
    }
}
