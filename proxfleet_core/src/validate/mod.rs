/*
* Row validation.
*
* Checks a row against the action requirements and the host registry.
* Never mutates a row and never touches the network:
* the registry is discovered beforehand by the orchestrator.
*/
mod registry;

// Reexport
pub use registry::{HostRegistry, HostState};

use crate::action::Action;
use crate::outcome::Reason;
use crate::table::{Field, Table, VmRecord};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use strum::{Display, EnumString};

/// What is wrong with a field.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Issue {
    Missing,
    /// Not found in the registry (host, template, pool, storage, bridge).
    Unknown,
    /// Unparsable value.
    Invalid,
    /// Vm id used twice in the batch.
    Duplicate,
    /// Vm id already used on the host.
    InUse,
    /// The host inventory could not be fetched.
    Unreachable,
    /// The row status doesn't match the action precondition.
    WrongState,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FieldError {
    pub field: Field,
    pub issue: Issue,
}
impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.field, self.issue)
    }
}

/**
The validation result of one csv line.

Serialized as `{"line": 2, "errors": ["template_name"]}`.
Lines are 1-based with the header excluded,
line 0 is reserved for table level errors.
*/
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub line: usize,
    pub errors: Vec<String>,
    #[serde(skip)]
    pub issues: Vec<FieldError>,
}

impl ValidationReport {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            errors: vec![],
            issues: vec![],
        }
    }
    /// A table level report on line 0.
    pub fn table(error: &str) -> Self {
        Self {
            line: 0,
            errors: vec![error.to_owned()],
            issues: vec![],
        }
    }
    pub fn push(&mut self, field: Field, issue: Issue) {
        let name = field.to_string();
        if !self.errors.contains(&name) {
            self.errors.push(name);
        }
        self.issues.push(FieldError { field, issue });
    }
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
    /// Row position in the table (0-based).
    pub fn index(&self) -> usize {
        self.line.saturating_sub(1)
    }
    pub fn fields(&self) -> Vec<String> {
        self.errors.clone()
    }
    /**
    A host that couldn't be reached is a session failure,
    whatever else is wrong with the row.
    Then id collisions take precedence over any other field error.
    */
    pub fn reason(&self) -> Reason {
        let unreachable = self.issues.iter().any(|e| e.issue == Issue::Unreachable);
        let collides = self
            .issues
            .iter()
            .any(|e| matches!(e.issue, Issue::Duplicate | Issue::InUse));
        if unreachable {
            Reason::AuthError
        } else if collides {
            Reason::DuplicateIdError
        } else {
            Reason::ValidationError
        }
    }
}

/// Validates rows of one batch.
pub struct Validator<'a> {
    registry: &'a HostRegistry,
    /// Occurrences of each vm id in the batch.
    ids: HashMap<u64, usize>,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a HostRegistry, table: &Table) -> Self {
        let mut ids: HashMap<u64, usize> = HashMap::new();
        for record in &table.rows {
            if let Some(Ok(id)) = record.newid() {
                *ids.entry(id).or_default() += 1;
            }
        }
        Self { registry, ids }
    }

    /// Validate the row at `index` (0-based) for an action.
    pub fn validate(&self, index: usize, record: &VmRecord, action: &Action) -> ValidationReport {
        let mut report = ValidationReport::new(index + 1);

        // Identity
        if action.provisions() && record.value(Field::StudentLogin).is_none() {
            for field in [Field::StudentName, Field::StudentFirstname] {
                if record.value(field).is_none() {
                    report.push(field, Issue::Missing);
                }
            }
            if !report.is_ok() {
                report.push(Field::StudentLogin, Issue::Missing);
            }
        }

        for field in action.required_fields() {
            if record.value(*field).is_none() {
                report.push(*field, Issue::Missing);
            }
        }

        self.check_host(record, action, &mut report);
        self.check_newid(record, action, &mut report);

        if let Some(state) = action.required_state() {
            if !state.matches(&record.status()) {
                report.push(Field::Status, Issue::WrongState);
            }
        }
        report
    }

    /// Registry lookups: host, then template, pool, storage and bridges
    /// when the host could be reached.
    fn check_host(&self, record: &VmRecord, action: &Action, report: &mut ValidationReport) {
        let host = match record.value(Field::TargetHost) {
            Some(v) => v,
            None => return,
        };
        let inventory = match self.registry.get(host) {
            None => {
                report.push(Field::TargetHost, Issue::Unknown);
                return;
            }
            Some(HostState::Unreachable(_)) => {
                if action.provisions() {
                    report.push(Field::TargetHost, Issue::Unreachable);
                }
                return;
            }
            Some(HostState::Reachable(inventory)) => inventory,
        };
        if action.provisions() {
            if let Some(template) = record.value(Field::TemplateName) {
                if !inventory.templates.contains_key(template) {
                    report.push(Field::TemplateName, Issue::Unknown);
                }
            }
            if let Some(pool) = record.value(Field::Pool) {
                if !inventory.pools.contains(pool) {
                    report.push(Field::Pool, Issue::Unknown);
                }
            }
            if let Some(storage) = record.value(Field::Storage) {
                if !inventory.storages.contains(storage) {
                    report.push(Field::Storage, Issue::Unknown);
                }
            }
        }
        if action.checks_bridges() {
            for field in [Field::Net0, Field::Net1] {
                if let Some(bridge) = record.value(field) {
                    if !inventory.bridges.contains(bridge) {
                        report.push(field, Issue::Unknown);
                    }
                }
            }
        }
    }

    fn check_newid(&self, record: &VmRecord, action: &Action, report: &mut ValidationReport) {
        let id = match record.newid() {
            None => return,
            Some(Err(_)) => {
                report.push(Field::Newid, Issue::Invalid);
                return;
            }
            Some(Ok(id)) => id,
        };
        if self.ids.get(&id).copied().unwrap_or_default() > 1 {
            report.push(Field::Newid, Issue::Duplicate);
            return;
        }
        // A supplied id for a vm that doesn't exist yet
        // must be free on the host.
        let unprovisioned = record.value(Field::Status).is_none();
        if action.provisions() && unprovisioned {
            let inventory = record
                .value(Field::TargetHost)
                .and_then(|e| self.registry.inventory(e));
            if let Some(inventory) = inventory {
                if inventory.vm_ids.contains(&id) {
                    report.push(Field::Newid, Issue::InUse);
                }
            }
        }
    }

    /// Table level reports: unexpected header, no data rows.
    pub fn table_reports(table: &Table) -> Vec<ValidationReport> {
        let mut reports: Vec<ValidationReport> = vec![];
        if !table.has_canonical_header() {
            reports.push(ValidationReport::table("header"));
        }
        if table.is_empty() {
            reports.push(ValidationReport::table("empty_csv"));
        }
        reports
    }

    /**
    Validate every row of a table with the action neutral rules
    of the `validation` action.

    Doesn't stop at the first failure: every invalid line is reported,
    preceded by the table level reports (line 0).
    */
    pub fn check(&self, table: &Table) -> (bool, Vec<ValidationReport>) {
        let mut reports = Self::table_reports(table);
        for (index, record) in table.rows.iter().enumerate() {
            let report = self.validate(index, record, &Action::Validation);
            if !report.is_ok() {
                reports.push(report);
            }
        }
        (reports.is_empty(), reports)
    }
}
