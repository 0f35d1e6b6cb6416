use crate::table::{Field, VmRecord};
use crate::validate::ValidationReport;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

/// Why a row failed.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Missing/invalid field or wrong vm state, the row never reached the executor.
    ValidationError,
    /// Generated or supplied newid collides within the batch or on the host.
    DuplicateIdError,
    /// No session could be opened on the row's target host.
    AuthError,
    /// The hypervisor refused the request synchronously.
    RemoteRejected,
    /// The hypervisor task ended in failure.
    TaskFailed,
    /// A poll loop exceeded its bound.
    Timeout,
}

/// The result of an action on one row.
///
/// Carries the field updates the reconciler applies to the row,
/// the executor never writes to the table itself.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Row position in the table (0-based).
    pub index: usize,
    pub success: bool,
    pub reason: Option<Reason>,
    pub detail: Option<String>,
    pub updates: BTreeMap<Field, String>,
    /// Set when the row was refused by the validator.
    pub validation: Option<ValidationReport>,
}

impl OperationOutcome {
    pub fn succeeded(index: usize) -> Self {
        Self {
            index,
            success: true,
            reason: None,
            detail: None,
            updates: BTreeMap::new(),
            validation: None,
        }
    }
    pub fn failed(index: usize, reason: Reason, detail: &str) -> Self {
        Self {
            index,
            success: false,
            reason: Some(reason),
            detail: Some(detail.to_owned()),
            updates: BTreeMap::new(),
            validation: None,
        }
    }
    pub fn rejected(report: ValidationReport) -> Self {
        let reason = report.reason();
        let detail = format!("invalid fields [{}]", report.fields().join(","));
        let mut outcome = Self::failed(report.index(), reason, &detail);
        outcome.validation = Some(report);
        outcome
    }
    /// Queue a field update.
    pub fn with(mut self, field: Field, value: &str) -> Self {
        self.updates.insert(field, value.to_owned());
        self
    }
    /// Write the queued updates into a row.
    pub fn apply_to(&self, record: &mut VmRecord) {
        for (field, value) in &self.updates {
            record.set(*field, value);
        }
    }
}
