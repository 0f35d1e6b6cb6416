use crate::outcome::{OperationOutcome, Reason};
use crate::table::{Field, Table};

use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};
use tabled::{
    settings::{disable::Remove, location::ByColumnName, Style},
    Table as TabledTable, Tabled,
};

// Error Handling
use log::{log_enabled, Level};
use proxfleet_error::ProxfleetError;

/// One row result, as printed after a batch.
#[derive(Default, Debug, Serialize, Deserialize, Clone, Eq, PartialEq, Tabled)]
pub struct OutcomeTable {
    pub line: usize,
    pub vm_name: String,
    pub target_host: String,
    #[tabled(display("display_success"))]
    pub success: bool,
    #[tabled(display("display_reason"))]
    pub reason: Option<Reason>,
    #[tabled(display("display_detail"))]
    pub detail: Option<String>,
}

impl OutcomeTable {
    pub fn from(table: &Table, outcome: &OperationOutcome) -> Self {
        let record = table.rows.get(outcome.index);
        let cell = |field: Field| {
            record
                .map(|e| e.get(field).to_owned())
                .unwrap_or_default()
        };
        Self {
            line: outcome.index + 1,
            vm_name: cell(Field::VmName),
            target_host: cell(Field::TargetHost),
            success: outcome.success,
            reason: outcome.reason,
            detail: outcome.detail.clone(),
        }
    }
    pub fn from_vec(table: &Table, outcomes: &[OperationOutcome]) -> Vec<Self> {
        outcomes.iter().map(|e| Self::from(table, e)).collect()
    }

    /// Print failed rows, or every row in debug mode.
    pub fn display(items: Vec<Self>) -> Result<(), ProxfleetError> {
        let items: Vec<Self> = if log_enabled!(Level::Debug) {
            items
        } else {
            items.into_iter().filter(|e| !e.success).collect()
        };
        if items.is_empty() {
            return Ok(());
        }
        let mut res = TabledTable::new(&items);
        if !log_enabled!(Level::Info) {
            res.with(Remove::column(ByColumnName::new("detail")));
        }
        res.with(Style::rounded());
        println!("{}", res);
        Ok(())
    }
}

pub fn display_success(success: &bool) -> String {
    match success {
        true => "ok".green().to_string(),
        false => "failed".red().to_string(),
    }
}
pub fn display_reason(reason: &Option<Reason>) -> String {
    match reason {
        Some(Reason::Timeout) => Reason::Timeout.yellow().to_string(),
        Some(v) => v.red().to_string(),
        None => "".to_owned(),
    }
}
pub fn display_detail(detail: &Option<String>) -> String {
    detail.clone().unwrap_or_default()
}
