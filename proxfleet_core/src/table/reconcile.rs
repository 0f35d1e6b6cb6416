use super::Table;
use crate::outcome::OperationOutcome;

use serde::{Deserialize, Serialize};

// Error Handling
use log::{debug, warn};

/// Per-row result of a batch: None for rows the action did not touch.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub rows: Vec<Option<bool>>,
}
impl Summary {
    pub fn succeeded(&self) -> usize {
        self.rows.iter().filter(|e| **e == Some(true)).count()
    }
    pub fn failed(&self) -> usize {
        self.rows.iter().filter(|e| **e == Some(false)).count()
    }
    pub fn skipped(&self) -> usize {
        self.rows.iter().filter(|e| e.is_none()).count()
    }
    pub fn in_scope(&self) -> usize {
        self.rows.len() - self.skipped()
    }
    /// One boolean per row, untouched rows count as succeeded.
    pub fn per_row(&self) -> Vec<bool> {
        self.rows.iter().map(|e| e.unwrap_or(true)).collect()
    }
    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

impl Table {
    /*
     * Merge outcomes into the rows they belong to.
     * Only the fields named by an outcome are written,
     * row order and every other column are left as is.
     */
    pub fn apply(&mut self, outcomes: &[OperationOutcome]) -> Summary {
        let mut summary = Summary {
            rows: vec![None; self.rows.len()],
        };
        for outcome in outcomes {
            match self.rows.get_mut(outcome.index) {
                Some(record) => {
                    outcome.apply_to(record);
                    summary.rows[outcome.index] = Some(outcome.success);
                    if !outcome.updates.is_empty() {
                        debug!(
                            "Row {}: updated [{}]",
                            outcome.index + 1,
                            outcome
                                .updates
                                .keys()
                                .map(|e| e.to_string())
                                .collect::<Vec<String>>()
                                .join(",")
                        );
                    }
                }
                None => {
                    warn!("Dropped outcome for unknown row {}", outcome.index + 1);
                }
            }
        }
        summary
    }
    /// Same as apply(), leaving self untouched.
    pub fn reconciled(&self, outcomes: &[OperationOutcome]) -> (Table, Summary) {
        let mut table = self.clone();
        let summary = table.apply(outcomes);
        (table, summary)
    }
}
