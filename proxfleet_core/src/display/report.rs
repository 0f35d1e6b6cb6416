use crate::validate::ValidationReport;

use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

// Error Handling
use proxfleet_error::ProxfleetError;

/// A validation report, line 0 being the table itself.
#[derive(Default, Debug, Serialize, Deserialize, Clone, Eq, PartialEq, Tabled)]
pub struct ReportTable {
    #[tabled(display("display_line"))]
    pub line: usize,
    #[tabled(display("display_errors"))]
    pub errors: Vec<String>,
}

impl ReportTable {
    pub fn from(report: &ValidationReport) -> Self {
        Self {
            line: report.line,
            errors: report.errors.clone(),
        }
    }
    pub fn display(reports: &[ValidationReport]) -> Result<(), ProxfleetError> {
        let items: Vec<Self> = reports.iter().map(Self::from).collect();
        let mut res = Table::new(&items);
        res.with(Style::rounded());
        println!("{}", res);
        Ok(())
    }
    /// Machine readable output: `[{"line":2,"errors":["template_name"]}]`.
    pub fn display_json(reports: &[ValidationReport]) -> Result<(), ProxfleetError> {
        println!("{}", serde_json::to_string_pretty(reports)?);
        Ok(())
    }
}

pub fn display_line(line: &usize) -> String {
    match line {
        0 => "table".yellow().to_string(),
        v => v.to_string(),
    }
}
pub fn display_errors(errors: &Vec<String>) -> String {
    errors
        .iter()
        .map(|e| e.red().to_string())
        .collect::<Vec<String>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn table_line_label() {
        assert!(display_line(&0).contains("table"));
        assert_eq!(display_line(&3), "3");
    }
}
