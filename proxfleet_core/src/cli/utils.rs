use crate::cli::Cli;
use crate::orchestrator::Phase;
use crate::outcome::OperationOutcome;
use crate::table::{Field, Summary, Table};
use crate::validate::ValidationReport;

use owo_colors::OwoColorize;

// Error handling
use proxfleet_error::ProxfleetError;

// Logger
use env_logger::Builder;

/// Build logger
pub fn set_logger(cli: &Cli) -> Result<(), ProxfleetError> {
    // Set verbosity
    let verbosity: log::LevelFilter = cli.verbose.log_level_filter();
    // Disable http client logs
    let filter = format!(
        "{},{}",
        verbosity.to_string().to_lowercase(),
        "reqwest=error,hyper=error,hyper_util=error,rustls=error"
    );
    std::env::set_var("PROXFLEET_LOG", filter);
    Builder::from_env("PROXFLEET_LOG").init();

    Ok(())
}

/// How a row is named in messages: its vm name, else its line.
fn row_name(table: &Table, index: usize) -> String {
    let record = table.rows.get(index);
    match record.and_then(|e| e.value(Field::VmName).map(|e| e.to_owned())) {
        Some(name) => format!("vm/{}", name.bold().blue()),
        None => match record.and_then(|e| e.derived_vm_name()) {
            Some(name) => format!("vm/{}", name.bold().blue()),
            None => format!("line/{}", (index + 1).bold().blue()),
        },
    }
}

/// Print the result of an bulk operation on multiple rows.
pub fn print_response_bulk_op(
    tag: &str,
    table: &Table,
    outcomes: &[OperationOutcome],
) -> Result<String, ProxfleetError> {
    let tag = format!("[{tag}]");
    let indent = " ".repeat(2);

    let mut message = "".to_owned();
    for success in [true, false] {
        let names: Vec<String> = outcomes
            .iter()
            .filter(|e| e.success == success)
            .map(|e| {
                let host = table
                    .rows
                    .get(e.index)
                    .map(|r| r.get(Field::TargetHost).to_owned())
                    .unwrap_or_default();
                format!("{indent}{} on host {}", row_name(table, e.index), host.green())
            })
            .collect();
        if names.is_empty() {
            continue;
        }
        let names = names.join("\n");
        match success {
            true => {
                message += &format!("✅ {} succeeded for vms [\n{}\n]\n", tag.green(), names);
            }
            false => {
                message += &format!("⛔️ {} failed for vms [\n{}\n]\n", tag.red(), names);
            }
        }
    }
    Ok(message)
}

/// One line run summary.
pub fn print_summary(tag: &str, summary: &Summary) -> String {
    format!(
        "[{}] {} row(s) in scope: {} succeeded, {} failed, {} skipped",
        tag,
        summary.in_scope(),
        summary.succeeded().green(),
        summary.failed().red(),
        summary.skipped()
    )
}

pub fn summary_symbol(summary: &Summary) -> &'static str {
    match summary.all_succeeded() {
        true => "✅",
        false => "⛔️",
    }
}

/// Deployment progress line.
pub fn print_phase(phase: &Phase, steps: usize) -> String {
    let summary = print_summary(&phase.action.to_string(), &phase.summary);
    format!("[{}/{}] {}", phase.step, steps, summary)
}

/// Validation reports carried by rejected rows.
pub fn validation_reports(outcomes: &[OperationOutcome]) -> Vec<ValidationReport> {
    outcomes
        .iter()
        .filter_map(|e| e.validation.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Reason;
    use crate::table::VmRecord;

    #[test]
    fn bulk_message_lists_rows() -> miette::Result<()> {
        let table = Table::new(vec![
            VmRecord {
                student_login: "jdoe".to_owned(),
                target_host: "pve1".to_owned(),
                ..Default::default()
            },
            VmRecord::default(),
        ]);
        let outcomes = vec![
            OperationOutcome::succeeded(0),
            OperationOutcome::failed(1, Reason::Timeout, "no terminal state"),
        ];
        let message = print_response_bulk_op("clone", &table, &outcomes)?;
        assert!(message.contains("succeeded"));
        assert!(message.contains("jdoe"));
        assert!(message.contains("failed"));
        Ok(())
    }

    #[test]
    fn summary_symbol_follows_failures() {
        let failed = Summary {
            rows: vec![Some(true), Some(false)],
        };
        let succeeded = Summary {
            rows: vec![Some(true), None],
        };
        assert_eq!(summary_symbol(&failed), "⛔️");
        assert_eq!(summary_symbol(&succeeded), "✅");
    }

    #[test]
    fn summary_line() {
        let summary = Summary {
            rows: vec![Some(true), None, Some(false)],
        };
        let line = print_summary("stop", &summary);
        assert!(line.starts_with("[stop] 2 row(s) in scope"));
    }
}
