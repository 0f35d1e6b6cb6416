mod types;
pub mod utils;
pub use types::*;

use crate::action::Action;
use crate::config::{Credentials, ProxfleetConfig};
use crate::display::{OutcomeTable, ReportTable};
use crate::orchestrator::{ActionRequest, PHASES};
use crate::table::Table;
use crate::validate::ValidationReport;
use utils::*;

use clap::Parser;

// Spinners
use owo_colors::OwoColorize;
use spinoff::{spinners, Spinner};

// Error Handling
use log::info;
use miette::Result;

impl Cli {
    /// Parse arguments and run. Returns whether every concerned row succeeded.
    pub async fn run() -> Result<bool> {
        let cli = Cli::parse();
        let res = Self::switch(cli).await?;
        Ok(res)
    }
    pub async fn switch(cli: Cli) -> Result<bool> {
        set_logger(&cli)?;

        // Fatal errors: nothing has been touched yet.
        let mut table = Table::from_file(&cli.file)?;
        let config = ProxfleetConfig::get(cli.config.as_deref())?;
        let credentials = Credentials::try_from(&cli.credentials)?;
        let request = ActionRequest {
            action: cli.action,
            path: cli.file.clone(),
            config,
            credentials,
        };
        info!(
            "{} {} on {} row(s) of {}",
            "[init]".yellow(),
            request.action,
            table.len(),
            request.path.display()
        );
        let orchestrator = request.orchestrator();

        match request.action {
            /*
             * Check every line against the hosts inventories,
             * without touching the file.
             */
            Action::Validation => {
                let mut sp = Spinner::new(spinners::Toggle5, "Validating csv file...", None);
                let (ok, reports) = orchestrator.check(&table).await;
                if ok {
                    sp.stop_and_persist("✅", "Csv file is valid");
                } else {
                    let message = format!("{} invalid line(s)", reports.len().red());
                    sp.stop_and_persist("⛔️", &message);
                }
                Self::print_reports(&cli, &reports)?;
                Ok(ok)
            }
            /*
             * Run every phase, saving the file after each of them.
             */
            Action::Deployment => {
                let path = request.path.clone();
                let deployment = orchestrator
                    .deploy(&mut table, |phase, table| {
                        table.save(&path)?;
                        println!("{}", print_phase(phase, PHASES.len()));
                        Ok(())
                    })
                    .await?;

                let mut reports = deployment.reports.clone();
                for phase in &deployment.phases {
                    reports.extend(validation_reports(&phase.outcomes));
                }
                Self::print_reports(&cli, &reports)?;
                for phase in &deployment.phases {
                    OutcomeTable::display(OutcomeTable::from_vec(&table, &phase.outcomes))?;
                }
                match deployment.succeeded() {
                    true => println!("✅ {} succeeded", "[deployment]".green()),
                    false if deployment.aborted => {
                        println!("⛔️ {} aborted at validation", "[deployment]".red())
                    }
                    false => println!("⛔️ {} finished with failures", "[deployment]".red()),
                };
                Ok(deployment.succeeded())
            }
            /*
             * A single vm operation on every concerned row.
             */
            action => {
                let message = format!("{} vms...", action.verb());
                let mut sp = Spinner::new(spinners::Toggle5, message, None);
                let outcomes = orchestrator.run(&table, action).await;
                let summary = table.apply(&outcomes);
                table.save(&request.path)?;
                sp.stop_and_persist(
                    summary_symbol(&summary),
                    &print_summary(&action.to_string(), &summary),
                );

                print!("{}", print_response_bulk_op(&action.to_string(), &table, &outcomes)?);
                Self::print_reports(&cli, &validation_reports(&outcomes))?;
                OutcomeTable::display(OutcomeTable::from_vec(&table, &outcomes))?;
                Ok(summary.all_succeeded())
            }
        }
    }

    fn print_reports(cli: &Cli, reports: &[ValidationReport]) -> Result<()> {
        if cli.json {
            ReportTable::display_json(reports)?;
        } else if !reports.is_empty() {
            ReportTable::display(reports)?;
        }
        Ok(())
    }
}
