/*
* The deployment pipeline:
* validation -> clone -> network_bridge -> start -> management_ip.
*
* Each phase only gets the rows that didn't fail a previous one.
* The table is reconciled after every phase so the caller can persist it.
*/
use super::Orchestrator;
use crate::action::Action;
use crate::outcome::OperationOutcome;
use crate::table::{Summary, Table};
use crate::validate::{ValidationReport, Validator};

use std::collections::BTreeSet;

// Error Handling
use log::{info, warn};
use proxfleet_error::ProxfleetError;

pub const PHASES: [Action; 5] = [
    Action::Validation,
    Action::Clone,
    Action::NetworkBridge,
    Action::Start,
    Action::ManagementIp,
];

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Phase {
    /// 1-based position in the pipeline.
    pub step: usize,
    pub action: Action,
    pub outcomes: Vec<OperationOutcome>,
    pub summary: Summary,
}

#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct Deployment {
    /// Table level validation failures.
    pub reports: Vec<ValidationReport>,
    pub phases: Vec<Phase>,
    /// Validation left nothing to deploy.
    pub aborted: bool,
}
impl Deployment {
    pub fn succeeded(&self) -> bool {
        !self.aborted && self.phases.iter().all(|e| e.summary.all_succeeded())
    }
}

impl Orchestrator {
    /**
    Deploy every valid row of the table.

    `on_phase` runs after each phase, once its outcomes are applied
    to the table. An error from it stops the pipeline.
    */
    pub async fn deploy<F>(&self, table: &mut Table, mut on_phase: F) -> Result<Deployment, ProxfleetError>
    where
        F: FnMut(&Phase, &Table) -> Result<(), ProxfleetError>,
    {
        let mut deployment = Deployment {
            reports: Validator::table_reports(table),
            ..Default::default()
        };
        let mut active: BTreeSet<usize> = (0..table.len()).collect();

        for (i, action) in PHASES.iter().enumerate() {
            let step = i + 1;
            info!("[{}/{}] {}", step, PHASES.len(), action);

            let rows: BTreeSet<usize> = match action.target_state() {
                // Rows already there pass through.
                Some(target) => active
                    .iter()
                    .copied()
                    .filter(|e| table.rows[*e].status() != target)
                    .collect(),
                None => active.clone(),
            };
            let outcomes = self.run_rows(table, *action, &rows).await;
            let summary = table.apply(&outcomes);
            for outcome in outcomes.iter().filter(|e| !e.success) {
                active.remove(&outcome.index);
            }
            let phase = Phase {
                step,
                action: *action,
                outcomes,
                summary,
            };
            on_phase(&phase, table)?;
            deployment.phases.push(phase);

            if *action == Action::Validation && (!deployment.reports.is_empty() || active.is_empty()) {
                warn!("Validation failed, nothing to deploy.");
                deployment.aborted = true;
                break;
            }
        }
        Ok(deployment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypervisor::mock::{MockHost, MockProvider};
    use crate::orchestrator::tests::{config, row};
    use crate::outcome::Reason;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn deployment_excludes_invalid_rows() -> miette::Result<()> {
        let provider = MockProvider::new().with_host(
            MockHost::new("pve1")
                .with_template("debian12", 9000)
                .with_guest_ips(&["127.0.0.1", "10.10.1.5"]),
        );
        let host = provider.host("pve1");
        let orchestrator = Orchestrator::new(Arc::new(provider), config(), 4);

        let mut invalid = row("bob");
        invalid.template_name = "".to_owned();
        let mut table = Table::new(vec![row("alice"), invalid.clone(), row("carol")]);

        let mut steps = vec![];
        let deployment = orchestrator
            .deploy(&mut table, |phase, _| {
                steps.push(phase.action);
                Ok(())
            })
            .await?;

        assert_eq!(steps, PHASES.to_vec());
        assert!(!deployment.aborted);
        assert!(!deployment.succeeded());
        assert_eq!(
            deployment.phases[0].outcomes[1].reason,
            Some(Reason::ValidationError)
        );
        assert_eq!(host.calls("clone"), 2);
        assert_eq!(host.calls("start"), 2);

        assert_eq!(table.rows[1], invalid);
        for i in [0, 2] {
            assert_eq!(table.rows[i].status, "running");
            assert_eq!(table.rows[i].ipv4, "10.10.1.5");
            assert!(!table.rows[i].newid.is_empty());
        }
        assert_ne!(table.rows[0].newid, table.rows[2].newid);
        Ok(())
    }

    #[tokio::test]
    async fn empty_table_aborts() -> miette::Result<()> {
        let provider = MockProvider::new().with_host(MockHost::new("pve1"));
        let orchestrator = Orchestrator::new(Arc::new(provider), config(), 4);
        let mut table = Table::new(vec![]);

        let deployment = orchestrator.deploy(&mut table, |_, _| Ok(())).await?;
        assert!(deployment.aborted);
        assert_eq!(deployment.phases.len(), 1);
        assert_eq!(deployment.reports, vec![ValidationReport::table("empty_csv")]);
        Ok(())
    }
}
