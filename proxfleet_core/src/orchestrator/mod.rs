/*
* Batch orchestration.
*
* Selects the rows an action concerns, validates them,
* reserves clone ids, then runs admitted rows concurrently.
* Outcomes are returned in row order.
*/
mod allocate;
mod deployment;

// Reexport
pub use allocate::IdAllocator;
pub use deployment::{Deployment, Phase, PHASES};

use crate::action::Action;
use crate::config::{Credentials, ProxfleetConfig};
use crate::executor::{Executor, ExecutorConfig, Job};
use crate::hypervisor::{ProxmoxProvider, SessionProvider};
use crate::outcome::{OperationOutcome, Reason};
use crate::table::Table;
use crate::validate::{HostRegistry, ValidationReport, Validator};

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;

// Error Handling
use log::{error, info};

/// One invocation: an action on a csv file,
/// with the resolved configuration and credentials.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action: Action,
    pub path: PathBuf,
    pub config: ProxfleetConfig,
    pub credentials: Credentials,
}
impl ActionRequest {
    pub fn orchestrator(&self) -> Orchestrator {
        let provider = ProxmoxProvider::new(&self.config, self.credentials.clone());
        Orchestrator::new(
            Arc::new(provider),
            self.config.executor.to_executor_config(),
            self.config.executor.max_concurrency,
        )
    }
}

pub struct Orchestrator {
    provider: Arc<dyn SessionProvider>,
    executor: Arc<Executor>,
    max_concurrency: usize,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        config: ExecutorConfig,
        max_concurrency: usize,
    ) -> Self {
        let executor = Executor::new(provider.clone(), config);
        Self {
            provider,
            executor: Arc::new(executor),
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Fetch the inventories the validator needs.
    pub async fn discover(&self, table: &Table) -> HostRegistry {
        HostRegistry::discover(self.provider.as_ref(), table).await
    }

    /// Validate the whole table, with table level reports.
    pub async fn check(&self, table: &Table) -> (bool, Vec<ValidationReport>) {
        let registry = self.discover(table).await;
        Validator::new(&registry, table).check(table)
    }

    /// Run an action on every row it concerns.
    /// The outcomes follow the order of the selected rows.
    pub async fn run(&self, table: &Table, action: Action) -> Vec<OperationOutcome> {
        if action == Action::Deployment {
            return self.run_deployment(table).await;
        }
        let rows: BTreeSet<usize> = (0..table.len()).collect();
        self.run_rows(table, action, &rows).await
    }

    /*
     * Deploy a copy of the table and fold the phases
     * into one outcome per row: the last phase it reached,
     * with the updates of every phase it went through.
     */
    async fn run_deployment(&self, table: &Table) -> Vec<OperationOutcome> {
        let mut copy = table.clone();
        let deployment = match self.deploy(&mut copy, |_, _| Ok(())).await {
            Ok(v) => v,
            Err(e) => {
                error!("[deployment] {}", e);
                return vec![];
            }
        };
        let mut merged: BTreeMap<usize, OperationOutcome> = BTreeMap::new();
        for phase in deployment.phases {
            for mut outcome in phase.outcomes {
                if let Some(previous) = merged.remove(&outcome.index) {
                    let mut updates = previous.updates;
                    updates.extend(outcome.updates);
                    outcome.updates = updates;
                }
                merged.insert(outcome.index, outcome);
            }
        }
        let mut outcomes: Vec<OperationOutcome> = merged.into_values().collect();
        if deployment.aborted {
            for outcome in outcomes.iter_mut().filter(|e| e.success) {
                *outcome = OperationOutcome::failed(
                    outcome.index,
                    Reason::ValidationError,
                    "deployment aborted at validation",
                );
            }
        }
        outcomes
    }

    /// Run an action on a subset of rows (0-based positions).
    /// Rows the action doesn't concern are skipped and get no outcome.
    pub async fn run_rows(
        &self,
        table: &Table,
        action: Action,
        rows: &BTreeSet<usize>,
    ) -> Vec<OperationOutcome> {
        let scoped: Vec<usize> = rows
            .iter()
            .copied()
            .filter(|i| table.rows.get(*i).map(|e| action.in_scope(e)).unwrap_or(false))
            .collect();
        info!("[start] {} {} row(s)", action.verb().to_lowercase(), scoped.len());
        if scoped.is_empty() {
            return vec![];
        }

        let registry = self.discover(table).await;
        let validator = Validator::new(&registry, table);
        let mut allocator = IdAllocator::new(&registry, table);

        let mut outcomes: Vec<OperationOutcome> = vec![];
        let mut jobs: Vec<Job> = vec![];
        for index in scoped {
            let record = &table.rows[index];
            let report = validator.validate(index, record, &action);
            if !report.is_ok() {
                info!("[{}/{}] rejected: {:?}", index + 1, table.len(), report.errors);
                outcomes.push(OperationOutcome::rejected(report));
                continue;
            }
            if action == Action::Validation {
                outcomes.push(OperationOutcome::succeeded(index));
                continue;
            }
            let clone = if action == Action::Clone {
                match allocator.plan(record) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        let outcome =
                            OperationOutcome::failed(index, Reason::ValidationError, &e.to_string());
                        outcomes.push(outcome);
                        continue;
                    }
                }
            } else {
                None
            };
            jobs.push(Job {
                index,
                total: table.len(),
                record: record.clone(),
                action,
                clone,
            });
        }

        outcomes.extend(self.dispatch(jobs).await);
        outcomes.sort_by_key(|e| e.index);

        let failed = outcomes.iter().filter(|e| !e.success).count();
        info!(
            "[end] {}: {} succeeded, {} failed",
            action,
            outcomes.len() - failed,
            failed
        );
        outcomes
    }

    /// Run jobs concurrently, at most `max_concurrency` at a time.
    /// A failing job never cancels the others.
    async fn dispatch(&self, jobs: Vec<Job>) -> Vec<OperationOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = vec![];
        for job in jobs {
            let index = job.index;
            let executor = self.executor.clone();
            let semaphore = semaphore.clone();
            let handle = tokio::spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await;
                executor.run(&job).await
            });
            handles.push((index, handle));
        }

        let mut outcomes = vec![];
        for (index, handle) in handles {
            let outcome = match handle.await {
                Ok(v) => v,
                Err(e) => {
                    error!("[{}] worker aborted: {}", index + 1, e);
                    OperationOutcome::failed(index, Reason::TaskFailed, &e.to_string())
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}
