/*
* Vm operation executor.
*
* Runs one action against one vm and polls the hypervisor until
* a terminal state. Every failure ends as an OperationOutcome:
* nothing escapes past `Executor::run`.
*/
pub mod ip;
pub mod network;
pub mod poll;

// Reexport
pub use poll::{PollError, PollPolicy, Probe};

use crate::action::Action;
use crate::config::ExecutorSettings;
use crate::hypervisor::{CloneParams, Hypervisor, PowerState, SessionProvider};
use crate::outcome::{OperationOutcome, Reason};
use crate::table::{Field, VmRecord, VmStatus};
use poll::{poll, wait_task};

use ipnet::Ipv4Net;
use std::sync::Arc;

// Error Handling
use log::{error, info, warn};
use proxfleet_error::ProxfleetError;

/// Poll bounds and address filters of the executor.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExecutorConfig {
    /// Hypervisor task completion.
    pub task: PollPolicy,
    /// Power state transitions after start and stop.
    pub power: PollPolicy,
    /// Guest agent address retrieval.
    pub agent: PollPolicy,
    pub management_subnets: Vec<Ipv4Net>,
}
impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorSettings::default().to_executor_config()
    }
}

/// One admitted row, ready to run.
#[derive(Debug, Clone)]
pub struct Job {
    /// Row position in the table (0-based).
    pub index: usize,
    /// Number of rows in the batch, for log prefixes.
    pub total: usize,
    pub record: VmRecord,
    pub action: Action,
    /// Reserved id, name and template, for clones.
    pub clone: Option<CloneParams>,
}
impl Job {
    fn tag(&self) -> String {
        format!(
            "[{}/{}] [{}]",
            self.index + 1,
            self.total,
            self.record.get(Field::TargetHost)
        )
    }
    /// The vm id of an already provisioned row.
    fn vmid(&self) -> Result<u64, Failure> {
        match self.record.newid() {
            Some(Ok(id)) => Ok(id),
            _ => Err(Failure::new(Reason::ValidationError, "missing newid")),
        }
    }
}

/// Why an operation stopped.
#[derive(Debug, Clone, Eq, PartialEq)]
struct Failure {
    reason: Reason,
    detail: String,
}
impl Failure {
    fn new(reason: Reason, detail: &str) -> Self {
        Self {
            reason,
            detail: detail.to_owned(),
        }
    }
    /// A synchronous refusal of the hypervisor.
    fn rejected(e: ProxfleetError) -> Self {
        Self::new(Reason::RemoteRejected, &e.to_string())
    }
}
impl From<PollError> for Failure {
    fn from(e: PollError) -> Self {
        match e {
            PollError::Timeout(after) => {
                Self::new(Reason::Timeout, &format!("no terminal state after {:?}", after))
            }
            PollError::Fatal(status) => Self::new(Reason::TaskFailed, &status),
        }
    }
}

pub struct Executor {
    provider: Arc<dyn SessionProvider>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(provider: Arc<dyn SessionProvider>, config: ExecutorConfig) -> Self {
        Self { provider, config }
    }

    /// Run a job to its terminal outcome.
    pub async fn run(&self, job: &Job) -> OperationOutcome {
        let tag = job.tag();
        let session = match self.provider.session(job.record.get(Field::TargetHost)).await {
            Ok(v) => v,
            Err(e) => {
                error!("{} {}", tag, e);
                return self.fail(job, Failure::new(Reason::AuthError, &e.to_string()));
            }
        };
        let res = match job.action {
            Action::Clone => self.clone_vm(job, session.as_ref()).await,
            Action::Start => self.start(job, session.as_ref()).await,
            Action::Stop => self.stop(job, session.as_ref()).await,
            Action::Delete => self.delete(job, session.as_ref()).await,
            Action::NetworkBridge => self.network_bridge(job, session.as_ref()).await,
            Action::ManagementIp => self.management_ip(job, session.as_ref()).await,
            // Batch level actions never reach the executor.
            Action::Validation | Action::Deployment => Err(Failure::new(
                Reason::ValidationError,
                &format!("{} is not a vm operation", job.action),
            )),
        };
        match res {
            Ok(outcome) => outcome,
            Err(failure) => {
                error!("{} {} failed: {} ({})", tag, job.action, failure.detail, failure.reason);
                self.fail(job, failure)
            }
        }
    }

    /// Failure outcome with the row failure marker.
    fn fail(&self, job: &Job, failure: Failure) -> OperationOutcome {
        let outcome = OperationOutcome::failed(job.index, failure.reason, &failure.detail);
        match job.action {
            Action::Clone | Action::Start | Action::Stop | Action::Delete => {
                outcome.with(Field::Status, &VmStatus::Error.to_string())
            }
            Action::ManagementIp if failure.reason == Reason::Timeout => {
                outcome.with(Field::Ipv4, "")
            }
            _ => outcome,
        }
    }

    async fn clone_vm(&self, job: &Job, session: &dyn Hypervisor) -> Result<OperationOutcome, Failure> {
        let params = match &job.clone {
            Some(v) => v,
            None => {
                return Err(Failure::new(
                    Reason::ValidationError,
                    "no vm id was reserved for this row",
                ))
            }
        };
        info!(
            "{} [start] cloning vm {} ({}) from template {}",
            job.tag(),
            params.name,
            params.newid,
            params.template
        );
        let task = session
            .submit_clone(params)
            .await
            .map_err(Failure::rejected)?;
        wait_task(session, &task, &self.config.task).await?;
        info!("{} [end] cloned vm {} ({})", job.tag(), params.name, params.newid);

        Ok(OperationOutcome::succeeded(job.index)
            .with(Field::VmName, &params.name)
            .with(Field::Newid, &params.newid.to_string())
            .with(Field::Status, &VmStatus::Cloned.to_string()))
    }

    async fn start(&self, job: &Job, session: &dyn Hypervisor) -> Result<OperationOutcome, Failure> {
        self.power(job, session, PowerState::Running).await
    }
    async fn stop(&self, job: &Job, session: &dyn Hypervisor) -> Result<OperationOutcome, Failure> {
        self.power(job, session, PowerState::Stopped).await
    }

    /// Bring a vm to a power state: submit, wait for the task,
    /// then wait for the host to report the state.
    async fn power(
        &self,
        job: &Job,
        session: &dyn Hypervisor,
        target: PowerState,
    ) -> Result<OperationOutcome, Failure> {
        let vmid = job.vmid()?;
        let status = match target {
            PowerState::Running => VmStatus::Running,
            _ => VmStatus::Stopped,
        };
        let success = OperationOutcome::succeeded(job.index).with(Field::Status, &status.to_string());

        let info = session
            .vm_status(vmid)
            .await
            .map_err(Failure::rejected)?
            .ok_or(Failure::new(
                Reason::RemoteRejected,
                &format!("vm {} doesn't exist", vmid),
            ))?;
        if info.power == target {
            info!("{} vm {} is already {}", job.tag(), vmid, status);
            return Ok(success);
        }

        info!("{} [start] {} vm {}", job.tag(), job.action.verb().to_lowercase(), vmid);
        let task = match target {
            PowerState::Running => session.submit_start(vmid).await,
            _ => session.submit_stop(vmid).await,
        }
        .map_err(Failure::rejected)?;
        wait_task(session, &task, &self.config.task).await?;

        let target = &target;
        poll(&self.config.power, move || async move {
            match session.vm_status(vmid).await {
                Ok(Some(info)) if info.power == *target => Probe::Ready(()),
                Ok(None) => Probe::Fatal(format!("vm {} vanished", vmid)),
                _ => Probe::Pending,
            }
        })
        .await?;
        info!("{} [end] vm {} is {}", job.tag(), vmid, status);
        Ok(success)
    }

    async fn delete(&self, job: &Job, session: &dyn Hypervisor) -> Result<OperationOutcome, Failure> {
        let vmid = job.vmid()?;
        let success = OperationOutcome::succeeded(job.index)
            .with(Field::Status, "")
            .with(Field::Ipv4, "")
            .with(Field::Newid, "");

        let exists = session
            .vm_status(vmid)
            .await
            .map_err(Failure::rejected)?
            .is_some();
        if !exists {
            warn!("{} vm {} doesn't exist anymore, clearing row", job.tag(), vmid);
            return Ok(success);
        }

        info!("{} [start] deleting vm {}", job.tag(), vmid);
        let task = session
            .submit_delete(vmid)
            .await
            .map_err(Failure::rejected)?;
        wait_task(session, &task, &self.config.task).await?;
        info!("{} [end] deleted vm {}", job.tag(), vmid);
        Ok(success)
    }

    async fn network_bridge(
        &self,
        job: &Job,
        session: &dyn Hypervisor,
    ) -> Result<OperationOutcome, Failure> {
        let vmid = job.vmid()?;
        let wanted: Vec<(&str, &str)> = [("net0", Field::Net0), ("net1", Field::Net1)]
            .into_iter()
            .filter_map(|(iface, field)| job.record.value(field).map(|bridge| (iface, bridge)))
            .collect();

        let current = session
            .network_config(vmid)
            .await
            .map_err(Failure::rejected)?;
        let changes = network::plan(&current, &wanted);
        if changes.is_empty() {
            info!("{} vm {} bridges already set", job.tag(), vmid);
            return Ok(OperationOutcome::succeeded(job.index));
        }

        info!("{} [start] setting bridges of vm {}: {:?}", job.tag(), vmid, changes);
        let task = session
            .submit_network_config(vmid, &changes)
            .await
            .map_err(Failure::rejected)?;
        if let Some(task) = task {
            wait_task(session, &task, &self.config.task).await?;
        }
        info!("{} [end] bridges of vm {} set", job.tag(), vmid);
        Ok(OperationOutcome::succeeded(job.index))
    }

    async fn management_ip(
        &self,
        job: &Job,
        session: &dyn Hypervisor,
    ) -> Result<OperationOutcome, Failure> {
        let vmid = job.vmid()?;
        let info = session
            .vm_status(vmid)
            .await
            .map_err(Failure::rejected)?
            .ok_or(Failure::new(
                Reason::RemoteRejected,
                &format!("vm {} doesn't exist", vmid),
            ))?;
        if !info.agent {
            return Err(Failure::new(
                Reason::RemoteRejected,
                "guest agent is disabled in the vm configuration",
            ));
        }

        info!("{} [start] waiting for vm {} management ip", job.tag(), vmid);
        let subnets = self.config.management_subnets.as_slice();
        // Agent errors mean the guest isn't up yet.
        let address = poll(&self.config.agent, move || async move {
            match session.query_guest_ipv4(vmid).await {
                Ok(addresses) => match ip::select(&addresses, subnets) {
                    Some(v) => Probe::Ready(v),
                    None => Probe::Pending,
                },
                Err(_) => Probe::Pending,
            }
        })
        .await?;
        info!("{} [end] vm {} management ip is {}", job.tag(), vmid, address);
        Ok(OperationOutcome::succeeded(job.index).with(Field::Ipv4, &address.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypervisor::mock::{MockHost, MockProvider, MockVm, Script};
    use pretty_assertions::assert_eq;

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            task: PollPolicy::millis(1, 200),
            power: PollPolicy::millis(1, 200),
            agent: PollPolicy::millis(5, 100),
            management_subnets: vec![],
        }
    }

    fn setup(host: MockHost) -> (Executor, Arc<MockHost>) {
        let provider = MockProvider::new().with_host(host);
        let host = provider.host("pve1");
        (Executor::new(Arc::new(provider), config()), host)
    }

    fn job(action: Action, newid: &str, status: &str) -> Job {
        Job {
            index: 0,
            total: 1,
            record: VmRecord {
                student_login: "jdoe".to_owned(),
                target_host: "pve1".to_owned(),
                template_name: "debian12".to_owned(),
                newid: newid.to_owned(),
                status: status.to_owned(),
                net0: "vmbr0".to_owned(),
                ..Default::default()
            },
            action,
            clone: None,
        }
    }

    fn clone_job() -> Job {
        let mut job = job(Action::Clone, "", "");
        job.clone = Some(CloneParams {
            template: 9000,
            newid: 120,
            name: "jdoe".to_owned(),
            pool: "students".to_owned(),
            storage: "local-lvm".to_owned(),
        });
        job
    }

    #[tokio::test]
    async fn clone_fills_result_fields() -> miette::Result<()> {
        let (executor, host) = setup(MockHost::new("pve1").with_template("debian12", 9000));
        let job = clone_job();
        let outcome = executor.run(&job).await;

        assert!(outcome.success);
        let mut record = job.record.clone();
        outcome.apply_to(&mut record);
        assert_eq!(record.vm_name, "jdoe");
        assert_eq!(record.newid, "120");
        assert_eq!(record.status, "cloned");
        assert!(host.vm(120).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn clone_task_failure_keeps_fields_empty() -> miette::Result<()> {
        let (executor, _) = setup(
            MockHost::new("pve1").script("clone", Script::Fail("storage full".to_owned())),
        );
        let job = clone_job();
        let outcome = executor.run(&job).await;

        assert!(!outcome.success);
        assert_eq!(outcome.reason, Some(Reason::TaskFailed));
        let mut record = job.record.clone();
        outcome.apply_to(&mut record);
        assert_eq!(record.vm_name, "");
        assert_eq!(record.newid, "");
        assert_eq!(record.status, "error");
        Ok(())
    }

    #[tokio::test]
    async fn clone_rejected_and_hanging() -> miette::Result<()> {
        let (executor, _) = setup(
            MockHost::new("pve1").script("clone", Script::Reject("bad template".to_owned())),
        );
        let outcome = executor.run(&clone_job()).await;
        assert_eq!(outcome.reason, Some(Reason::RemoteRejected));

        let (executor, _) = setup(MockHost::new("pve1").script("clone", Script::Hang));
        let outcome = executor.run(&clone_job()).await;
        assert_eq!(outcome.reason, Some(Reason::Timeout));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_session_is_auth_error() -> miette::Result<()> {
        let (executor, _) = setup(MockHost::new("pve1"));
        let mut job = job(Action::Start, "101", "stopped");
        job.record.target_host = "pve2".to_owned();
        let outcome = executor.run(&job).await;
        assert_eq!(outcome.reason, Some(Reason::AuthError));
        Ok(())
    }

    #[tokio::test]
    async fn start_and_stop() -> miette::Result<()> {
        let (executor, host) = setup(MockHost::new("pve1").with_vm(101, MockVm::default()));

        let outcome = executor.run(&job(Action::Start, "101", "stopped")).await;
        assert!(outcome.success);
        assert_eq!(outcome.updates.get(&Field::Status).map(|e| e.as_str()), Some("running"));
        assert_eq!(host.vm(101).map(|e| e.power), Some(PowerState::Running));

        let outcome = executor.run(&job(Action::Stop, "101", "running")).await;
        assert!(outcome.success);
        assert_eq!(outcome.updates.get(&Field::Status).map(|e| e.as_str()), Some("stopped"));
        assert_eq!(host.calls("start"), 1);
        assert_eq!(host.calls("stop"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn start_running_vm_submits_nothing() -> miette::Result<()> {
        let (executor, host) = setup(MockHost::new("pve1").with_vm(101, MockVm::running()));
        let outcome = executor.run(&job(Action::Start, "101", "stopped")).await;
        assert!(outcome.success);
        assert_eq!(host.calls("start"), 0);
        Ok(())
    }

    #[tokio::test]
    async fn delete_clears_result_fields() -> miette::Result<()> {
        let (executor, host) = setup(MockHost::new("pve1").with_vm(101, MockVm::default()));
        let mut job = job(Action::Delete, "101", "stopped");
        job.record.ipv4 = "10.10.1.5".to_owned();
        let outcome = executor.run(&job).await;
        assert!(outcome.success);

        let mut record = job.record.clone();
        outcome.apply_to(&mut record);
        assert_eq!(record.newid, "");
        assert_eq!(record.ipv4, "");
        assert_eq!(record.status, "");
        assert_eq!(record.template_name, "debian12");
        assert_eq!(record.student_login, "jdoe");
        assert!(host.vm(101).is_none());

        // Already gone.
        let outcome = executor.run(&job).await;
        assert!(outcome.success);
        assert_eq!(host.calls("delete"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn network_bridge_is_idempotent() -> miette::Result<()> {
        let (executor, host) = setup(MockHost::new("pve1").with_vm(101, MockVm::default()));
        let mut job = job(Action::NetworkBridge, "101", "cloned");
        job.record.net1 = "vmbr1".to_owned();

        let outcome = executor.run(&job).await;
        assert!(outcome.success);
        assert!(outcome.updates.is_empty());
        assert_eq!(host.calls("network"), 1);
        let net1 = host.vm(101).and_then(|e| e.net.get("net1").cloned());
        assert_eq!(net1, Some("model=virtio,bridge=vmbr1".to_owned()));

        let outcome = executor.run(&job).await;
        assert!(outcome.success);
        assert_eq!(host.calls("network"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn management_ip_found() -> miette::Result<()> {
        let vm = MockVm::running().with_ips(&["127.0.0.1", "10.10.1.5"]);
        let (executor, _) = setup(MockHost::new("pve1").with_vm(101, vm));
        let outcome = executor.run(&job(Action::ManagementIp, "101", "running")).await;
        assert!(outcome.success);
        assert_eq!(outcome.updates.get(&Field::Ipv4).map(|e| e.as_str()), Some("10.10.1.5"));
        assert_eq!(outcome.updates.get(&Field::Status), None);
        Ok(())
    }

    #[tokio::test]
    async fn management_ip_timeout() -> miette::Result<()> {
        let vm = MockVm::running().with_ips(&["127.0.0.1"]);
        let (executor, _) = setup(MockHost::new("pve1").with_vm(101, vm));
        let job = job(Action::ManagementIp, "101", "running");
        let outcome = executor.run(&job).await;

        assert_eq!(outcome.reason, Some(Reason::Timeout));
        let mut record = job.record.clone();
        outcome.apply_to(&mut record);
        assert_eq!(record.ipv4, "");
        assert_eq!(record.status, "running");
        Ok(())
    }

    #[tokio::test]
    async fn management_ip_needs_agent() -> miette::Result<()> {
        let vm = MockVm {
            agent: false,
            ..MockVm::running()
        };
        let (executor, _) = setup(MockHost::new("pve1").with_vm(101, vm));
        let outcome = executor.run(&job(Action::ManagementIp, "101", "running")).await;
        assert_eq!(outcome.reason, Some(Reason::RemoteRejected));
        Ok(())
    }
}
