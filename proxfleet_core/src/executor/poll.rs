use crate::hypervisor::{Hypervisor, TaskHandle, TaskState};

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

// Error Handling
use log::{trace, warn};

/// Interval and bound of a poll loop.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}
impl PollPolicy {
    pub fn millis(interval: u64, timeout: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval),
            timeout: Duration::from_millis(timeout),
        }
    }
}

/// One observation of the awaited state.
pub enum Probe<T> {
    Ready(T),
    Pending,
    /// Terminal failure, stop polling.
    Fatal(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PollError {
    Timeout(Duration),
    Fatal(String),
}

/// Probe until ready, failed, or the policy bound elapses.
/// The first probe runs immediately.
pub async fn poll<T, F, Fut>(policy: &PollPolicy, mut probe: F) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Probe<T>>,
{
    let waiting = async {
        loop {
            match probe().await {
                Probe::Ready(v) => return Ok(v),
                Probe::Fatal(e) => return Err(PollError::Fatal(e)),
                Probe::Pending => sleep(policy.interval).await,
            }
        }
    };
    match timeout(policy.timeout, waiting).await {
        Ok(res) => res,
        Err(_) => Err(PollError::Timeout(policy.timeout)),
    }
}

/// Wait for a hypervisor task to reach a terminal state.
/// Api errors while polling are transient.
pub async fn wait_task(
    session: &dyn Hypervisor,
    task: &TaskHandle,
    policy: &PollPolicy,
) -> Result<(), PollError> {
    poll(policy, move || async move {
        match session.poll_task(task).await {
            Ok(TaskState::Succeeded) => Probe::Ready(()),
            Ok(TaskState::Failed(status)) => Probe::Fatal(status),
            Ok(TaskState::Pending) => {
                trace!("[{}] task {} pending", session.host(), task);
                Probe::Pending
            }
            Err(e) => {
                warn!("[{}] couldn't poll task {}: {}", session.host(), task, e);
                Probe::Pending
            }
        }
    })
    .await
}
