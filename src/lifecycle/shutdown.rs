//! Shutdown completion tracking.

use tokio::task::JoinHandle;

use crate::http::ShutdownReport;

/// Handle on the per-server shutdown tasks spawned by an instance.
///
/// Dropping it leaves the tasks running in the background; awaiting
/// [`ShutdownWaiter::wait`] resolves once every server has stopped.
#[derive(Debug, Default)]
#[must_use = "dropping the waiter does not wait for the servers to stop"]
pub struct ShutdownWaiter {
    tasks: Vec<JoinHandle<ShutdownReport>>,
}

impl ShutdownWaiter {
    pub(crate) fn new(tasks: Vec<JoinHandle<ShutdownReport>>) -> Self {
        Self { tasks }
    }

    /// Number of servers being shut down.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every server; reports come back in server order.
    pub async fn wait(self) -> Vec<ShutdownReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            match task.await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(error = %e, "Server shutdown task failed"),
            }
        }
        reports
    }
}
