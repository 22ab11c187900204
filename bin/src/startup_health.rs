use std::time::Duration;

use anyhow::{Result, anyhow};
use exporter_core::tokio::{self, task::JoinHandle};

const STARTUP_STABILIZATION_WINDOW: Duration = Duration::from_millis(300);

/// A task that is still running after the stabilization window counts as
/// started. Binding the listener is the usual reason to exit early.
pub async fn verify_background_task_running(name: &str, task: &mut JoinHandle<()>) -> Result<()> {
    match tokio::time::timeout(STARTUP_STABILIZATION_WINDOW, task).await {
        Err(_) => Ok(()),
        Ok(join_res) => match join_res {
            Ok(()) => Err(anyhow!("{name} exited during startup stabilization window")),
            Err(err) => Err(anyhow!("{name} panicked during startup: {err}")),
        },
    }
}
