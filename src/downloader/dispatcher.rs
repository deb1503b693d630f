use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::AcquireError;
use tokio::task::JoinHandle;

use crate::downloader::task::{Outcome, TaskDescriptor, TransferTask};
use crate::transport::{TransferError, Transport};
use crate::utils::gate::Gate;
use crate::utils::report::Summary;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no locators given")]
    NoLocators,
    #[error("admission gate closed: {0}")]
    GateClosed(#[from] AcquireError),
}

/// Builds one task per locator and runs them all, at most gate-capacity at a
/// time. A unit is taken before each task is spawned, so later locators wait
/// in this loop rather than as parked tokio tasks.
pub async fn dispatch(
    destination: PathBuf,
    locators: Vec<String>,
    gate: &Gate,
    transport: Arc<dyn Transport>,
    timeout: Option<Duration>,
) -> Result<Summary, DispatchError> {
    if locators.is_empty() {
        return Err(DispatchError::NoLocators);
    }

    let tasks: Vec<_> = locators
        .into_iter()
        .map(|locator| {
            TransferTask::new(
                TaskDescriptor {
                    locator,
                    destination: destination.clone(),
                },
                timeout,
            )
        })
        .collect();
    warn_on_collisions(&tasks);

    tracing::debug!(
        tasks = tasks.len(),
        capacity = gate.capacity().get(),
        "dispatching transfers"
    );

    let mut handles = Vec::with_capacity(tasks.len());
    for task in tasks {
        let locator = task.locator().to_string();
        if gate.available() == 0 {
            tracing::debug!(%locator, "gate saturated, waiting for a free unit");
        }
        let permit = match gate.acquire().await {
            Ok(permit) => permit,
            Err(err) => {
                // Tasks already running keep their units; let them finish.
                join_all(handles).await;
                return Err(err.into());
            }
        };
        let transport = Arc::clone(&transport);
        let handle = tokio::spawn(task.run(permit, transport));
        handles.push((locator, handle));
    }

    Ok(Summary::new(join_all(handles).await))
}

async fn join_all(handles: Vec<(String, JoinHandle<Outcome>)>) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(handles.len());
    for (locator, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(%locator, error = %err, "transfer task did not complete");
                Outcome::TransferFailed {
                    locator,
                    source: TransferError::Aborted(err.to_string()),
                }
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Same-named targets are still written (last writer wins); this only makes
/// the overwrite visible.
fn warn_on_collisions(tasks: &[TransferTask]) {
    let mut seen: HashMap<&Path, &str> = HashMap::new();
    for task in tasks {
        if let Some(first) = seen.insert(task.target(), task.locator()) {
            tracing::warn!(
                path = %task.target().display(),
                first = %first,
                locator = %task.locator(),
                "two locators share a target file, the later transfer may overwrite it"
            );
        }
    }
}
