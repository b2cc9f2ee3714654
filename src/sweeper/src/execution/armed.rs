//! Armed action execution: per-operation workers gated by the dependency
//! locks, racing a shared stall watchdog.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::execution::{join_first_error, EngineError, Watchdog, STALL_TIMEOUT};
use crate::operations::Operation;
use crate::runtime::Runtime;

/// Execute every operation's prepared actions with the default stall
/// timeout.
pub async fn execute_armed_actions(runtime: &Runtime) -> Result<(), EngineError> {
    execute_armed_actions_with_timeout(runtime, STALL_TIMEOUT).await
}

/// Same as [`execute_armed_actions`] with an explicit stall timeout.
///
/// One worker runs per operation, all concurrent. Within one operation the
/// prepared actions execute in list order, each waiting for its partition's
/// obligations first. A partition whose obligations do not clear before the
/// watchdog fires is skipped with a log line, not an error. In dry-run mode
/// the workers stop after preparing their actions.
pub async fn execute_armed_actions_with_timeout(
    runtime: &Runtime,
    stall_timeout: Duration,
) -> Result<(), EngineError> {
    if !runtime.armed() {
        info!("executing as dry run");
    }

    let watchdog = Watchdog::start(stall_timeout);
    let mut workers = JoinSet::new();

    for operation in runtime.operations().values() {
        let operation = Arc::clone(operation);
        let watchdog = watchdog.clone();
        let armed = runtime.armed();

        workers.spawn(async move { run_operation(operation, watchdog, armed).await });
    }

    join_first_error(workers).await
}

async fn run_operation(
    operation: Arc<Operation>,
    watchdog: Watchdog,
    armed: bool,
) -> Result<(), EngineError> {
    info!(operation = operation.name(), "prepare operation");
    let prepared_actions = operation.prepare_actions().await?;

    // dry run: discovery and locking are validated, side effects withheld
    if !armed {
        return Ok(());
    }

    let mut expired = watchdog.expired();
    for prepared in prepared_actions {
        let partition = prepared.partition;
        let obligations = partition.take_obligations();
        let wait_for_dependencies = async {
            for mut obligation in obligations {
                obligation.wait().await;
            }
        };
        let wait_for_expiry = async {
            let _ = expired.wait_for(|fired| *fired).await;
        };

        tokio::select! {
            _ = wait_for_dependencies => {
                prepared.action.await.map_err(|source| EngineError::Action {
                    operation: operation.name().to_string(),
                    partition: partition.hash_id().to_string(),
                    source,
                })?;

                info!(partition = partition.hash_id(), "unblocking partition");
                partition.signal().complete();
                watchdog.notify();
            }
            _ = wait_for_expiry => {
                warn!(
                    partition = partition.hash_id(),
                    operation = operation.name(),
                    "partition timed out (could not unblock), skipping action"
                );
            }
        }
    }

    Ok(())
}
