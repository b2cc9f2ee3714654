//! Run phases, executed in order: collect partitions, create execution
//! locks, filter kept partitions, check operation targets, execute armed
//! actions.

mod armed;
mod collect;
mod filter;
mod locks;
mod targets;
mod watchdog;

pub use armed::{execute_armed_actions, execute_armed_actions_with_timeout};
pub use collect::collect_partitions;
pub use filter::filter_kept_partitions;
pub use locks::create_execution_locks;
pub use targets::check_operation_targets;
pub use watchdog::{Watchdog, STALL_TIMEOUT};

use thiserror::Error;
use tokio::task::JoinSet;

use common::provider::DiscoveryError;

use crate::exclude::FilterError;
use crate::operations::OperationError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("operation {operation:?} has source partition {partition:?} in target already")]
    TargetCollision { operation: String, partition: String },

    #[error("operation {operation:?} assumed dependency {dependency:?} which does not exist")]
    UnknownDependency {
        operation: String,
        dependency: String,
    },

    #[error("action for partition {partition:?} of operation {operation:?} failed: {source}")]
    Action {
        operation: String,
        partition: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("worker failed: {0}")]
    Worker(String),
}

/// Join every spawned worker and report the first error. All workers are
/// drained even after an error so none leak past the phase.
pub(crate) async fn join_first_error(
    mut workers: JoinSet<Result<(), EngineError>>,
) -> Result<(), EngineError> {
    let mut first_error = None;

    while let Some(joined) = workers.join_next().await {
        let result = joined.unwrap_or_else(|e| Err(EngineError::Worker(e.to_string())));
        if let Err(error) = result {
            first_error.get_or_insert(error);
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
