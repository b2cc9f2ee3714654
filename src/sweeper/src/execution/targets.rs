//! Target-collision validation for replicate operations.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::execution::{join_first_error, EngineError};
use crate::runtime::Runtime;

/// Fail when a replicate operation would copy a kept partition onto a target
/// partition that already exists. Runs after discovery, before execution.
pub async fn check_operation_targets(runtime: &Runtime) -> Result<(), EngineError> {
    let mut workers = JoinSet::new();

    for operation in runtime.operations().values() {
        let operation = Arc::clone(operation);
        workers.spawn(async move {
            let Some(target) = operation.target() else {
                return Ok(());
            };

            let kept = operation.kept_partitions().map_err(EngineError::from)?;
            for partition in kept {
                if target.contains(partition.hash_id()) {
                    return Err(EngineError::TargetCollision {
                        operation: operation.name().to_string(),
                        partition: partition.hash_id().to_string(),
                    });
                }
            }

            Ok(())
        });
    }

    join_first_error(workers).await
}
