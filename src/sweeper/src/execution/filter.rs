//! Kept-partition computation for every operation.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::info;

use crate::execution::{join_first_error, EngineError};
use crate::runtime::Runtime;

/// Apply every operation's exclude chain, one worker per operation.
pub async fn filter_kept_partitions(runtime: &Runtime) -> Result<(), EngineError> {
    let mut workers = JoinSet::new();

    for operation in runtime.operations().values() {
        let operation = Arc::clone(operation);
        workers.spawn(async move {
            info!(
                operation = operation.name(),
                count = operation.source().partition_count(),
                "partition count pre filter"
            );

            let kept = operation.kept_partitions().map_err(EngineError::from)?;

            info!(
                operation = operation.name(),
                count = kept.len(),
                "partition count after filter"
            );
            Ok(())
        });
    }

    join_first_error(workers).await
}
