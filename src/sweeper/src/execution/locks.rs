//! Dependency-lock graph construction.
//!
//! For every declared operation dependency, each partition shared by hash id
//! between the dependent's and the depended-on operation's sources receives
//! a wait obligation on the other partition's completion signal.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::info;

use crate::execution::{join_first_error, EngineError};
use crate::runtime::Runtime;

/// Wire wait obligations between same-keyed partitions of dependent
/// operations.
///
/// Obligations are resolved by hash-id equality only; operations whose
/// partition keys differ are not ordered against each other even when
/// declared as dependencies, and multi-hop chains are only ordered per
/// directly shared key.
pub async fn create_execution_locks(runtime: &Runtime) -> Result<(), EngineError> {
    // every operation sourcing a partition must complete it once, so all
    // counters are armed before any obligation is handed out
    for operation in runtime.operations().values() {
        info!(
            operation = operation.name(),
            "setup execution locks for operation"
        );
        for partition in operation.source().partition_list() {
            partition.signal().arm();
        }
    }

    let mut edge_workers = JoinSet::new();
    for operation in runtime.operations().values() {
        for dependency in operation.depends_on() {
            let other = runtime.operation(dependency).ok_or_else(|| {
                EngineError::UnknownDependency {
                    operation: operation.name().to_string(),
                    dependency: dependency.clone(),
                }
            })?;
            let operation = Arc::clone(operation);

            edge_workers.spawn(async move {
                let source = operation.source();
                let other_source = other.source();
                let other_partitions = other_source.partition_map();

                for (hash_id, partition) in source.partition_map() {
                    if let Some(other_partition) = other_partitions.get(&hash_id) {
                        info!(
                            partition = %hash_id,
                            resource = source.name(),
                            by = other_source.name(),
                            "blocking partition"
                        );
                        partition.add_obligation(other_partition.signal().subscribe());
                    }
                }

                Ok(())
            });
        }
    }

    join_first_error(edge_workers).await
}
