//! Partition collection: access checks, then discovery of every resource an
//! operation references.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

use common::provider::DiscoveryError;

use crate::execution::{join_first_error, EngineError};
use crate::runtime::Runtime;

/// Discover the partitions of every operation source and replicate target.
///
/// Providers run concurrently up to the global provider concurrency; within
/// one provider, resources run concurrently up to the provider's own limit.
/// Empty listings are fatal for source resources only.
pub async fn collect_partitions(runtime: &Runtime) -> Result<(), EngineError> {
    let mut access_checks = JoinSet::new();
    for provider in runtime.providers().values() {
        let provider = Arc::clone(provider);
        access_checks.spawn(async move {
            provider.check_access().await?;
            Ok(())
        });
    }
    join_first_error(access_checks).await?;

    let provider_limit = Arc::new(Semaphore::new(runtime.provider_concurrency()));
    let mut provider_workers = JoinSet::new();

    for provider in runtime.providers().values() {
        // resource pruning happens up front, unreferenced resources are
        // never listed
        let resources: Vec<_> = provider
            .resources()
            .into_iter()
            .filter_map(|resource| {
                runtime
                    .discovery_role(resource.name())
                    .map(|is_source| (resource, is_source))
            })
            .collect();
        if resources.is_empty() {
            continue;
        }

        let provider = Arc::clone(provider);
        let provider_limit = Arc::clone(&provider_limit);
        provider_workers.spawn(async move {
            let _permit = provider_limit
                .acquire_owned()
                .await
                .map_err(|e| EngineError::Worker(e.to_string()))?;
            info!(provider = provider.name(), "partition collection started");

            let resource_limit = Arc::new(Semaphore::new(provider.resource_concurrency()));
            let mut resource_workers = JoinSet::new();

            for (resource, is_source) in resources {
                let permit = Arc::clone(&resource_limit)
                    .acquire_owned()
                    .await
                    .map_err(|e| EngineError::Worker(e.to_string()))?;
                let provider = Arc::clone(&provider);

                resource_workers.spawn(async move {
                    let _permit = permit;
                    info!(
                        resource = resource.name(),
                        "partition collection for resource started"
                    );

                    let objects = provider.discover(&resource).await?;
                    if objects == 0 && is_source {
                        return Err(DiscoveryError::EmptyResource {
                            resource: resource.name().to_string(),
                        }
                        .into());
                    }

                    info!(
                        resource = resource.name(),
                        objects,
                        partitions = resource.partition_count(),
                        "partition collection for resource finished"
                    );
                    Ok(())
                });
            }

            let result = join_first_error(resource_workers).await;
            info!(provider = provider.name(), "partition collection finished");
            result
        });
    }

    join_first_error(provider_workers).await
}
