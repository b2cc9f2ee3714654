//! Operations: named units of work over a source (and optional target)
//! resource.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::info;

use common::partition::PartitionList;
use common::provider::{PreparedActions, Provider, ProviderError};
use common::resource::Resource;

use crate::exclude::{ExcludeFilter, FilterError};

/// What an operation does with its kept partitions.
pub enum OperationKind {
    /// Delete the kept partitions from the source resource.
    Remove,
    /// Copy the kept partitions onto a target resource of the same provider.
    Replicate { target: Arc<Resource> },
}

/// A named unit of work: source resource, ordered exclude chain and the
/// names of operations that must complete per shared partition first.
pub struct Operation {
    name: String,
    kind: OperationKind,
    source: Arc<Resource>,
    provider: Arc<dyn Provider>,
    excludes: Vec<Box<dyn ExcludeFilter>>,
    depends_on: Vec<String>,
    kept: Mutex<Option<PartitionList>>,
}

impl Operation {
    pub fn new(
        name: impl Into<String>,
        kind: OperationKind,
        source: Arc<Resource>,
        provider: Arc<dyn Provider>,
        excludes: Vec<Box<dyn ExcludeFilter>>,
        depends_on: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            source,
            provider,
            excludes,
            depends_on,
            kept: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Arc<Resource> {
        &self.source
    }

    /// Target resource for replicate operations.
    pub fn target(&self) -> Option<&Arc<Resource>> {
        match &self.kind {
            OperationKind::Remove => None,
            OperationKind::Replicate { target } => Some(target),
        }
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    /// Apply the exclude chain to the source's current partition set.
    ///
    /// The result is computed once and cached; callers must not invoke this
    /// before discovery has completed.
    pub fn kept_partitions(&self) -> Result<PartitionList, FilterError> {
        if let Some(kept) = self.kept.lock().unwrap().as_ref() {
            return Ok(kept.clone());
        }

        let mut partitions = self.source.partition_list();
        for exclude in &self.excludes {
            info!(
                operation = self.name,
                exclude = exclude.name(),
                count = partitions.len(),
                "partition count pre exclude"
            );
            partitions = exclude.apply(&partitions)?;
            info!(
                operation = self.name,
                exclude = exclude.name(),
                count = partitions.len(),
                "partition count after exclude"
            );
        }

        *self.kept.lock().unwrap() = Some(partitions.clone());
        Ok(partitions)
    }

    /// Dispatch to the provider capability and stage one action per kept
    /// partition. Side effects only happen when the engine awaits them.
    pub async fn prepare_actions(&self) -> Result<PreparedActions, OperationError> {
        let kept = self.kept_partitions()?;

        match &self.kind {
            OperationKind::Remove => {
                let remover =
                    self.provider
                        .remover()
                        .ok_or_else(|| OperationError::UnsupportedCapability {
                            provider: self.provider.name().to_string(),
                            resource: self.source.name().to_string(),
                            capability: "remove",
                        })?;
                Ok(remover.remove_partitions(&kept, &self.source).await?)
            }
            OperationKind::Replicate { target } => {
                let replicator =
                    self.provider
                        .replicator()
                        .ok_or_else(|| OperationError::UnsupportedCapability {
                            provider: self.provider.name().to_string(),
                            resource: self.source.name().to_string(),
                            capability: "copy",
                        })?;
                Ok(replicator
                    .copy_partitions(&kept, &self.source, target)
                    .await?)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("provider {provider:?} of resource {resource:?} does not implement {capability}")]
    UnsupportedCapability {
        provider: String,
        resource: String,
        capability: &'static str,
    },

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
