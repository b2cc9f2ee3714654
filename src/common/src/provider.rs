//! Provider contract: discovery plus optional copy/remove capabilities.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::config::{ConfigError, ResourceConfig};
use crate::partition::values::ValueParseError;
use crate::partition::{Partition, PartitionList};
use crate::resource::Resource;

/// One partition paired with the side-effecting work staged for it.
///
/// Preparing an action is safe to run speculatively (dry-run included); only
/// awaiting the action performs the copy/delete I/O.
pub struct PreparedAction {
    pub partition: Arc<Partition>,
    pub action: BoxFuture<'static, anyhow::Result<()>>,
}

pub type PreparedActions = Vec<PreparedAction>;

/// A backend integration offering partition discovery and, optionally, the
/// copy/remove capabilities.
///
/// Capabilities are queried through [`Provider::remover`] and
/// [`Provider::replicator`] rather than downcasts; a provider that returns
/// `None` simply does not support that operation kind.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// How many of this provider's resources may be discovered concurrently.
    fn resource_concurrency(&self) -> usize;

    /// Build and register a resource owned by this provider.
    fn make_resource(&self, config: &ResourceConfig) -> Result<Arc<Resource>, ConfigError>;

    /// All resources created for this provider so far.
    fn resources(&self) -> Vec<Arc<Resource>>;

    /// Verify backend connectivity before any discovery work starts.
    async fn check_access(&self) -> Result<(), DiscoveryError>;

    /// Populate the resource's partition map. Returns the number of storage
    /// entries examined so the caller can flag empty source listings.
    async fn discover(&self, resource: &Arc<Resource>) -> Result<usize, DiscoveryError>;

    fn remover(&self) -> Option<&dyn RemovePartitions> {
        None
    }

    fn replicator(&self) -> Option<&dyn ReplicatePartitions> {
        None
    }
}

/// Capability to stage per-partition delete actions.
#[async_trait]
pub trait RemovePartitions: Send + Sync {
    async fn remove_partitions(
        &self,
        partitions: &PartitionList,
        source: &Resource,
    ) -> Result<PreparedActions, ProviderError>;
}

/// Capability to stage per-partition copy actions onto a target resource of
/// the same provider.
#[async_trait]
pub trait ReplicatePartitions: Send + Sync {
    async fn copy_partitions(
        &self,
        partitions: &PartitionList,
        source: &Resource,
        target: &Resource,
    ) -> Result<PreparedActions, ProviderError>;
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("access check for provider {provider:?} failed: {source}")]
    Access {
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("listing resource {resource:?} failed: {source}")]
    Listing {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("listing of resource {resource:?} returned no objects")]
    EmptyResource { resource: String },

    #[error("the key {key:?} indicates a delta lake table (avoid managing yourself)")]
    DeltaTable { key: String },

    #[error("resource {resource:?} encountered not matching partition key in {key:?}")]
    KeyMismatch { resource: String, key: String },

    #[error("object {key:?} of resource {resource:?} does not encode every partition column")]
    IncompleteKey { resource: String, key: String },

    #[error("object key {key:?} of resource {resource:?} does not match the configured pattern")]
    PatternMismatch { resource: String, key: String },

    #[error("capture group {index} of object key {key:?} is empty")]
    EmptyCapture { index: usize, key: String },

    #[error("partition key {values:?} of resource {resource:?} appeared twice, the pattern is ambiguous")]
    AmbiguousKey {
        resource: String,
        values: Vec<String>,
    },

    #[error("parsing partition values of resource {resource:?} failed: {source}")]
    Parse {
        resource: String,
        #[source]
        source: ValueParseError,
    },

    #[error("partition query for resource {resource:?} failed: {source}")]
    Query {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("resource {resource:?} is not backed by this provider kind")]
    UnsupportedLocation { resource: String },
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("staging actions for resource {resource:?} failed: {source}")]
    Staging {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("resource {resource:?} layout does not support {operation}")]
    UnsupportedLayout {
        resource: String,
        operation: &'static str,
    },
}
