//! Object-store backed provider: hive and regex-keyed partition discovery,
//! copy and remove capabilities.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use regex::Regex;
use tracing::info;

use common::config::{ConfigError, ProviderConfig, ResourceConfig};
use common::partition::values::ColumnSpec;
use common::partition::{Partition, PartitionList, PartitionStats};
use common::provider::{
    DiscoveryError, PreparedAction, PreparedActions, Provider, ProviderError, RemovePartitions,
    ReplicatePartitions,
};
use common::resource::{Resource, ResourceLocation};
use common::storage::create_object_store_from_dsn;

pub struct ObjectStoreProvider {
    name: String,
    store: Arc<dyn ObjectStore>,
    resource_concurrency: usize,
    resources: Mutex<Vec<Arc<Resource>>>,
}

impl ObjectStoreProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let store =
            create_object_store_from_dsn(&config.dsn).map_err(|e| ConfigError::ProviderInit {
                provider: config.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self::with_store(
            &config.name,
            store,
            config.resource_concurrency(),
        ))
    }

    /// Build the provider around an existing store handle.
    pub fn with_store(
        name: &str,
        store: Arc<dyn ObjectStore>,
        resource_concurrency: usize,
    ) -> Self {
        Self {
            name: name.to_string(),
            store,
            resource_concurrency,
            resources: Mutex::new(Vec::new()),
        }
    }

    async fn discover_hive(
        &self,
        resource: &Resource,
        prefix: &str,
    ) -> Result<usize, DiscoveryError> {
        let path = ObjectPath::from(prefix);
        let mut listing = self.store.list(Some(&path));
        let mut objects = 0usize;

        while let Some(entry) = listing.next().await {
            let meta = entry.map_err(|e| DiscoveryError::Listing {
                resource: resource.name().to_string(),
                source: anyhow::Error::new(e),
            })?;
            objects += 1;

            guard_delta_table(&meta)?;

            let raw_values = hive_values(resource, &meta.location)?;
            let stats = PartitionStats::for_object(meta.size, meta.last_modified);
            let partition = Partition::from_raw(resource.spec(), raw_values, Some(stats))
                .map_err(|source| DiscoveryError::Parse {
                    resource: resource.name().to_string(),
                    source,
                })?;

            resource.merge_or_insert(partition);
        }

        Ok(objects)
    }

    async fn discover_keyed(
        &self,
        resource: &Resource,
        prefix: &str,
        pattern: &Regex,
    ) -> Result<usize, DiscoveryError> {
        let path = ObjectPath::from(prefix);
        let mut listing = self.store.list(Some(&path));
        let mut objects = 0usize;

        while let Some(entry) = listing.next().await {
            let meta = entry.map_err(|e| DiscoveryError::Listing {
                resource: resource.name().to_string(),
                source: anyhow::Error::new(e),
            })?;
            objects += 1;

            guard_delta_table(&meta)?;

            let raw_values = captured_values(resource, pattern, meta.location.as_ref())?;
            let stats = PartitionStats::for_object(meta.size, meta.last_modified);
            let partition = Partition::from_raw(resource.spec(), raw_values, Some(stats))
                .map_err(|source| DiscoveryError::Parse {
                    resource: resource.name().to_string(),
                    source,
                })?;

            // a repeated key means the regex does not isolate partitions
            if let Err(duplicate) = resource.insert_unique(partition) {
                return Err(DiscoveryError::AmbiguousKey {
                    resource: resource.name().to_string(),
                    values: duplicate.values().to_vec(),
                });
            }
        }

        Ok(objects)
    }

    /// All object keys belonging to one partition of the given resource.
    async fn partition_objects(
        &self,
        resource: &Resource,
        partition: &Partition,
    ) -> Result<Vec<ObjectPath>, ProviderError> {
        let staging = |e: object_store::Error| ProviderError::Staging {
            resource: resource.name().to_string(),
            source: anyhow::Error::new(e),
        };

        match resource.location() {
            ResourceLocation::Prefix { prefix } => {
                let partition_prefix =
                    hive_partition_prefix(prefix, resource.spec(), partition.values());
                let path = ObjectPath::from(partition_prefix.as_str());
                let mut listing = self.store.list(Some(&path));

                let mut paths = Vec::new();
                while let Some(entry) = listing.next().await {
                    paths.push(entry.map_err(staging)?.location);
                }
                Ok(paths)
            }
            ResourceLocation::Keyed { prefix, pattern } => {
                let path = ObjectPath::from(prefix.as_str());
                let mut listing = self.store.list(Some(&path));

                let mut paths = Vec::new();
                while let Some(entry) = listing.next().await {
                    let meta = entry.map_err(staging)?;
                    let matches = pattern
                        .captures(meta.location.as_ref())
                        .is_some_and(|captures| {
                            captures
                                .iter()
                                .skip(1)
                                .map(|group| group.map(|m| m.as_str()).unwrap_or(""))
                                .eq(partition.values().iter().map(String::as_str))
                        });
                    if matches {
                        paths.push(meta.location);
                    }
                }
                Ok(paths)
            }
            ResourceLocation::Table { .. } => Err(ProviderError::UnsupportedLayout {
                resource: resource.name().to_string(),
                operation: "object staging",
            }),
        }
    }
}

#[async_trait]
impl Provider for ObjectStoreProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource_concurrency(&self) -> usize {
        self.resource_concurrency
    }

    fn make_resource(&self, config: &ResourceConfig) -> Result<Arc<Resource>, ConfigError> {
        if config.columns.is_empty() {
            return Err(ConfigError::EmptySpec {
                resource: config.name.clone(),
            });
        }
        if config.table.is_some() {
            return Err(ConfigError::MisplacedField {
                resource: config.name.clone(),
                field: "table",
            });
        }

        let prefix = config
            .prefix
            .clone()
            .ok_or_else(|| ConfigError::MissingField {
                resource: config.name.clone(),
                field: "prefix",
            })?;

        let location = match &config.regex {
            Some(raw) => {
                let pattern = Regex::new(raw).map_err(|e| ConfigError::InvalidRegex {
                    resource: config.name.clone(),
                    reason: e.to_string(),
                })?;
                // capture-group count is static, check it before discovery
                let captures = pattern.captures_len() - 1;
                if captures != config.columns.len() {
                    return Err(ConfigError::CaptureCount {
                        resource: config.name.clone(),
                        expected: config.columns.len(),
                        got: captures,
                    });
                }
                ResourceLocation::Keyed { prefix, pattern }
            }
            None => ResourceLocation::Prefix { prefix },
        };

        let resource = Arc::new(Resource::new(
            &config.name,
            &self.name,
            config.columns.clone(),
            location,
        ));
        self.resources.lock().unwrap().push(resource.clone());
        Ok(resource)
    }

    fn resources(&self) -> Vec<Arc<Resource>> {
        self.resources.lock().unwrap().clone()
    }

    async fn check_access(&self) -> Result<(), DiscoveryError> {
        self.store
            .list_with_delimiter(None)
            .await
            .map(|_| ())
            .map_err(|e| DiscoveryError::Access {
                provider: self.name.clone(),
                source: anyhow::Error::new(e),
            })
    }

    async fn discover(&self, resource: &Arc<Resource>) -> Result<usize, DiscoveryError> {
        match resource.location() {
            ResourceLocation::Prefix { prefix } => {
                self.discover_hive(resource, &prefix.clone()).await
            }
            ResourceLocation::Keyed { prefix, pattern } => {
                self.discover_keyed(resource, &prefix.clone(), &pattern.clone())
                    .await
            }
            ResourceLocation::Table { .. } => Err(DiscoveryError::UnsupportedLocation {
                resource: resource.name().to_string(),
            }),
        }
    }

    fn remover(&self) -> Option<&dyn RemovePartitions> {
        Some(self)
    }

    fn replicator(&self) -> Option<&dyn ReplicatePartitions> {
        Some(self)
    }
}

#[async_trait]
impl RemovePartitions for ObjectStoreProvider {
    async fn remove_partitions(
        &self,
        partitions: &PartitionList,
        source: &Resource,
    ) -> Result<PreparedActions, ProviderError> {
        let mut prepared = Vec::with_capacity(partitions.len());

        for partition in partitions {
            let paths = self.partition_objects(source, partition).await?;
            for path in &paths {
                info!("preparing rm: {path}");
            }

            let store = Arc::clone(&self.store);
            let action = async move {
                for path in paths {
                    info!("executing rm: {path}");
                    store
                        .delete(&path)
                        .await
                        .with_context(|| format!("deleting {path}"))?;
                }
                Ok(())
            }
            .boxed();

            prepared.push(PreparedAction {
                partition: Arc::clone(partition),
                action,
            });
        }

        Ok(prepared)
    }
}

#[async_trait]
impl ReplicatePartitions for ObjectStoreProvider {
    async fn copy_partitions(
        &self,
        partitions: &PartitionList,
        source: &Resource,
        target: &Resource,
    ) -> Result<PreparedActions, ProviderError> {
        // only hive layouts carry a derivable target key per object
        let source_prefix = match source.location() {
            ResourceLocation::Prefix { prefix } => prefix.clone(),
            _ => {
                return Err(ProviderError::UnsupportedLayout {
                    resource: source.name().to_string(),
                    operation: "copy",
                })
            }
        };
        let target_prefix = match target.location() {
            ResourceLocation::Prefix { prefix } => prefix.clone(),
            _ => {
                return Err(ProviderError::UnsupportedLayout {
                    resource: target.name().to_string(),
                    operation: "copy",
                })
            }
        };

        let mut prepared = Vec::with_capacity(partitions.len());

        for partition in partitions {
            let paths = self.partition_objects(source, partition).await?;

            let mut transfers = Vec::with_capacity(paths.len());
            for from in paths {
                let suffix = from
                    .as_ref()
                    .strip_prefix(source_prefix.as_str())
                    .unwrap_or(from.as_ref())
                    .trim_start_matches('/');
                let to = ObjectPath::from(format!("{target_prefix}/{suffix}"));
                info!("preparing cp: {from} -> {to}");
                transfers.push((from, to));
            }

            let store = Arc::clone(&self.store);
            let action = async move {
                for (from, to) in transfers {
                    info!("executing cp: {from} -> {to}");
                    store
                        .copy(&from, &to)
                        .await
                        .with_context(|| format!("copying {from} to {to}"))?;
                }
                Ok(())
            }
            .boxed();

            prepared.push(PreparedAction {
                partition: Arc::clone(partition),
                action,
            });
        }

        Ok(prepared)
    }
}

fn guard_delta_table(meta: &ObjectMeta) -> Result<(), DiscoveryError> {
    if meta
        .location
        .parts()
        .any(|part| part.as_ref() == "_delta_log")
    {
        return Err(DiscoveryError::DeltaTable {
            key: meta.location.to_string(),
        });
    }
    Ok(())
}

/// Extract the raw partition values of a hive-layout object key, validating
/// the `key=value` segments against the spec column names in order.
fn hive_values(resource: &Resource, location: &ObjectPath) -> Result<Vec<String>, DiscoveryError> {
    let spec = resource.spec();
    let mut values = Vec::with_capacity(spec.len());

    for part in location.parts() {
        if let Some((key, value)) = part.as_ref().split_once('=') {
            if values.len() >= spec.len() || spec[values.len()].name != key {
                return Err(DiscoveryError::KeyMismatch {
                    resource: resource.name().to_string(),
                    key: location.to_string(),
                });
            }
            values.push(value.to_string());
        }
    }

    if values.len() != spec.len() {
        return Err(DiscoveryError::IncompleteKey {
            resource: resource.name().to_string(),
            key: location.to_string(),
        });
    }

    Ok(values)
}

/// Raw partition values captured by a keyed resource's pattern.
fn captured_values(
    resource: &Resource,
    pattern: &Regex,
    key: &str,
) -> Result<Vec<String>, DiscoveryError> {
    let captures = pattern
        .captures(key)
        .ok_or_else(|| DiscoveryError::PatternMismatch {
            resource: resource.name().to_string(),
            key: key.to_string(),
        })?;

    let mut values = Vec::with_capacity(captures.len() - 1);
    for (index, group) in captures.iter().skip(1).enumerate() {
        let value = group.map(|m| m.as_str()).unwrap_or("");
        if value.is_empty() {
            return Err(DiscoveryError::EmptyCapture {
                index,
                key: key.to_string(),
            });
        }
        values.push(value.to_string());
    }

    Ok(values)
}

fn hive_partition_prefix(prefix: &str, spec: &[ColumnSpec], values: &[String]) -> String {
    let segments: Vec<String> = spec
        .iter()
        .zip(values)
        .map(|(column, value)| format!("{}={}", column.name, value))
        .collect();

    format!("{prefix}/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use common::partition::values::ColumnType;

    fn spec() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec {
                name: "day".to_string(),
                kind: ColumnType::Date,
            },
            ColumnSpec {
                name: "hour".to_string(),
                kind: ColumnType::Int,
            },
        ]
    }

    fn hive_resource() -> Resource {
        Resource::new(
            "events",
            "store",
            spec(),
            ResourceLocation::Prefix {
                prefix: "data/events".to_string(),
            },
        )
    }

    #[test]
    fn test_hive_values_in_spec_order() {
        let resource = hive_resource();
        let location = ObjectPath::from("data/events/day=2024-01-02/hour=7/part-0.parquet");

        let values = hive_values(&resource, &location).unwrap();
        assert_eq!(values, ["2024-01-02", "7"]);
    }

    #[test]
    fn test_hive_values_rejects_wrong_key_name() {
        let resource = hive_resource();
        let location = ObjectPath::from("data/events/month=2024-01/hour=7/part-0.parquet");

        let result = hive_values(&resource, &location);
        assert!(matches!(result, Err(DiscoveryError::KeyMismatch { .. })));
    }

    #[test]
    fn test_hive_values_rejects_missing_column() {
        let resource = hive_resource();
        let location = ObjectPath::from("data/events/day=2024-01-02/part-0.parquet");

        let result = hive_values(&resource, &location);
        assert!(matches!(result, Err(DiscoveryError::IncompleteKey { .. })));
    }

    #[test]
    fn test_captured_values_rejects_non_matching_key() {
        let resource = hive_resource();
        let pattern = Regex::new(r"^backups/(\d{4}-\d{2}-\d{2})/(\d+)\.tar$").unwrap();

        let result = captured_values(&resource, &pattern, "backups/malformed.tar");
        assert!(matches!(
            result,
            Err(DiscoveryError::PatternMismatch { .. })
        ));
    }

    #[test]
    fn test_captured_values_extracts_groups() {
        let resource = hive_resource();
        let pattern = Regex::new(r"^backups/(\d{4}-\d{2}-\d{2})/(\d+)\.tar$").unwrap();

        let values = captured_values(&resource, &pattern, "backups/2024-01-02/7.tar").unwrap();
        assert_eq!(values, ["2024-01-02", "7"]);
    }

    #[test]
    fn test_hive_partition_prefix_joins_key_value_segments() {
        let prefix = hive_partition_prefix(
            "data/events",
            &spec(),
            &["2024-01-02".to_string(), "7".to_string()],
        );
        assert_eq!(prefix, "data/events/day=2024-01-02/hour=7");
    }
}
