//! Named partitioned storage units tracked by a provider.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use regex::Regex;

use crate::partition::values::ColumnSpec;
use crate::partition::{Partition, PartitionList};

/// Where a resource's partitions live, per storage kind.
#[derive(Clone, Debug)]
pub enum ResourceLocation {
    /// Hive-layout object-store prefix (`key=value` path segments).
    Prefix { prefix: String },
    /// Object-store prefix whose keys encode partition values via regex
    /// capture groups.
    Keyed { prefix: String, pattern: Regex },
    /// SQL-queryable table.
    Table { table: String },
}

/// A named partitioned storage unit.
///
/// The partition map is written only during discovery (one writer per
/// resource) and read-only afterwards.
#[derive(Debug)]
pub struct Resource {
    name: String,
    provider: String,
    spec: Vec<ColumnSpec>,
    location: ResourceLocation,
    partitions: RwLock<HashMap<String, Arc<Partition>>>,
}

impl Resource {
    pub fn new(
        name: impl Into<String>,
        provider: impl Into<String>,
        spec: Vec<ColumnSpec>,
        location: ResourceLocation,
    ) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            spec,
            location,
            partitions: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning provider, resolved through the runtime registry.
    pub fn provider_name(&self) -> &str {
        &self.provider
    }

    pub fn spec(&self) -> &[ColumnSpec] {
        &self.spec
    }

    pub fn location(&self) -> &ResourceLocation {
        &self.location
    }

    /// Insert a newly discovered partition, or fold its aggregates into the
    /// already-known partition with the same hash id.
    pub fn merge_or_insert(&self, partition: Partition) {
        let mut partitions = self.partitions.write().unwrap();
        match partitions.entry(partition.hash_id().to_string()) {
            Entry::Occupied(entry) => entry.get().merge_from(&partition),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(partition));
            }
        }
    }

    /// Insert a partition whose key must not repeat; returns the rejected
    /// partition when the hash id is already present.
    pub fn insert_unique(&self, partition: Partition) -> Result<(), Partition> {
        let mut partitions = self.partitions.write().unwrap();
        if partitions.contains_key(partition.hash_id()) {
            return Err(partition);
        }
        partitions.insert(partition.hash_id().to_string(), Arc::new(partition));
        Ok(())
    }

    pub fn partition(&self, hash_id: &str) -> Option<Arc<Partition>> {
        self.partitions.read().unwrap().get(hash_id).cloned()
    }

    pub fn contains(&self, hash_id: &str) -> bool {
        self.partitions.read().unwrap().contains_key(hash_id)
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.read().unwrap().len()
    }

    pub fn partition_map(&self) -> HashMap<String, Arc<Partition>> {
        self.partitions.read().unwrap().clone()
    }

    pub fn partition_list(&self) -> PartitionList {
        self.partitions.read().unwrap().values().cloned().collect()
    }
}
