//! Partition model: one distinct partition-key combination within a resource.

pub mod signal;
pub mod values;

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::partition::signal::{CompletionSignal, Obligation};
use crate::partition::values::{ColumnSpec, TypedValue, ValueParseError};

/// Provider-reported aggregates of a partition.
///
/// Absent for query-engine-backed resources, which cannot report object
/// statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionStats {
    pub object_count: u64,
    pub size_bytes: u64,
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

impl PartitionStats {
    /// Aggregates for a single discovered object.
    pub fn for_object(size_bytes: u64, modified: DateTime<Utc>) -> Self {
        Self {
            object_count: 1,
            size_bytes,
            earliest: modified,
            latest: modified,
        }
    }

    /// Sum counts and sizes, widen the earliest/latest window.
    pub fn merge(&mut self, other: &PartitionStats) {
        self.object_count += other.object_count;
        self.size_bytes += other.size_bytes;
        if other.earliest < self.earliest {
            self.earliest = other.earliest;
        }
        if other.latest > self.latest {
            self.latest = other.latest;
        }
    }
}

/// One distinct key combination inside a resource.
///
/// Created during discovery, extended with wait obligations while the
/// dependency-lock graph is built, and read-only afterwards. The completion
/// signal is torn down by the execution engine exactly once per acting
/// operation.
#[derive(Debug)]
pub struct Partition {
    raw_values: Vec<String>,
    typed_values: Vec<TypedValue>,
    hash_id: String,
    stats: Mutex<Option<PartitionStats>>,
    obligations: Mutex<Vec<Obligation>>,
    signal: CompletionSignal,
}

impl Partition {
    pub fn new(
        raw_values: Vec<String>,
        typed_values: Vec<TypedValue>,
        stats: Option<PartitionStats>,
    ) -> Self {
        let hash_id = values::hash_id(&typed_values);
        Self {
            raw_values,
            typed_values,
            hash_id,
            stats: Mutex::new(stats),
            obligations: Mutex::new(Vec::new()),
            signal: CompletionSignal::new(),
        }
    }

    /// Parse raw values against the spec and build the partition.
    pub fn from_raw(
        spec: &[ColumnSpec],
        raw_values: Vec<String>,
        stats: Option<PartitionStats>,
    ) -> Result<Self, ValueParseError> {
        let typed_values = values::parse_values(spec, &raw_values)?;
        Ok(Self::new(raw_values, typed_values, stats))
    }

    pub fn values(&self) -> &[String] {
        &self.raw_values
    }

    pub fn typed_values(&self) -> &[TypedValue] {
        &self.typed_values
    }

    pub fn hash_id(&self) -> &str {
        &self.hash_id
    }

    pub fn stats(&self) -> Option<PartitionStats> {
        *self.stats.lock().unwrap()
    }

    /// Latest modification timestamp, if this partition's provider reports
    /// aggregates at all.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.stats().map(|stats| stats.latest)
    }

    /// Fold another discovery of the same key into this partition.
    pub fn merge_from(&self, other: &Partition) {
        let Some(update) = other.stats() else {
            return;
        };

        let mut stats = self.stats.lock().unwrap();
        *stats = Some(match *stats {
            Some(mut current) => {
                current.merge(&update);
                current
            }
            None => update,
        });
    }

    pub fn add_obligation(&self, obligation: Obligation) {
        self.obligations.lock().unwrap().push(obligation);
    }

    /// Hand the registered obligations to the execution engine; they are
    /// consumed once, right before this partition's action runs.
    pub fn take_obligations(&self) -> Vec<Obligation> {
        std::mem::take(&mut *self.obligations.lock().unwrap())
    }

    pub fn obligation_count(&self) -> usize {
        self.obligations.lock().unwrap().len()
    }

    pub fn signal(&self) -> &CompletionSignal {
        &self.signal
    }
}

/// Ordered collection of partitions.
pub type PartitionList = Vec<Arc<Partition>>;

/// Stable sort by typed-value tuple, first unequal column decides.
pub fn sort_by_values(partitions: &mut PartitionList) {
    partitions.sort_by(|a, b| a.typed_values().cmp(b.typed_values()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::partition::values::ColumnType;

    fn int_spec() -> Vec<ColumnSpec> {
        vec![ColumnSpec {
            name: "bucket".to_string(),
            kind: ColumnType::Int,
        }]
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_merge_sums_counts_and_widens_window() {
        let spec = int_spec();
        let first = Partition::from_raw(
            &spec,
            vec!["7".to_string()],
            Some(PartitionStats {
                object_count: 3,
                size_bytes: 100,
                earliest: ts(100),
                latest: ts(200),
            }),
        )
        .unwrap();
        let second = Partition::from_raw(
            &spec,
            vec!["7".to_string()],
            Some(PartitionStats {
                object_count: 2,
                size_bytes: 50,
                earliest: ts(50),
                latest: ts(300),
            }),
        )
        .unwrap();

        first.merge_from(&second);

        let stats = first.stats().unwrap();
        assert_eq!(stats.object_count, 5);
        assert_eq!(stats.size_bytes, 150);
        assert_eq!(stats.earliest, ts(50));
        assert_eq!(stats.latest, ts(300));
    }

    #[test]
    fn test_hash_id_uses_rendered_values() {
        let spec = int_spec();
        let partition = Partition::from_raw(&spec, vec!["0042".to_string()], None).unwrap();

        // hash id renders the typed value, not the raw string
        assert_eq!(partition.hash_id(), "42");
        assert_eq!(partition.values(), ["0042".to_string()]);
    }

    #[test]
    fn test_sort_by_values_orders_numerically() {
        let spec = int_spec();
        let mut list: PartitionList = [10, 2, 30]
            .iter()
            .map(|v| {
                Arc::new(Partition::from_raw(&spec, vec![v.to_string()], None).unwrap())
            })
            .collect();

        sort_by_values(&mut list);

        let order: Vec<&str> = list.iter().map(|p| p.hash_id()).collect();
        assert_eq!(order, ["2", "10", "30"]);
    }

    #[test]
    fn test_take_obligations_consumes_once() {
        let spec = int_spec();
        let partition = Partition::from_raw(&spec, vec!["1".to_string()], None).unwrap();
        let other = Partition::from_raw(&spec, vec!["2".to_string()], None).unwrap();

        partition.add_obligation(other.signal().subscribe());
        assert_eq!(partition.obligation_count(), 1);

        assert_eq!(partition.take_obligations().len(), 1);
        assert_eq!(partition.take_obligations().len(), 0);
    }
}
