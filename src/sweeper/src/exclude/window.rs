use chrono::TimeDelta;
use tracing::info;

use common::config::ConfigError;
use common::partition::{sort_by_values, PartitionList};

use crate::exclude::{clamped_add, parse_signed_duration, partition_timestamp, ExcludeFilter, FilterError};

/// One window bound anchored to either the smallest or the greatest
/// partition timestamp of the sorted set. A leading `-` on the configured
/// duration selects the greatest-timestamp anchor.
#[derive(Clone, Copy, Debug)]
struct WindowBound {
    anchor_greatest: bool,
    offset: TimeDelta,
}

/// Excludes partitions inside a `[from, to)` window whose bounds are
/// duration offsets from the partition set's own timestamp extremes.
pub struct PartitionTimestampExclude {
    from: WindowBound,
    to: WindowBound,
}

impl PartitionTimestampExclude {
    pub fn from_config(
        operation: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let from = match from {
            Some(raw) => {
                let (negative, offset) = parse_signed_duration(operation, "from", raw)?;
                WindowBound {
                    anchor_greatest: negative,
                    offset,
                }
            }
            None => WindowBound {
                anchor_greatest: false,
                offset: TimeDelta::zero(),
            },
        };
        let to = match to {
            Some(raw) => {
                let (negative, offset) = parse_signed_duration(operation, "to", raw)?;
                WindowBound {
                    anchor_greatest: negative,
                    offset,
                }
            }
            None => WindowBound {
                anchor_greatest: true,
                offset: TimeDelta::zero(),
            },
        };

        Ok(Self { from, to })
    }
}

impl ExcludeFilter for PartitionTimestampExclude {
    fn name(&self) -> &'static str {
        "partition timestamp"
    }

    fn apply(&self, partitions: &PartitionList) -> Result<PartitionList, FilterError> {
        if partitions.is_empty() {
            return Err(FilterError::EmptyInput {
                filter: "partition timestamp",
            });
        }

        let mut sorted = partitions.clone();
        sort_by_values(&mut sorted);

        let smallest = partition_timestamp(&sorted[0])?;
        let greatest = partition_timestamp(&sorted[sorted.len() - 1])?;

        let anchor = |bound: &WindowBound| {
            let base = if bound.anchor_greatest { greatest } else { smallest };
            clamped_add(base, bound.offset)
        };
        let from = anchor(&self.from);
        let to = anchor(&self.to);

        info!(
            from = %from.to_rfc3339(),
            to = %to.to_rfc3339(),
            "partition timestamp exclude"
        );

        let mut kept = Vec::with_capacity(sorted.len());
        for partition in &sorted {
            let ts = partition_timestamp(partition)?;
            let exclude = ts >= from && ts < to;
            if !exclude {
                kept.push(partition.clone());
            }
        }

        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::exclude::testing::{hash_ids, int_partitions};

    #[test]
    fn test_empty_input_has_no_anchor() {
        let exclude = PartitionTimestampExclude::from_config("op", None, None).unwrap();

        let result = exclude.apply(&Vec::new());
        assert!(matches!(result, Err(FilterError::EmptyInput { .. })));
    }

    #[test]
    fn test_default_bounds_span_the_whole_set() {
        // [smallest, greatest) keeps only the greatest partition
        let exclude = PartitionTimestampExclude::from_config("op", None, None).unwrap();
        let partitions = int_partitions(&[1, 2, 3]);

        let kept = exclude.apply(&partitions).unwrap();
        assert_eq!(hash_ids(&kept), ["3"]);
    }

    #[test]
    fn test_negative_to_anchors_at_greatest() {
        // fixture timestamps are one hour apart; [smallest, greatest-1h)
        // removes only the smallest partition
        let exclude = PartitionTimestampExclude::from_config("op", None, Some("-1h")).unwrap();
        let partitions = int_partitions(&[1, 2, 3]);

        let kept = exclude.apply(&partitions).unwrap();
        assert_eq!(hash_ids(&kept), ["2", "3"]);
    }

    #[test]
    fn test_positive_from_anchors_at_smallest() {
        // [smallest+1h, greatest] as half-open keeps the two extremes
        let exclude = PartitionTimestampExclude::from_config("op", Some("1h"), None).unwrap();
        let partitions = int_partitions(&[1, 2, 3]);

        let kept = exclude.apply(&partitions).unwrap();
        assert_eq!(hash_ids(&kept), ["1", "3"]);
    }
}
