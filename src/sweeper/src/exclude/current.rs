use chrono::{TimeDelta, Utc};
use tracing::info;

use common::config::ConfigError;
use common::partition::PartitionList;

use crate::exclude::{clamped_add, parse_signed_duration, partition_timestamp, ExcludeFilter, FilterError};

/// Excludes partitions whose timestamp falls inside `[now+from, now+to)`,
/// with both bounds given as signed duration offsets.
pub struct CurrentTimestampExclude {
    from: TimeDelta,
    to: TimeDelta,
}

impl CurrentTimestampExclude {
    pub fn new(from: TimeDelta, to: TimeDelta) -> Self {
        Self { from, to }
    }

    pub fn from_config(
        operation: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let from = match from {
            Some(raw) => parse_signed_duration(operation, "from", raw)?.1,
            None => TimeDelta::MIN,
        };
        let to = match to {
            Some(raw) => parse_signed_duration(operation, "to", raw)?.1,
            None => TimeDelta::MAX,
        };

        Ok(Self::new(from, to))
    }
}

impl ExcludeFilter for CurrentTimestampExclude {
    fn name(&self) -> &'static str {
        "current timestamp"
    }

    fn apply(&self, partitions: &PartitionList) -> Result<PartitionList, FilterError> {
        let now = Utc::now();
        let from = clamped_add(now, self.from);
        let to = clamped_add(now, self.to);

        info!(
            from = %from.to_rfc3339(),
            to = %to.to_rfc3339(),
            "current timestamp exclude"
        );

        let mut kept = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let ts = partition_timestamp(partition)?;
            let exclude = ts >= from && ts < to;
            if !exclude {
                kept.push(partition.clone());
            }
        }

        Ok(kept)
    }
}
