use chrono::{DateTime, Utc};
use tracing::info;

use common::config::ConfigError;
use common::partition::PartitionList;

use crate::exclude::{partition_timestamp, ExcludeFilter, FilterError};

/// Excludes partitions whose timestamp falls inside a literal `[from, to)`
/// wall-clock window.
pub struct AbsoluteTimestampExclude {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl AbsoluteTimestampExclude {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn from_config(
        operation: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let from = match from {
            Some(raw) => parse_instant(operation, "from", raw)?,
            None => DateTime::UNIX_EPOCH,
        };
        let to = match to {
            Some(raw) => parse_instant(operation, "to", raw)?,
            None => DateTime::<Utc>::MAX_UTC,
        };

        Ok(Self::new(from, to))
    }
}

fn parse_instant(
    operation: &str,
    field: &'static str,
    raw: &str,
) -> Result<DateTime<Utc>, ConfigError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|e| ConfigError::InvalidTimestamp {
            operation: operation.to_string(),
            field,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

impl ExcludeFilter for AbsoluteTimestampExclude {
    fn name(&self) -> &'static str {
        "absolute timestamp"
    }

    fn apply(&self, partitions: &PartitionList) -> Result<PartitionList, FilterError> {
        info!(
            from = %self.from.to_rfc3339(),
            to = %self.to.to_rfc3339(),
            "absolute timestamp exclude"
        );

        let mut kept = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let ts = partition_timestamp(partition)?;
            let exclude = ts >= self.from && ts < self.to;
            if !exclude {
                kept.push(partition.clone());
            }
        }

        Ok(kept)
    }
}
