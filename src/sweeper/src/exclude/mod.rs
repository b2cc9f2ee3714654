//! Exclude filters narrowing an operation's partition list.
//!
//! Filters are pure: they never mutate their input and return a freshly
//! built list. The three time-based filters remove partitions whose
//! timestamp falls inside a `[from, to)` window; the relative-position
//! filter removes an index band of the sorted list instead.

mod absolute;
mod current;
mod relative;
mod window;

pub use absolute::AbsoluteTimestampExclude;
pub use current::CurrentTimestampExclude;
pub use relative::RelativePartitionExclude;
pub use window::PartitionTimestampExclude;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use common::config::{ConfigError, ExcludeConfig};
use common::partition::{Partition, PartitionList};

pub trait ExcludeFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, partitions: &PartitionList) -> Result<PartitionList, FilterError>;
}

/// Build an operation's filter chain from its configured exclude list.
pub fn build_filters(
    operation: &str,
    configs: &[ExcludeConfig],
) -> Result<Vec<Box<dyn ExcludeFilter>>, ConfigError> {
    configs
        .iter()
        .map(|config| -> Result<Box<dyn ExcludeFilter>, ConfigError> {
            match config {
                ExcludeConfig::AbsoluteTimestamp { from, to } => {
                    Ok(Box::new(AbsoluteTimestampExclude::from_config(
                        operation,
                        from.as_deref(),
                        to.as_deref(),
                    )?))
                }
                ExcludeConfig::CurrentTimestamp { from, to } => {
                    Ok(Box::new(CurrentTimestampExclude::from_config(
                        operation,
                        from.as_deref(),
                        to.as_deref(),
                    )?))
                }
                ExcludeConfig::PartitionTimestamp { from, to } => {
                    Ok(Box::new(PartitionTimestampExclude::from_config(
                        operation,
                        from.as_deref(),
                        to.as_deref(),
                    )?))
                }
                ExcludeConfig::RelativePartition { from, to } => {
                    Ok(Box::new(RelativePartitionExclude::from_config(*from, *to)))
                }
            }
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("partition {partition:?} does not report a timestamp")]
    MissingTimestamp { partition: String },

    #[error("{filter} exclude needs at least one partition to anchor its window")]
    EmptyInput { filter: &'static str },
}

pub(crate) fn partition_timestamp(partition: &Partition) -> Result<DateTime<Utc>, FilterError> {
    partition
        .latest_timestamp()
        .ok_or_else(|| FilterError::MissingTimestamp {
            partition: partition.hash_id().to_string(),
        })
}

/// Parse a humantime duration with an optional leading `-` sign.
///
/// Returns the signed offset and whether the sign was negative; the
/// partition-timestamp filter uses the sign to pick its anchor as well.
pub(crate) fn parse_signed_duration(
    operation: &str,
    field: &'static str,
    value: &str,
) -> Result<(bool, TimeDelta), ConfigError> {
    let (negative, body) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };

    let invalid = |reason: String| ConfigError::InvalidDuration {
        operation: operation.to_string(),
        field,
        value: value.to_string(),
        reason,
    };

    let duration = humantime::parse_duration(body.trim()).map_err(|e| invalid(e.to_string()))?;
    let delta = TimeDelta::from_std(duration).map_err(|e| invalid(e.to_string()))?;

    Ok((negative, if negative { -delta } else { delta }))
}

/// Add a signed offset to an instant, clamping instead of overflowing.
pub(crate) fn clamped_add(base: DateTime<Utc>, offset: TimeDelta) -> DateTime<Utc> {
    base.checked_add_signed(offset).unwrap_or(if offset < TimeDelta::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signed_duration_positive() {
        let (negative, delta) = parse_signed_duration("op", "from", "2h").unwrap();
        assert!(!negative);
        assert_eq!(delta, TimeDelta::hours(2));
    }

    #[test]
    fn test_parse_signed_duration_negative() {
        let (negative, delta) = parse_signed_duration("op", "to", "-30m").unwrap();
        assert!(negative);
        assert_eq!(delta, TimeDelta::minutes(-30));
    }

    #[test]
    fn test_parse_signed_duration_rejects_garbage() {
        let result = parse_signed_duration("op", "to", "soon");
        assert!(matches!(result, Err(ConfigError::InvalidDuration { .. })));
    }

    #[test]
    fn test_build_filters_from_config() {
        let configs = vec![
            common::config::ExcludeConfig::CurrentTimestamp {
                from: None,
                to: Some("-30d".to_string()),
            },
            common::config::ExcludeConfig::RelativePartition {
                from: Some(1),
                to: Some(-1),
            },
        ];

        let filters = build_filters("expire", &configs).unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].name(), "current timestamp");
        assert_eq!(filters[1].name(), "relative partition");
    }
}
