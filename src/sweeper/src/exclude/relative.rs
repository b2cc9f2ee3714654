use tracing::info;

use common::partition::{sort_by_values, PartitionList};

use crate::exclude::{ExcludeFilter, FilterError};

/// One index bound of the excluded band. Negative configured values anchor
/// from the end of the sorted list.
#[derive(Clone, Copy, Debug)]
struct IndexBound {
    from_end: bool,
    offset: i64,
}

impl IndexBound {
    fn resolve(&self, len: usize) -> usize {
        let index = if self.from_end {
            len as i64 + self.offset
        } else {
            self.offset
        };

        index.clamp(0, len as i64) as usize
    }
}

/// Excludes the index band `[from, to)` of the sorted partition list and
/// keeps both ends, the inverse shape of the time-based filters.
///
/// Position based, so partitions without timestamps are fine here.
pub struct RelativePartitionExclude {
    from: IndexBound,
    to: IndexBound,
}

impl RelativePartitionExclude {
    pub fn new(from: i64, to: i64) -> Self {
        Self {
            from: IndexBound {
                from_end: from < 0,
                offset: from,
            },
            to: IndexBound {
                from_end: to < 0,
                offset: to,
            },
        }
    }

    pub fn from_config(from: Option<i64>, to: Option<i64>) -> Self {
        let from = match from {
            Some(value) => IndexBound {
                from_end: value < 0,
                offset: value,
            },
            None => IndexBound {
                from_end: false,
                offset: 0,
            },
        };
        // a missing upper bound reaches to the end of the list
        let to = match to {
            Some(value) => IndexBound {
                from_end: value < 0,
                offset: value,
            },
            None => IndexBound {
                from_end: true,
                offset: 0,
            },
        };

        Self { from, to }
    }
}

impl ExcludeFilter for RelativePartitionExclude {
    fn name(&self) -> &'static str {
        "relative partition"
    }

    fn apply(&self, partitions: &PartitionList) -> Result<PartitionList, FilterError> {
        let mut sorted = partitions.clone();
        sort_by_values(&mut sorted);

        let from = self.from.resolve(sorted.len());
        let to = self.to.resolve(sorted.len());

        let mut kept: PartitionList = sorted[..from].to_vec();
        kept.extend_from_slice(&sorted[to..]);

        if let (Some(first), Some(last)) = (kept.first(), kept.last()) {
            info!(
                from = first.hash_id(),
                to = last.hash_id(),
                count = kept.len(),
                "relative partition exclude keeps"
            );
        }

        Ok(kept)
    }
}
