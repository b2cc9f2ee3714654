//! SQL-backed provider: DISTINCT-cast partition enumeration and DELETE-based
//! removal. Tables carry no object aggregates, so time-based excludes are
//! unavailable for their partitions.

use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use futures::FutureExt;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use tracing::info;

use common::config::{ConfigError, ProviderConfig, ResourceConfig};
use common::partition::values::ColumnSpec;
use common::partition::{Partition, PartitionList};
use common::provider::{
    DiscoveryError, PreparedAction, PreparedActions, Provider, ProviderError, RemovePartitions,
};
use common::resource::{Resource, ResourceLocation};

static INSTALL_DRIVERS: Once = Once::new();

pub struct SqlProvider {
    name: String,
    dsn: String,
    resource_concurrency: usize,
    pool: tokio::sync::OnceCell<AnyPool>,
    resources: Mutex<Vec<Arc<Resource>>>,
}

impl SqlProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            dsn: config.dsn.clone(),
            resource_concurrency: config.resource_concurrency(),
            pool: tokio::sync::OnceCell::new(),
            resources: Mutex::new(Vec::new()),
        }
    }

    /// Lazily connected pool, shared across this provider's resources.
    async fn pool(&self) -> Result<&AnyPool, sqlx::Error> {
        self.pool
            .get_or_try_init(|| async {
                INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);
                AnyPoolOptions::new()
                    .max_connections(1)
                    .connect(&self.dsn)
                    .await
            })
            .await
    }
}

#[async_trait]
impl Provider for SqlProvider {
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
        if config.prefix.is_some() {
            return Err(ConfigError::MisplacedField {
                resource: config.name.clone(),
                field: "prefix",
            });
        }
        if config.regex.is_some() {
            return Err(ConfigError::MisplacedField {
                resource: config.name.clone(),
                field: "regex",
            });
        }

        let table = config
            .table
            .clone()
            .ok_or_else(|| ConfigError::MissingField {
                resource: config.name.clone(),
                field: "table",
            })?;

        let resource = Arc::new(Resource::new(
            &config.name,
            &self.name,
            config.columns.clone(),
            ResourceLocation::Table { table },
        ));
        self.resources.lock().unwrap().push(resource.clone());
        Ok(resource)
    }

    fn resources(&self) -> Vec<Arc<Resource>> {
        self.resources.lock().unwrap().clone()
    }

    async fn check_access(&self) -> Result<(), DiscoveryError> {
        let access = |e: sqlx::Error| DiscoveryError::Access {
            provider: self.name.clone(),
            source: anyhow::Error::new(e),
        };

        let pool = self.pool().await.map_err(access)?;
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .map(|_| ())
            .map_err(access)
    }

    async fn discover(&self, resource: &Arc<Resource>) -> Result<usize, DiscoveryError> {
        let ResourceLocation::Table { table } = resource.location() else {
            return Err(DiscoveryError::UnsupportedLocation {
                resource: resource.name().to_string(),
            });
        };

        let query_error = |e: sqlx::Error| DiscoveryError::Query {
            resource: resource.name().to_string(),
            source: anyhow::Error::new(e),
        };

        let sql = partition_query(table, resource.spec());
        info!(resource = resource.name(), sql, "partition query");

        let pool = self.pool().await.map_err(query_error)?;
        let rows = sqlx::query(&sql).fetch_all(pool).await.map_err(query_error)?;
        let row_count = rows.len();

        for row in rows {
            let mut raw_values = Vec::with_capacity(resource.spec().len());
            for index in 0..resource.spec().len() {
                raw_values.push(row.try_get::<String, _>(index).map_err(query_error)?);
            }

            // no aggregates: tables report neither sizes nor timestamps
            let partition = Partition::from_raw(resource.spec(), raw_values, None).map_err(
                |source| DiscoveryError::Parse {
                    resource: resource.name().to_string(),
                    source,
                },
            )?;
            resource.merge_or_insert(partition);
        }

        Ok(row_count)
    }

    fn remover(&self) -> Option<&dyn RemovePartitions> {
        Some(self)
    }
}

#[async_trait]
impl RemovePartitions for SqlProvider {
    async fn remove_partitions(
        &self,
        partitions: &PartitionList,
        source: &Resource,
    ) -> Result<PreparedActions, ProviderError> {
        let ResourceLocation::Table { table } = source.location() else {
            return Err(ProviderError::UnsupportedLayout {
                resource: source.name().to_string(),
                operation: "remove",
            });
        };

        let pool = self
            .pool()
            .await
            .map_err(|e| ProviderError::Staging {
                resource: source.name().to_string(),
                source: anyhow::Error::new(e),
            })?
            .clone();

        let mut prepared = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let sql = delete_statement(table, source, partition);
            info!("preparing: {sql}");

            let pool = pool.clone();
            let action = async move {
                info!("executing: {sql}");
                sqlx::query(&sql).execute(&pool).await?;
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

fn partition_query(table: &str, spec: &[ColumnSpec]) -> String {
    let columns: Vec<String> = spec
        .iter()
        .map(|column| format!("CAST({} AS TEXT)", column.name))
        .collect();

    format!("SELECT DISTINCT {} FROM {table}", columns.join(", "))
}

fn delete_statement(table: &str, source: &Resource, partition: &Partition) -> String {
    let predicates: Vec<String> = source
        .spec()
        .iter()
        .zip(partition.values())
        .map(|(column, value)| format!("{} = '{}'", column.name, value.replace('\'', "''")))
        .collect();

    format!("DELETE FROM {table} WHERE {}", predicates.join(" AND "))
}

#[cfg(test)]
mod tests {
    use super::*;

    use common::partition::values::{ColumnSpec, ColumnType};

    fn table_resource() -> Resource {
        Resource::new(
            "events",
            "warehouse",
            vec![
                ColumnSpec {
                    name: "day".to_string(),
                    kind: ColumnType::Date,
                },
                ColumnSpec {
                    name: "host".to_string(),
                    kind: ColumnType::Text,
                },
            ],
            ResourceLocation::Table {
                table: "events".to_string(),
            },
        )
    }

    #[test]
    fn test_partition_query_casts_every_column() {
        let resource = table_resource();
        let sql = partition_query("events", resource.spec());
        assert_eq!(
            sql,
            "SELECT DISTINCT CAST(day AS TEXT), CAST(host AS TEXT) FROM events"
        );
    }

    #[test]
    fn test_delete_statement_escapes_values() {
        let resource = table_resource();
        let partition = Partition::from_raw(
            resource.spec(),
            vec!["2024-01-02".to_string(), "o'hare".to_string()],
            None,
        )
        .unwrap();

        let sql = delete_statement("events", &resource, &partition);
        assert_eq!(
            sql,
            "DELETE FROM events WHERE day = '2024-01-02' AND host = 'o''hare'"
        );
    }
}
