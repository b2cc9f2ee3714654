//! Declarative plan configuration: providers, resources and operations.

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::partition::values::ColumnSpec;

/// The full declarative plan, loaded from `curator.toml` merged with
/// `CURATOR__`-prefixed environment variables.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Configuration {
    /// How many providers may collect partitions at the same time.
    #[serde(default = "default_concurrency")]
    pub provider_concurrency: i64,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    #[serde(default)]
    pub operations: Vec<OperationConfig>,
}

fn default_concurrency() -> i64 {
    1
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            provider_concurrency: default_concurrency(),
            providers: Vec::new(),
            resources: Vec::new(),
            operations: Vec::new(),
        }
    }
}

impl Configuration {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file("curator.toml"))
            .merge(Env::prefixed("CURATOR__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CURATOR__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    /// Provider concurrency with non-positive values sanitized to 1.
    pub fn provider_concurrency(&self) -> usize {
        sanitize_concurrency(self.provider_concurrency, "provider_concurrency")
    }
}

pub(crate) fn sanitize_concurrency(value: i64, field: &str) -> usize {
    if value < 1 {
        warn!("strange {field} value of {value:?}, sanitizing to 1");
        1
    } else {
        value as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Object-store backend (s3, gs, az, file, memory DSNs).
    ObjectStore,
    /// SQL-queryable backend (postgres, sqlite DSNs).
    Sql,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub dsn: String,
    /// How many of this provider's resources may be discovered concurrently.
    #[serde(default = "default_concurrency")]
    pub resource_concurrency: i64,
}

impl ProviderConfig {
    pub fn resource_concurrency(&self) -> usize {
        sanitize_concurrency(self.resource_concurrency, "resource_concurrency")
    }
}

/// A resource binds a partition spec to a location within its provider.
///
/// Exactly one location shape must be configured: `prefix` (hive layout),
/// `prefix` + `regex` (capture-group keys) or `table`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    pub provider: String,
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Remove,
    Replicate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationConfig {
    pub name: String,
    pub action: ActionKind,
    pub source: String,
    /// Target resource, required for replicate operations.
    #[serde(default)]
    pub target: Option<String>,
    /// Names of operations that must complete per shared partition first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Exclude chain, applied left to right.
    #[serde(default)]
    pub exclude: Vec<ExcludeConfig>,
}

/// One exclude rule. Duration-valued bounds are humantime strings with an
/// optional leading `-`; relative-partition bounds are index offsets where a
/// negative value anchors from the end of the sorted list.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExcludeConfig {
    AbsoluteTimestamp {
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
    },
    CurrentTimestamp {
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
    },
    PartitionTimestamp {
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
    },
    RelativePartition {
        #[serde(default)]
        from: Option<i64>,
        #[serde(default)]
        to: Option<i64>,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("no provider definition found")]
    NoProviders,

    #[error("no operation definition found")]
    NoOperations,

    #[error("duplicate provider name {name:?}")]
    DuplicateProvider { name: String },

    #[error("duplicate resource name {name:?}")]
    DuplicateResource { name: String },

    #[error("duplicate operation name {name:?}")]
    DuplicateOperation { name: String },

    #[error("initializing provider {provider:?} failed: {reason}")]
    ProviderInit { provider: String, reason: String },

    #[error("configured provider {provider:?} of resource {resource:?} is no known provider")]
    UnknownProvider { resource: String, provider: String },

    #[error("resource {resource:?} has no partition columns")]
    EmptySpec { resource: String },

    #[error("{field:?} not set for resource {resource:?}")]
    MissingField { resource: String, field: &'static str },

    #[error("resource {resource:?} does not take a {field:?} field for its provider kind")]
    MisplacedField { resource: String, field: &'static str },

    #[error("regex of resource {resource:?} does not compile: {reason}")]
    InvalidRegex { resource: String, reason: String },

    #[error("regex of resource {resource:?} has {got} capture groups but the spec has {expected} columns")]
    CaptureCount {
        resource: String,
        expected: usize,
        got: usize,
    },

    #[error("configured {role} {resource:?} of operation {operation:?} is no known resource")]
    UnknownResource {
        operation: String,
        role: &'static str,
        resource: String,
    },

    #[error("operation {operation:?} has no target configured")]
    MissingTarget { operation: String },

    #[error("operation {operation:?} does not take a target")]
    UnexpectedTarget { operation: String },

    #[error("source and target of operation {operation:?} must share the same provider")]
    ProviderMismatch { operation: String },

    #[error("resource {resource:?} is the target of operation {operation:?} and a source as well")]
    TargetIsSource { operation: String, resource: String },

    #[error("operation {operation:?} assumed dependency {dependency:?} which does not exist")]
    UnknownDependency {
        operation: String,
        dependency: String,
    },

    #[error("{field:?} field in exclude of operation {operation:?} is not a valid timestamp ({value:?}): {reason}")]
    InvalidTimestamp {
        operation: String,
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{field:?} field in exclude of operation {operation:?} is not a valid duration ({value:?}): {reason}")]
    InvalidDuration {
        operation: String,
        field: &'static str,
        value: String,
        reason: String,
    },
}
