//! Immutable-after-build registries for providers, resources and operations.
//!
//! All configuration-time invariants are enforced here, before any discovery
//! or execution work starts.

use std::collections::HashMap;
use std::sync::Arc;

use common::config::{ActionKind, ConfigError, Configuration, ProviderKind};
use common::provider::Provider;
use common::resource::Resource;

use crate::exclude::build_filters;
use crate::operations::{Operation, OperationKind};
use crate::providers::{ObjectStoreProvider, SqlProvider};

/// The fully validated runtime of one curator run. Constructed once, passed
/// by reference thereafter.
pub struct Runtime {
    providers: HashMap<String, Arc<dyn Provider>>,
    resources: HashMap<String, Arc<Resource>>,
    operations: HashMap<String, Arc<Operation>>,
    sources: HashMap<String, Arc<Resource>>,
    targets: HashMap<String, Arc<Resource>>,
    provider_concurrency: usize,
    armed: bool,
}

impl Runtime {
    /// Build and validate the runtime from a loaded configuration.
    pub fn build(config: &Configuration, armed: bool) -> Result<Self, ConfigError> {
        if config.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        if config.operations.is_empty() {
            return Err(ConfigError::NoOperations);
        }

        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        for provider_config in &config.providers {
            if providers.contains_key(&provider_config.name) {
                return Err(ConfigError::DuplicateProvider {
                    name: provider_config.name.clone(),
                });
            }

            let provider: Arc<dyn Provider> = match provider_config.kind {
                ProviderKind::ObjectStore => Arc::new(ObjectStoreProvider::new(provider_config)?),
                ProviderKind::Sql => Arc::new(SqlProvider::new(provider_config)),
            };
            providers.insert(provider_config.name.clone(), provider);
        }

        let mut resources: HashMap<String, Arc<Resource>> = HashMap::new();
        for resource_config in &config.resources {
            if resources.contains_key(&resource_config.name) {
                return Err(ConfigError::DuplicateResource {
                    name: resource_config.name.clone(),
                });
            }

            let provider = providers.get(&resource_config.provider).ok_or_else(|| {
                ConfigError::UnknownProvider {
                    resource: resource_config.name.clone(),
                    provider: resource_config.provider.clone(),
                }
            })?;
            let resource = provider.make_resource(resource_config)?;
            resources.insert(resource_config.name.clone(), resource);
        }

        let mut operations = Vec::with_capacity(config.operations.len());
        for operation_config in &config.operations {
            let source = resources.get(&operation_config.source).ok_or_else(|| {
                ConfigError::UnknownResource {
                    operation: operation_config.name.clone(),
                    role: "source",
                    resource: operation_config.source.clone(),
                }
            })?;

            let kind = match operation_config.action {
                ActionKind::Remove => {
                    if operation_config.target.is_some() {
                        return Err(ConfigError::UnexpectedTarget {
                            operation: operation_config.name.clone(),
                        });
                    }
                    OperationKind::Remove
                }
                ActionKind::Replicate => {
                    let target_name = operation_config.target.as_ref().ok_or_else(|| {
                        ConfigError::MissingTarget {
                            operation: operation_config.name.clone(),
                        }
                    })?;
                    let target = resources.get(target_name).ok_or_else(|| {
                        ConfigError::UnknownResource {
                            operation: operation_config.name.clone(),
                            role: "target",
                            resource: target_name.clone(),
                        }
                    })?;
                    if source.provider_name() != target.provider_name() {
                        return Err(ConfigError::ProviderMismatch {
                            operation: operation_config.name.clone(),
                        });
                    }
                    OperationKind::Replicate {
                        target: target.clone(),
                    }
                }
            };

            let excludes = build_filters(&operation_config.name, &operation_config.exclude)?;
            // resources always resolve their provider, it created them
            let provider = providers[source.provider_name()].clone();

            operations.push(Arc::new(Operation::new(
                &operation_config.name,
                kind,
                source.clone(),
                provider,
                excludes,
                operation_config.depends_on.clone(),
            )));
        }

        Self::assemble(
            providers,
            resources,
            operations,
            config.provider_concurrency(),
            armed,
        )
    }

    /// Assemble a runtime from pre-built parts, running the same registry
    /// validations as [`Runtime::build`].
    pub fn from_parts(
        providers: Vec<Arc<dyn Provider>>,
        operations: Vec<Arc<Operation>>,
        provider_concurrency: usize,
        armed: bool,
    ) -> Result<Self, ConfigError> {
        let mut provider_map: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        let mut resources: HashMap<String, Arc<Resource>> = HashMap::new();

        for provider in providers {
            if provider_map.contains_key(provider.name()) {
                return Err(ConfigError::DuplicateProvider {
                    name: provider.name().to_string(),
                });
            }
            for resource in provider.resources() {
                if resources.contains_key(resource.name()) {
                    return Err(ConfigError::DuplicateResource {
                        name: resource.name().to_string(),
                    });
                }
                resources.insert(resource.name().to_string(), resource);
            }
            provider_map.insert(provider.name().to_string(), provider);
        }

        let concurrency = provider_concurrency.max(1);
        Self::assemble(provider_map, resources, operations, concurrency, armed)
    }

    fn assemble(
        providers: HashMap<String, Arc<dyn Provider>>,
        resources: HashMap<String, Arc<Resource>>,
        operations: Vec<Arc<Operation>>,
        provider_concurrency: usize,
        armed: bool,
    ) -> Result<Self, ConfigError> {
        let mut operation_map: HashMap<String, Arc<Operation>> = HashMap::new();
        let mut sources: HashMap<String, Arc<Resource>> = HashMap::new();
        let mut targets: HashMap<String, Arc<Resource>> = HashMap::new();

        for operation in operations {
            if operation_map.contains_key(operation.name()) {
                return Err(ConfigError::DuplicateOperation {
                    name: operation.name().to_string(),
                });
            }

            sources.insert(operation.source().name().to_string(), operation.source().clone());
            if let Some(target) = operation.target() {
                targets.insert(target.name().to_string(), target.clone());
            }
            operation_map.insert(operation.name().to_string(), operation);
        }

        for operation in operation_map.values() {
            for dependency in operation.depends_on() {
                if !operation_map.contains_key(dependency) {
                    return Err(ConfigError::UnknownDependency {
                        operation: operation.name().to_string(),
                        dependency: dependency.clone(),
                    });
                }
            }

            // a target that is also a source would race its producer without
            // an explicit dependency edge
            if let Some(target) = operation.target() {
                if sources.contains_key(target.name()) {
                    return Err(ConfigError::TargetIsSource {
                        operation: operation.name().to_string(),
                        resource: target.name().to_string(),
                    });
                }
            }
        }

        Ok(Self {
            providers,
            resources,
            operations: operation_map,
            sources,
            targets,
            provider_concurrency,
            armed,
        })
    }

    pub fn providers(&self) -> &HashMap<String, Arc<dyn Provider>> {
        &self.providers
    }

    pub fn resources(&self) -> &HashMap<String, Arc<Resource>> {
        &self.resources
    }

    pub fn operations(&self) -> &HashMap<String, Arc<Operation>> {
        &self.operations
    }

    pub fn operation(&self, name: &str) -> Option<Arc<Operation>> {
        self.operations.get(name).cloned()
    }

    pub fn armed(&self) -> bool {
        self.armed
    }

    pub fn provider_concurrency(&self) -> usize {
        self.provider_concurrency
    }

    /// Whether a resource takes part in discovery: `Some(true)` for operation
    /// sources, `Some(false)` for replicate targets, `None` for unreferenced
    /// resources (which are skipped entirely).
    pub fn discovery_role(&self, resource: &str) -> Option<bool> {
        if self.sources.contains_key(resource) {
            Some(true)
        } else if self.targets.contains_key(resource) {
            Some(false)
        } else {
            None
        }
    }
}
