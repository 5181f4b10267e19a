//! Type-path resolution: alias expansion in front of the factory registry.

pub mod alias;
pub mod types;

use dashmap::DashMap;
use std::sync::Arc;
use tracing::trace;

use crate::core::errors::Result;

pub use alias::AliasMap;
pub use types::{ActionType, DataType, Factory, TaskType, TypeRef, TypeRegistry, PLUGINS};

/// Resolves (possibly aliased) type paths to registered types.
///
/// Successful resolutions are memoised per input path, so resolving the same
/// path twice yields the identical [`TypeRef`]. Redefining an alias drops the
/// memo.
#[derive(Debug, Clone)]
pub struct Resolver {
    registry: Arc<TypeRegistry>,
    aliases: AliasMap,
    cache: DashMap<String, TypeRef>,
}

impl Resolver {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_aliases(registry, AliasMap::new())
    }

    pub fn with_aliases(registry: Arc<TypeRegistry>, aliases: AliasMap) -> Self {
        Self {
            registry,
            aliases,
            cache: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn aliases(&self) -> &AliasMap {
        &self.aliases
    }

    /// Define or redefine an alias token
    pub fn set_alias(&mut self, token: impl Into<String>, prefix: impl Into<String>) {
        let token = token.into();
        let prefix = prefix.into();
        if let Some(previous) = self.aliases.insert(token.clone(), prefix.clone()) {
            trace!("alias {} redefined: {} -> {}", token, previous, prefix);
        }
        self.cache.clear();
    }

    /// Fully expanded form of `path`
    pub fn expand(&self, path: &str) -> Result<String> {
        let registry = &self.registry;
        self.aliases
            .expand(path, |token| registry.has_root(token))
            .map(|expanded| expanded.into_owned())
    }

    pub fn resolve(&self, path: &str) -> Result<TypeRef> {
        if let Some(hit) = self.cache.get(path) {
            return Ok(hit.value().clone());
        }
        let expanded = self.expand(path)?;
        let resolved = self.registry.lookup(&expanded)?;
        // Entry API keeps the first stored reference if two callers race.
        let entry = self
            .cache
            .entry(path.to_string())
            .or_insert_with(|| resolved);
        Ok(entry.value().clone())
    }

    pub fn resolve_data(&self, path: &str) -> Result<Arc<DataType>> {
        self.resolve(path)?.into_data()
    }

    pub fn resolve_action(&self, path: &str) -> Result<Arc<ActionType>> {
        self.resolve(path)?.into_action()
    }

    pub fn resolve_task(&self, path: &str) -> Result<Arc<TaskType>> {
        self.resolve(path)?.into_task()
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
