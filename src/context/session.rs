use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Context, ContextKey, DataPool, WorkflowGraph};
use crate::core::config::DacConfig;
use crate::core::errors::{DacError, Result};
use crate::invoke::quick::{self, TaskOutcome};
use crate::invoke::{Disambiguator, Invocation};
use crate::modules::DEFAULT_REGISTRY;
use crate::node::{ConstructConfig, DataNode, ParamMap};
use crate::plugin::{MenuItem, MenuKey, PluginLoader, RegistryState};
use crate::registry::{ActionType, DataType, TypeRegistry};

/// Top-level container: the registry state, the Global context and one
/// Context per context-key node, in creation order.
pub struct Session {
    state: RegistryState,
    policy: Box<dyn Disambiguator>,
    global: Context,
    contexts: IndexMap<Uuid, Context>,
    current: Option<Uuid>,
}

impl Session {
    pub fn new(state: RegistryState) -> Self {
        let global = Context::global(state.registry().clone());
        Self {
            state,
            policy: Box::new(crate::core::config::CandidatePolicy::default()),
            global,
            contexts: IndexMap::new(),
            current: None,
        }
    }

    /// Build the type registry from linked plugins and load the configured
    /// registry document (the bundled one when none is configured).
    pub fn from_config(config: &DacConfig) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(TypeRegistry::with_plugins());
        let loader = PluginLoader::new(registry);
        let loaded = match &config.registry {
            Some(path) => loader.load_file(path)?,
            None => loader.load_str(DEFAULT_REGISTRY)?,
        };
        let state = if config.strict_plugins {
            loaded.into_result()?
        } else {
            for error in &loaded.errors {
                warn!("registry entry skipped: {}", error);
            }
            loaded.state
        };
        info!("session ready with {} registered types", state.registry().len());
        Ok(Self::new(state).with_policy(config.candidates))
    }

    pub fn with_policy(mut self, policy: impl Disambiguator + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn state(&self) -> &RegistryState {
        &self.state
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.state.registry()
    }

    pub fn policy(&self) -> &dyn Disambiguator {
        self.policy.as_ref()
    }

    pub fn global(&self) -> &Context {
        &self.global
    }

    /// Contexts keyed by Global nodes, in creation order
    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.contexts.values()
    }

    pub fn context(&self, key: &Uuid) -> Option<&Context> {
        self.contexts.get(key)
    }

    /// Key of the active context; `None` is the Global context
    pub fn current_key(&self) -> Option<Uuid> {
        self.current
    }

    pub fn current(&self) -> &Context {
        self.current
            .and_then(|key| self.contexts.get(&key))
            .unwrap_or(&self.global)
    }

    fn current_mut(&mut self) -> (&mut Context, Option<&DataPool>) {
        match self.current.and_then(|key| self.contexts.get_mut(&key)) {
            Some(context) => (context, Some(self.global.data())),
            None => (&mut self.global, None),
        }
    }

    /// Whether `uuid` is used anywhere in the session
    pub fn is_taken(&self, uuid: &Uuid) -> bool {
        self.global.is_taken(None, uuid) || self.contexts.values().any(|c| c.is_taken(None, uuid))
    }

    /// Insert a node into the Global pool, checking every context
    pub fn insert_global(&mut self, node: Box<dyn DataNode>) -> Result<Uuid> {
        let uuid = node.uuid();
        if self.is_taken(&uuid) {
            return Err(DacError::DuplicateUuid { uuid });
        }
        self.global.insert_data(None, node)
    }

    pub fn add_global_data(&mut self, type_path: &str, config: &ConstructConfig) -> Result<Uuid> {
        let data_type = self.state.resolver().resolve_data(type_path)?;
        self.insert_global(data_type.instantiate(config)?)
    }

    /// Open (or return) the Context keyed by a Global context-key node
    pub fn open_context(&mut self, key: Uuid) -> Result<&mut Context> {
        let node = self
            .global
            .data_node(&key)
            .ok_or_else(|| DacError::not_found("global node", key))?;
        let type_path = node.type_path();
        let is_key = self
            .registry()
            .data_type(type_path)
            .is_some_and(|t| t.is_context_key());
        if !is_key {
            return Err(DacError::type_mismatch(
                key.to_string(),
                "context-key data type",
                type_path,
            ));
        }
        let name = node.name().to_string();
        let registry = self.registry().clone();
        let context = self.contexts.entry(key).or_insert_with(|| {
            info!("opened context '{}' ({})", name, key);
            Context::new(
                name,
                ContextKey::Node {
                    uuid: key,
                    type_path: type_path.to_string(),
                },
                registry,
            )
        });
        Ok(context)
    }

    /// Make the Context keyed by `key` current; `None` selects Global
    pub fn activate(&mut self, key: Option<Uuid>) -> Result<()> {
        if let Some(key) = key {
            if !self.contexts.contains_key(&key) {
                return Err(DacError::not_found("context", key));
            }
        }
        self.current = key;
        Ok(())
    }

    /// Remove a Global node, discarding the Context it keys
    pub fn remove_global(&mut self, uuid: &Uuid) -> Result<Box<dyn DataNode>> {
        let node = self.global.remove(uuid)?;
        if let Some(context) = self.contexts.shift_remove(uuid) {
            info!("discarded context '{}' with its key node", context.name());
        }
        if self.current == Some(*uuid) {
            self.current = None;
        }
        Ok(node)
    }

    /// Rename a node of the current context; renaming a context-key node in
    /// the Global context renames its Context too.
    pub fn rename(&mut self, uuid: &Uuid, name: &str) -> Result<()> {
        let (context, _) = self.current_mut();
        context.rename(uuid, name)?;
        if self.current.is_none() {
            if let Some(keyed) = self.contexts.get_mut(uuid) {
                keyed.set_name(name);
            }
        }
        Ok(())
    }

    /// Create a Data node in the current context
    pub fn add_data(&mut self, type_path: &str, config: &ConstructConfig) -> Result<Uuid> {
        if self.current.is_none() {
            return self.add_global_data(type_path, config);
        }
        let data_type = self.state.resolver().resolve_data(type_path)?;
        let (context, global) = self.current_mut();
        context.add_data(global, &data_type, config)
    }

    /// Insert a ready-made Data node into the current context
    pub fn insert_data(&mut self, node: Box<dyn DataNode>) -> Result<Uuid> {
        if self.current.is_none() {
            return self.insert_global(node);
        }
        let (context, global) = self.current_mut();
        context.insert_data(global, node)
    }

    /// Create an Action node in the current context without running it
    pub fn add_action(&mut self, type_path: &str, params: ParamMap) -> Result<Uuid> {
        let action_type = self.state.resolver().resolve_action(type_path)?;
        let (context, global) = self.current_mut();
        context.add_action(global, &action_type, params)
    }

    pub fn remove(&mut self, uuid: &Uuid) -> Result<Box<dyn DataNode>> {
        if self.current.is_none() {
            return self.remove_global(uuid);
        }
        let (context, _) = self.current_mut();
        context.remove(uuid)
    }

    /// Run a stored Action node of the current context
    pub fn run_action(&mut self, uuid: &Uuid, overrides: &ParamMap) -> Result<Invocation> {
        let policy = self.policy.as_ref();
        let (context, global) = match self.current.and_then(|key| self.contexts.get_mut(&key)) {
            Some(context) => (context, Some(self.global.data())),
            None => (&mut self.global, None),
        };
        context.run_action(global, uuid, overrides, policy)
    }

    /// Quick Action on a node visible from the current context
    pub fn run_quick(&mut self, data_uuid: Uuid, overrides: &ParamMap) -> Result<Invocation> {
        let policy = self.policy.as_ref();
        let state = &self.state;
        let (context, global) = match self.current.and_then(|key| self.contexts.get_mut(&key)) {
            Some(context) => (context, Some(self.global.data())),
            None => (&mut self.global, None),
        };
        quick::run_quick(state, context, global, data_uuid, overrides, policy)
    }

    /// Run the Quick Task for `param` of a stored Action node and store the
    /// resolved value. A cancelled task changes nothing.
    pub fn run_task(&mut self, action_uuid: &Uuid, param: &str) -> Result<TaskOutcome> {
        let state = &self.state;
        let context = match self.current.and_then(|key| self.contexts.get_mut(&key)) {
            Some(context) => context,
            None => &mut self.global,
        };
        let node = context
            .action_mut(action_uuid)
            .ok_or_else(|| DacError::not_found("action node", action_uuid))?;
        let outcome = quick::run_task(state, node.type_path(), param, node.param(param))?;
        if let TaskOutcome::Resolved(binding) = &outcome {
            node.set_param(param, binding.clone());
        }
        Ok(outcome)
    }

    /// Dependency graph of the current context
    pub fn graph(&self) -> WorkflowGraph {
        match self.current.and_then(|key| self.contexts.get(&key)) {
            Some(context) => context.graph(Some(self.global.data())),
            None => self.global.graph(None),
        }
    }

    fn menu_key(&self) -> MenuKey {
        match self.current().key() {
            ContextKey::Global => MenuKey::Global,
            ContextKey::Node { type_path, .. } => MenuKey::of(type_path.clone()),
        }
    }

    /// Data types offered in the current context
    pub fn data_menu(&self) -> Vec<MenuItem<Arc<DataType>>> {
        self.state.data_menu(&self.menu_key())
    }

    /// Action types offered in the current context
    pub fn action_menu(&self) -> Vec<MenuItem<Arc<ActionType>>> {
        self.state.action_menu(&self.menu_key())
    }

    /// Every registered Data type, whether or not a menu offers it
    pub fn data_types(&self) -> Vec<Arc<DataType>> {
        self.registry().data_types().cloned().collect()
    }

    /// Every registered Action type, whether or not a menu offers it
    pub fn action_types(&self) -> Vec<Arc<ActionType>> {
        self.registry().action_types().cloned().collect()
    }

    /// Swap in a fully rebuilt node tree; the Global context becomes current
    pub(crate) fn replace(&mut self, global: Context, contexts: IndexMap<Uuid, Context>) {
        self.global = global;
        self.contexts = contexts;
        self.current = None;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("global", &self.global.name())
            .field("contexts", &self.contexts.len())
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
