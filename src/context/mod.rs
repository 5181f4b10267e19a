//! Contexts: isolated node containers read against a shared Global pool.

pub mod graph;
pub mod pool;
pub mod session;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::errors::{DacError, Result};
use crate::invoke::{ActionInvoker, Disambiguator, Invocation};
use crate::node::{Action, ActionNode, ConstructConfig, DataNode, ParamMap};
use crate::registry::{ActionType, DataType, TypeRegistry};

pub use graph::{WorkflowEdge, WorkflowGraph, WorkflowNode};
pub use pool::DataPool;
pub use session::Session;

/// Name of the Global context
pub const GLOBAL_CONTEXT_NAME: &str = "Global";

/// What a Context is keyed by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextKey {
    Global,
    /// A context-key Data node living in the Global pool
    Node { uuid: Uuid, type_path: String },
}

impl ContextKey {
    pub fn uuid(&self) -> Option<Uuid> {
        match self {
            Self::Global => None,
            Self::Node { uuid, .. } => Some(*uuid),
        }
    }

    pub fn type_path(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Node { type_path, .. } => Some(type_path),
        }
    }
}

/// Where a resolved node lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    Global,
}

/// A live node that can satisfy a Data-typed parameter
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub uuid: Uuid,
    pub node: &'a dyn DataNode,
    pub scope: Scope,
}

/// A named container of Data and Action nodes.
///
/// Reads fall through to the Global pool, which is passed in by the owner
/// and never mutated from here. UUIDs are unique across local and Global
/// nodes; local nodes take precedence when resolving.
#[derive(Debug)]
pub struct Context {
    name: String,
    key: ContextKey,
    registry: Arc<TypeRegistry>,
    data: DataPool,
    actions: IndexMap<Uuid, ActionNode>,
}

impl Context {
    pub fn new(name: impl Into<String>, key: ContextKey, registry: Arc<TypeRegistry>) -> Self {
        Self {
            name: name.into(),
            key,
            registry,
            data: DataPool::new(),
            actions: IndexMap::new(),
        }
    }

    /// The Global context; its own pool is the Global pool of a session
    pub fn global(registry: Arc<TypeRegistry>) -> Self {
        Self::new(GLOBAL_CONTEXT_NAME, ContextKey::Global, registry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn key(&self) -> &ContextKey {
        &self.key
    }

    pub fn is_global(&self) -> bool {
        self.key == ContextKey::Global
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn data(&self) -> &DataPool {
        &self.data
    }

    pub fn data_node(&self, uuid: &Uuid) -> Option<&dyn DataNode> {
        self.data.get(uuid)
    }

    pub fn data_node_mut(&mut self, uuid: &Uuid) -> Option<&mut dyn DataNode> {
        self.data.get_mut(uuid)
    }

    pub fn action(&self, uuid: &Uuid) -> Option<&ActionNode> {
        self.actions.get(uuid)
    }

    pub fn action_mut(&mut self, uuid: &Uuid) -> Option<&mut ActionNode> {
        self.actions.get_mut(uuid)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionNode> {
        self.actions.values()
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Whether `uuid` is taken by a local node or a Global Data node
    pub fn is_taken(&self, global: Option<&DataPool>, uuid: &Uuid) -> bool {
        self.data.contains(uuid)
            || self.actions.contains_key(uuid)
            || global.is_some_and(|pool| pool.contains(uuid))
    }

    /// Construct a Data node of `data_type` from `config` and insert it
    pub fn add_data(
        &mut self,
        global: Option<&DataPool>,
        data_type: &DataType,
        config: &ConstructConfig,
    ) -> Result<Uuid> {
        let node = data_type.instantiate(config)?;
        self.insert_data(global, node)
    }

    /// Insert an existing node under its own UUID
    pub fn insert_data(&mut self, global: Option<&DataPool>, node: Box<dyn DataNode>) -> Result<Uuid> {
        let uuid = node.uuid();
        if self.is_taken(global, &uuid) {
            return Err(DacError::DuplicateUuid { uuid });
        }
        let type_path = node.type_path();
        self.data
            .insert(node)
            .map_err(|_| DacError::DuplicateUuid { uuid })?;
        debug!("context '{}': added {} {}", self.name, type_path, uuid);
        Ok(uuid)
    }

    /// Create an Action node without executing it
    pub fn add_action(
        &mut self,
        global: Option<&DataPool>,
        action_type: &ActionType,
        params: ParamMap,
    ) -> Result<Uuid> {
        self.insert_action(global, action_type.instantiate(params))
    }

    pub fn insert_action(&mut self, global: Option<&DataPool>, node: ActionNode) -> Result<Uuid> {
        let uuid = node.uuid();
        if self.is_taken(global, &uuid) {
            return Err(DacError::DuplicateUuid { uuid });
        }
        debug!(
            "context '{}': added action {} {}",
            self.name,
            node.type_path(),
            uuid
        );
        self.actions.insert(uuid, node);
        Ok(uuid)
    }

    /// Live nodes whose type is `type_path` or a declared subtype: local
    /// nodes first, then Global, each in insertion order.
    pub fn resolve_for_type<'a>(
        &'a self,
        global: Option<&'a DataPool>,
        type_path: &str,
    ) -> Vec<Candidate<'a>> {
        let local = self.data.iter().map(|node| (node, Scope::Local));
        let shared = global
            .into_iter()
            .flat_map(|pool| pool.iter())
            .map(|node| (node, Scope::Global));
        local
            .chain(shared)
            .filter(|(node, _)| self.registry.is_compatible(node.type_path(), type_path))
            .map(|(node, scope)| Candidate {
                uuid: node.uuid(),
                node,
                scope,
            })
            .collect()
    }

    /// A Data node by UUID, local first then Global
    pub fn lookup<'a>(
        &'a self,
        global: Option<&'a DataPool>,
        uuid: &Uuid,
    ) -> Option<(&'a dyn DataNode, Scope)> {
        if let Some(node) = self.data.get(uuid) {
            return Some((node, Scope::Local));
        }
        global
            .and_then(|pool| pool.get(uuid))
            .map(|node| (node, Scope::Global))
    }

    /// Remove a local Data node. References to it stay in place and fail
    /// at the next invocation that needs them.
    pub fn remove(&mut self, uuid: &Uuid) -> Result<Box<dyn DataNode>> {
        let node = self
            .data
            .remove(uuid)
            .ok_or_else(|| DacError::not_found("data node", uuid))?;
        info!("context '{}': removed {} {}", self.name, node.type_path(), uuid);
        Ok(node)
    }

    pub fn remove_action(&mut self, uuid: &Uuid) -> Result<ActionNode> {
        let node = self
            .actions
            .shift_remove(uuid)
            .ok_or_else(|| DacError::not_found("action node", uuid))?;
        info!("context '{}': removed action {} {}", self.name, node.type_path(), uuid);
        Ok(node)
    }

    /// Rename a local Data or Action node
    pub fn rename(&mut self, uuid: &Uuid, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if let Some(node) = self.data.get_mut(uuid) {
            node.base_mut().name = name;
            return Ok(());
        }
        if let Some(node) = self.actions.get_mut(uuid) {
            node.base_mut().name = name;
            return Ok(());
        }
        Err(DacError::not_found("node", uuid))
    }

    /// Invoke an arbitrary action against this context without storing it
    pub fn invoke(
        &mut self,
        global: Option<&DataPool>,
        action: &dyn Action,
        label: &str,
        bound: &ParamMap,
        policy: &dyn Disambiguator,
    ) -> Result<Invocation> {
        ActionInvoker::new(policy)
            .invoke(self, global, action, label, None, bound)
            .map(|completed| completed.invocation)
    }

    /// Run a stored Action node.
    ///
    /// `overrides` are merged over the stored parameters. On success the
    /// effective parameters and the produced UUIDs are stored back and the
    /// node becomes Complete; a failing call marks it Failed. Binding errors
    /// leave the node untouched.
    pub fn run_action(
        &mut self,
        global: Option<&DataPool>,
        uuid: &Uuid,
        overrides: &ParamMap,
        policy: &dyn Disambiguator,
    ) -> Result<Invocation> {
        let node = self
            .actions
            .get(uuid)
            .ok_or_else(|| DacError::not_found("action node", uuid))?;
        let action = Arc::clone(node.action());
        let label = node.type_path().to_string();
        let mut params = node.params().clone();
        for (name, binding) in overrides {
            params.insert(name.clone(), binding.clone());
        }

        let outcome = ActionInvoker::new(policy).invoke(
            self,
            global,
            action.as_ref(),
            &label,
            Some(*uuid),
            &params,
        );

        let Some(node) = self.actions.get_mut(uuid) else {
            return Err(DacError::not_found("action node", uuid));
        };
        match outcome {
            Ok(completed) => {
                node.record_success(completed.params, completed.invocation.produced());
                Ok(completed.invocation)
            }
            Err(e) => {
                if matches!(e, DacError::ActionFailed { .. }) {
                    warn!("action {} ({}) failed: {}", label, uuid, e);
                    node.record_failure();
                }
                Err(e)
            }
        }
    }

    /// Dependency graph of the stored actions and the nodes they touch
    pub fn graph(&self, global: Option<&DataPool>) -> WorkflowGraph {
        WorkflowGraph::build(self, global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeBase;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Default, crate::node::DataNode)]
    #[data_node(path = "ctx.Base")]
    struct Base {
        base: NodeBase,
    }

    #[derive(Debug, Clone, Default, crate::node::DataNode)]
    #[data_node(path = "ctx.Derived", parent = "ctx.Base")]
    struct Derived {
        base: NodeBase,
        gain: f64,
    }

    fn registry() -> Arc<TypeRegistry> {
        let mut registry = TypeRegistry::new();
        registry.register_data::<Base>();
        registry.register_data::<Derived>();
        Arc::new(registry)
    }

    #[test]
    fn test_resolve_for_type_orders_local_before_global() {
        let registry = registry();
        let mut global = Context::global(registry.clone());
        let g = global.insert_data(None, Box::new(Base::default())).unwrap();

        let mut ctx = Context::new("run", ContextKey::Global, registry);
        let l1 = ctx
            .insert_data(Some(global.data()), Box::new(Derived::default()))
            .unwrap();
        let l2 = ctx
            .insert_data(Some(global.data()), Box::new(Base::default()))
            .unwrap();

        let found: Vec<(Uuid, Scope)> = ctx
            .resolve_for_type(Some(global.data()), "ctx.Base")
            .iter()
            .map(|c| (c.uuid, c.scope))
            .collect();
        assert_eq!(
            found,
            vec![(l1, Scope::Local), (l2, Scope::Local), (g, Scope::Global)]
        );

        let derived: Vec<Uuid> = ctx
            .resolve_for_type(Some(global.data()), "ctx.Derived")
            .iter()
            .map(|c| c.uuid)
            .collect();
        assert_eq!(derived, vec![l1]);
    }

    #[test]
    fn test_duplicate_uuid_checked_against_global() {
        let registry = registry();
        let mut global = Context::global(registry.clone());
        let shared = Base::default();
        let uuid = shared.base.uuid();
        global.insert_data(None, Box::new(shared)).unwrap();

        let mut ctx = Context::new("run", ContextKey::Global, registry);
        let clash = Base {
            base: NodeBase::with_uuid("clash", uuid),
        };
        assert!(matches!(
            ctx.insert_data(Some(global.data()), Box::new(clash)),
            Err(DacError::DuplicateUuid { uuid: u }) if u == uuid
        ));
        assert!(ctx.data().is_empty());
    }

    #[test]
    fn test_add_data_applies_config_and_rename() {
        let registry = registry();
        let mut ctx = Context::new("run", ContextKey::Global, registry.clone());
        let data_type = registry.data_type("ctx.Derived").unwrap().clone();
        let mut config = ConstructConfig::new();
        config.insert("gain".to_string(), serde_json::json!(2.0));

        let uuid = ctx.add_data(None, &data_type, &config).unwrap();
        ctx.rename(&uuid, "sensor").unwrap();
        let node = ctx.data().get_as::<Derived>(&uuid).unwrap();
        assert_eq!(node.gain, 2.0);
        assert_eq!(node.base.name, "sensor");
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let mut ctx = Context::new("run", ContextKey::Global, registry());
        let uuid = ctx.insert_data(None, Box::new(Base::default())).unwrap();
        ctx.remove(&uuid).unwrap();
        assert!(matches!(ctx.remove(&uuid), Err(DacError::NotFound { .. })));
        assert!(ctx.lookup(None, &uuid).is_none());
    }
}
