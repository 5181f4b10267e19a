//! Explicit type registry: type path → factory.
//!
//! Plugins contribute registration functions through the [`PLUGINS`]
//! distributed slice; [`TypeRegistry::with_plugins`] runs all of them once at
//! start-up. After that the registry is shared read-only behind an `Arc`.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::errors::{DacError, Result};
use crate::invoke::quick::{Task, TaskKind};
use crate::node::{
    short_name, Action, ActionKind, ActionNode, ConstructConfig, DataNode, DataNodeType, ParamMap,
    SequenceAction, Signature,
};

/// Boxed constructor of a registered type
pub type Factory<T> = Arc<dyn Fn() -> Box<T> + Send + Sync>;

// Plugin registration functions, collected at link time
#[linkme::distributed_slice]
pub static PLUGINS: [fn(&mut TypeRegistry)] = [..];

/// A registered Data node type
pub struct DataType {
    path: String,
    parents: Vec<String>,
    context_key: bool,
    factory: Factory<dyn DataNode>,
}

impl DataType {
    pub fn new(
        path: impl Into<String>,
        factory: impl Fn() -> Box<dyn DataNode> + Send + Sync + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            parents: Vec::new(),
            context_key: false,
            factory: Arc::new(factory),
        }
    }

    pub fn of<T: DataNodeType>() -> Self {
        Self {
            path: T::TYPE_PATH.to_string(),
            parents: T::PARENTS.iter().map(|p| p.to_string()).collect(),
            context_key: T::CONTEXT_KEY,
            factory: Arc::new(|| Box::new(T::default()) as Box<dyn DataNode>),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn context_key(mut self, context_key: bool) -> Self {
        self.context_key = context_key;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn short_name(&self) -> &str {
        short_name(&self.path)
    }

    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub fn is_context_key(&self) -> bool {
        self.context_key
    }

    /// A default-constructed node with a fresh UUID
    pub fn create(&self) -> Box<dyn DataNode> {
        (self.factory)()
    }

    /// Construct a node and apply `config` to it
    pub fn instantiate(&self, config: &ConstructConfig) -> Result<Box<dyn DataNode>> {
        let mut node = self.create();
        node.apply_construct_config(config)?;
        Ok(node)
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataType")
            .field("path", &self.path)
            .field("parents", &self.parents)
            .field("context_key", &self.context_key)
            .finish_non_exhaustive()
    }
}

/// A registered Action type
pub struct ActionType {
    path: String,
    factory: Factory<dyn Action>,
}

impl ActionType {
    pub fn new(
        path: impl Into<String>,
        factory: impl Fn() -> Box<dyn Action> + Send + Sync + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn of<A: ActionKind>() -> Self {
        Self::new(A::TYPE_PATH, || Box::new(A::default()) as Box<dyn Action>)
    }

    /// A composite type running `members` in order, see [`SequenceAction`]
    pub fn sequence(
        path: impl Into<String>,
        caption: impl Into<String>,
        members: Vec<ActionType>,
    ) -> Self {
        let caption = caption.into();
        let members: Arc<[ActionType]> = members.into();
        Self::new(path, move || {
            Box::new(SequenceAction::new(caption.clone(), &members)) as Box<dyn Action>
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn create(&self) -> Arc<dyn Action> {
        Arc::from((self.factory)())
    }

    pub fn caption(&self) -> String {
        self.create().caption().to_string()
    }

    pub fn signature(&self) -> Signature {
        self.create().signature()
    }

    /// A new, not yet executed action node
    pub fn instantiate(&self, params: ParamMap) -> ActionNode {
        ActionNode::new(self.path.clone(), self.create(), params)
    }
}

impl fmt::Debug for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionType")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// A registered Quick-Task helper type
pub struct TaskType {
    path: String,
    factory: Factory<dyn Task>,
}

impl TaskType {
    pub fn new(
        path: impl Into<String>,
        factory: impl Fn() -> Box<dyn Task> + Send + Sync + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn of<T: TaskKind>() -> Self {
        Self::new(T::TYPE_PATH, || Box::new(T::default()) as Box<dyn Task>)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn create(&self) -> Box<dyn Task> {
        (self.factory)()
    }
}

impl fmt::Debug for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskType")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Reference to a registered type. Two resolutions of the same path yield
/// references to the same allocation (see [`TypeRef::same`]).
#[derive(Debug, Clone)]
pub enum TypeRef {
    Data(Arc<DataType>),
    Action(Arc<ActionType>),
    Task(Arc<TaskType>),
}

impl TypeRef {
    pub fn path(&self) -> &str {
        match self {
            Self::Data(t) => t.path(),
            Self::Action(t) => t.path(),
            Self::Task(t) => t.path(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Data(_) => "data type",
            Self::Action(_) => "action type",
            Self::Task(_) => "task type",
        }
    }

    /// Identity comparison
    pub fn same(&self, other: &TypeRef) -> bool {
        match (self, other) {
            (Self::Data(a), Self::Data(b)) => Arc::ptr_eq(a, b),
            (Self::Action(a), Self::Action(b)) => Arc::ptr_eq(a, b),
            (Self::Task(a), Self::Task(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn into_data(self) -> Result<Arc<DataType>> {
        match self {
            Self::Data(t) => Ok(t),
            other => Err(DacError::type_mismatch(other.path(), "data type", other.kind_name())),
        }
    }

    pub fn into_action(self) -> Result<Arc<ActionType>> {
        match self {
            Self::Action(t) => Ok(t),
            other => Err(DacError::type_mismatch(other.path(), "action type", other.kind_name())),
        }
    }

    pub fn into_task(self) -> Result<Arc<TaskType>> {
        match self {
            Self::Task(t) => Ok(t),
            other => Err(DacError::type_mismatch(other.path(), "task type", other.kind_name())),
        }
    }
}

/// Registry of all Data, Action and Task types known to the process
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: IndexMap<String, TypeRef>,
    roots: HashSet<String>,
}

impl TypeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry filled by every linked plugin
    pub fn with_plugins() -> Self {
        let mut registry = Self::new();
        for register in PLUGINS {
            register(&mut registry);
        }
        debug!("type registry initialised with {} types", registry.len());
        registry
    }

    pub fn register(&mut self, type_ref: TypeRef) {
        let path = type_ref.path().to_string();
        if let Some(root) = path.split('.').next() {
            self.roots.insert(root.to_string());
        }
        if self.types.insert(path.clone(), type_ref).is_some() {
            warn!("type {} registered twice, keeping the latest", path);
        }
    }

    pub fn register_data_type(&mut self, data_type: DataType) {
        self.register(TypeRef::Data(Arc::new(data_type)));
    }

    pub fn register_action_type(&mut self, action_type: ActionType) {
        self.register(TypeRef::Action(Arc::new(action_type)));
    }

    pub fn register_task_type(&mut self, task_type: TaskType) {
        self.register(TypeRef::Task(Arc::new(task_type)));
    }

    pub fn register_data<T: DataNodeType>(&mut self) {
        self.register_data_type(DataType::of::<T>());
    }

    pub fn register_action<A: ActionKind>(&mut self) {
        self.register_action_type(ActionType::of::<A>());
    }

    pub fn register_task<T: TaskKind>(&mut self) {
        self.register_task_type(TaskType::of::<T>());
    }

    /// Look up a fully expanded type path
    pub fn lookup(&self, path: &str) -> Result<TypeRef> {
        self.types
            .get(path)
            .cloned()
            .ok_or_else(|| DacError::type_not_found(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.types.contains_key(path)
    }

    /// Whether some registered path starts with `token`
    pub fn has_root(&self, token: &str) -> bool {
        self.roots.contains(token)
    }

    pub fn data_type(&self, path: &str) -> Option<&Arc<DataType>> {
        match self.types.get(path) {
            Some(TypeRef::Data(t)) => Some(t),
            _ => None,
        }
    }

    pub fn action_type(&self, path: &str) -> Option<&Arc<ActionType>> {
        match self.types.get(path) {
            Some(TypeRef::Action(t)) => Some(t),
            _ => None,
        }
    }

    pub fn task_type(&self, path: &str) -> Option<&Arc<TaskType>> {
        match self.types.get(path) {
            Some(TypeRef::Task(t)) => Some(t),
            _ => None,
        }
    }

    /// Whether a node of type `actual` satisfies a parameter declared as
    /// `declared`: same path, or `declared` reachable through parents.
    pub fn is_compatible(&self, actual: &str, declared: &str) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![actual.to_string()];
        while let Some(current) = pending.pop() {
            if current == declared {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(data_type) = self.data_type(&current) {
                pending.extend(data_type.parents().iter().cloned());
            }
        }
        false
    }

    pub fn data_types(&self) -> impl Iterator<Item = &Arc<DataType>> {
        self.types.values().filter_map(|t| match t {
            TypeRef::Data(d) => Some(d),
            _ => None,
        })
    }

    pub fn action_types(&self) -> impl Iterator<Item = &Arc<ActionType>> {
        self.types.values().filter_map(|t| match t {
            TypeRef::Action(a) => Some(a),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
