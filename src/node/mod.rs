//! Node model: the identity shared by Data and Action nodes, the Data node
//! contract and its construct-config round trip.
//!
//! A construct config is the primitive-valued projection of a node's
//! persistable state. It never has to carry bulk payload that an upstream
//! action can recompute; restoring such payload after a project load is the
//! caller's job (re-run the producing action).

pub mod action;
pub mod sequence;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt::Debug;
use uuid::Uuid;

use crate::core::errors::{DacError, Result};

pub use action::{
    Action, ActionKind, ActionNode, ActionOutput, ActionStatus, Arg, Args, Binding, ParamKind,
    ParamMap, Param, Signature,
};
pub use dac_macros::DataNode;
pub use sequence::SequenceAction;

/// Primitive-valued mapping of a node's persistable attributes
pub type ConstructConfig = serde_json::Map<String, Value>;

/// Name shown for nodes created without an explicit one
pub const NEW_NODE_NAME: &str = "[New node]";

/// Identity of a node: a user-facing name and a process-unique UUID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBase {
    pub name: String,
    uuid: Uuid,
}

impl NodeBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: Uuid::new_v4(),
        }
    }

    pub fn with_uuid(name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            name: name.into(),
            uuid,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Replace the UUID. Only the owning pool does this, while the node is
    /// not yet inserted.
    pub(crate) fn reassign(&mut self, uuid: Uuid) {
        self.uuid = uuid;
    }
}

impl Default for NodeBase {
    fn default() -> Self {
        Self::new(NEW_NODE_NAME)
    }
}

/// A typed container for a piece of information plus metadata.
///
/// Usually implemented with `#[derive(DataNode)]`.
pub trait DataNode: Debug + Send + Sync + 'static {
    fn base(&self) -> &NodeBase;

    fn base_mut(&mut self) -> &mut NodeBase;

    /// Fully qualified registry path of the concrete type
    fn type_path(&self) -> &'static str;

    /// Persistable attributes as primitives
    fn construct_config(&self) -> ConstructConfig;

    /// Apply a construct config. Keys absent from `config` leave the
    /// corresponding attribute untouched.
    fn apply_construct_config(&mut self, config: &ConstructConfig) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn name(&self) -> &str {
        &self.base().name
    }

    fn uuid(&self) -> Uuid {
        self.base().uuid()
    }
}

impl dyn DataNode {
    pub fn downcast_ref<T: DataNode>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: DataNode>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    pub fn is<T: DataNode>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Registration metadata of a concrete Data node type
pub trait DataNodeType: DataNode + Default {
    const TYPE_PATH: &'static str;
    /// Declared supertypes, used for parameter compatibility
    const PARENTS: &'static [&'static str];
    /// Whether nodes of this type can key a Context
    const CONTEXT_KEY: bool;
}

/// Serialize a field for a construct config.
pub fn to_config_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::warn!("construct config value not representable: {}", e);
        Value::Null
    })
}

/// Deserialize a construct-config field, naming the type and field on failure.
pub fn from_config_value<T: DeserializeOwned>(
    type_path: &str,
    field: &str,
    value: &Value,
) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|e| DacError::InvalidConstructConfig {
        type_path: type_path.to_string(),
        field: field.to_string(),
        message: e.to_string(),
    })
}

/// Last segment of a dotted type path
pub fn short_name(type_path: &str) -> &str {
    type_path.rsplit('.').next().unwrap_or(type_path)
}
