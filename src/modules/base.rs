//! Core data types shared by every module.

use crate::node::{DataNode, NodeBase};
use crate::registry::{TypeRegistry, PLUGINS};

/// Plain context key: a named analysis run with a free-form description.
#[derive(Debug, Clone, Default, DataNode)]
#[data_node(path = "dac.core.data.SimpleDefinition", context_key)]
pub struct SimpleDefinition {
    pub base: NodeBase,
    pub description: String,
}

impl SimpleDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(name),
            description: String::new(),
        }
    }
}

#[linkme::distributed_slice(PLUGINS)]
static REGISTER_CORE: fn(&mut TypeRegistry) = register;

fn register(registry: &mut TypeRegistry) {
    registry.register_data::<SimpleDefinition>();
}
