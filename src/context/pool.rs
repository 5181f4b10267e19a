use indexmap::IndexMap;
use uuid::Uuid;

use crate::node::DataNode;

/// Insertion-ordered UUID → Data node map.
///
/// Uniqueness against other pools is the owner's concern; the pool itself
/// only refuses to overwrite an entry.
#[derive(Debug, Default)]
pub struct DataPool {
    nodes: IndexMap<Uuid, Box<dyn DataNode>>,
}

impl DataPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.nodes.contains_key(uuid)
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&dyn DataNode> {
        self.nodes.get(uuid).map(|node| node.as_ref())
    }

    pub fn get_mut(&mut self, uuid: &Uuid) -> Option<&mut dyn DataNode> {
        match self.nodes.get_mut(uuid) {
            Some(node) => Some(node.as_mut()),
            None => None,
        }
    }

    /// Node downcast to its concrete type
    pub fn get_as<T: DataNode>(&self, uuid: &Uuid) -> Option<&T> {
        self.get(uuid).and_then(|node| node.downcast_ref::<T>())
    }

    /// Insert under the node's own UUID; hands the node back if taken
    pub(crate) fn insert(&mut self, node: Box<dyn DataNode>) -> Result<Uuid, Box<dyn DataNode>> {
        let uuid = node.uuid();
        if self.nodes.contains_key(&uuid) {
            return Err(node);
        }
        self.nodes.insert(uuid, node);
        Ok(uuid)
    }

    /// Remove keeping the order of the remaining nodes
    pub(crate) fn remove(&mut self, uuid: &Uuid) -> Option<Box<dyn DataNode>> {
        self.nodes.shift_remove(uuid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn DataNode> {
        self.nodes.values().map(|node| node.as_ref())
    }

    pub fn uuids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.nodes.keys().copied()
    }
}
