//! Project persistence: a Session's contexts as a tree of
//! `(type, uuid, name, construct config)` records.
//!
//! Only construct configs are persisted. Payload a type keeps out of its
//! construct config (sample vectors and the like) comes back empty after a
//! load and has to be recomputed by re-running the producing actions.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::{Context, ContextKey, Session};
use crate::core::errors::{DacError, Result};
use crate::node::{ConstructConfig, ParamMap};
use crate::registry::Resolver;

/// Version written into new project files
pub const PROJECT_VERSION: u32 = 1;

/// On-disk encoding of a project tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectFormat {
    #[default]
    Yaml,
    Json,
}

impl ProjectFormat {
    /// Format implied by a file extension, if any
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// One persisted node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(rename = "type")]
    pub type_path: String,
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub config: ConstructConfig,
}

/// One persisted context; `key` is absent for the Global context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    #[serde(default)]
    pub data: Vec<NodeRecord>,
    #[serde(default)]
    pub actions: Vec<NodeRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectTree {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub global: ContextRecord,
    #[serde(default)]
    pub contexts: Vec<ContextRecord>,
}

/// Snapshots and restores the node tree of a [`Session`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectSerializer {
    format: ProjectFormat,
}

impl ProjectSerializer {
    pub fn new(format: ProjectFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ProjectFormat {
        self.format
    }

    /// Walk the Global context then every other context in creation order,
    /// nodes in insertion order.
    pub fn save(&self, session: &Session) -> ProjectTree {
        let tree = ProjectTree {
            version: PROJECT_VERSION,
            saved_at: Utc::now(),
            global: context_record(session.global()),
            contexts: session.contexts().map(context_record).collect(),
        };
        info!(
            "project snapshot: {} context(s) besides Global",
            tree.contexts.len()
        );
        tree
    }

    /// Rebuild the session's node tree from `tree`.
    ///
    /// Type paths go through the session's alias map and type registry.
    /// The first failing record aborts the load and the session is left
    /// exactly as it was.
    pub fn load(&self, session: &mut Session, tree: &ProjectTree) -> Result<()> {
        if tree.version > PROJECT_VERSION {
            return Err(DacError::configuration_field(
                format!(
                    "project version {} is newer than supported version {}",
                    tree.version, PROJECT_VERSION
                ),
                "version",
            ));
        }

        let resolver = session.state().resolver();
        let registry = session.registry().clone();
        let mut seen = HashSet::new();

        let mut global = Context::global(registry.clone());
        global.set_name(tree.global.name.clone());
        restore_nodes(resolver, &mut global, &tree.global, &mut seen)?;

        let mut contexts = IndexMap::new();
        for record in &tree.contexts {
            let key = record
                .key
                .ok_or_else(|| DacError::configuration_field("context without key", "contexts.key"))?;
            let key_node = global
                .data_node(&key)
                .ok_or_else(|| DacError::not_found("context key node", key))?;
            let type_path = key_node.type_path();
            if !registry
                .data_type(type_path)
                .is_some_and(|t| t.is_context_key())
            {
                return Err(DacError::type_mismatch(
                    key.to_string(),
                    "context-key data type",
                    type_path,
                ));
            }

            let mut context = Context::new(
                record.name.clone(),
                ContextKey::Node {
                    uuid: key,
                    type_path: type_path.to_string(),
                },
                registry.clone(),
            );
            restore_nodes(resolver, &mut context, record, &mut seen)?;
            if contexts.insert(key, context).is_some() {
                return Err(DacError::DuplicateUuid { uuid: key });
            }
        }

        info!(
            "project loaded: {} node(s) in {} context(s)",
            seen.len(),
            contexts.len() + 1
        );
        session.replace(global, contexts);
        Ok(())
    }

    pub fn encode(&self, tree: &ProjectTree) -> Result<String> {
        match self.format {
            ProjectFormat::Yaml => Ok(serde_yaml::to_string(tree)?),
            ProjectFormat::Json => Ok(serde_json::to_string_pretty(tree)?),
        }
    }

    pub fn decode(&self, text: &str) -> Result<ProjectTree> {
        match self.format {
            ProjectFormat::Yaml => Ok(serde_yaml::from_str(text)?),
            ProjectFormat::Json => Ok(serde_json::from_str(text)?),
        }
    }

    /// Save to `path`; the extension overrides the configured format
    pub fn write_file(&self, session: &Session, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = self.for_path(path).encode(&self.save(session))?;
        fs::write(path, text)
            .map_err(|e| DacError::io(format!("write project {}", path.display()), e))?;
        debug!("project written to {}", path.display());
        Ok(())
    }

    pub fn read_file(&self, session: &mut Session, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| DacError::io(format!("read project {}", path.display()), e))?;
        let tree = self.for_path(path).decode(&text)?;
        self.load(session, &tree)
    }

    fn for_path(&self, path: &Path) -> Self {
        Self::new(ProjectFormat::from_path(path).unwrap_or(self.format))
    }
}

fn context_record(context: &Context) -> ContextRecord {
    ContextRecord {
        name: context.name().to_string(),
        key: context.key().uuid(),
        key_type: context.key().type_path().map(str::to_string),
        data: context
            .data()
            .iter()
            .map(|node| NodeRecord {
                type_path: node.type_path().to_string(),
                uuid: node.uuid(),
                name: node.name().to_string(),
                config: node.construct_config(),
            })
            .collect(),
        actions: context
            .actions()
            .map(|node| NodeRecord {
                type_path: node.type_path().to_string(),
                uuid: node.uuid(),
                name: node.name().to_string(),
                config: node.construct_config(),
            })
            .collect(),
    }
}

fn restore_nodes(
    resolver: &Resolver,
    context: &mut Context,
    record: &ContextRecord,
    seen: &mut HashSet<Uuid>,
) -> Result<()> {
    for data in &record.data {
        if !seen.insert(data.uuid) {
            return Err(DacError::DuplicateUuid { uuid: data.uuid });
        }
        let data_type = resolver.resolve_data(&data.type_path)?;
        let mut node = data_type.instantiate(&data.config)?;
        node.base_mut().reassign(data.uuid);
        node.base_mut().name = data.name.clone();
        context.insert_data(None, node)?;
    }

    for action in &record.actions {
        if !seen.insert(action.uuid) {
            return Err(DacError::DuplicateUuid { uuid: action.uuid });
        }
        let action_type = resolver.resolve_action(&action.type_path)?;
        let mut node = action_type.instantiate(ParamMap::new());
        node.apply_construct_config(&action.config)?;
        node.reassign(action.uuid);
        node.base_mut().name = action.name.clone();
        context.insert_action(None, node)?;
    }
    Ok(())
}
