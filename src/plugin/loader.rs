use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::document::{QuickActionEntry, QuickTaskEntry, RegistryDocument, GLOBAL_KEY};
use super::menu::{build_tree, Marker, MenuEntry, MenuItem, SectionBalancer};
use crate::core::errors::{DacError, LoadError, Result};
use crate::node::ConstructConfig;
use crate::registry::{ActionType, AliasMap, DataType, Resolver, TaskType, TypeRegistry};

/// Which context a menu list belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MenuKey {
    Global,
    /// Canonical path of a context-key Data type
    Type(String),
}

impl MenuKey {
    pub fn of(type_path: impl Into<String>) -> Self {
        Self::Type(type_path.into())
    }
}

impl fmt::Display for MenuKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str(GLOBAL_KEY),
            Self::Type(path) => f.write_str(path),
        }
    }
}

/// Data type → one-click action recipe
#[derive(Debug, Clone)]
pub struct QuickActionBinding {
    pub action: Arc<ActionType>,
    /// Parameter receiving the selected node
    pub target: String,
    pub defaults: ConstructConfig,
}

/// Action parameter → helper task filling it
#[derive(Debug, Clone)]
pub struct QuickTaskBinding {
    pub task: Arc<TaskType>,
    pub label: String,
    pub target: String,
}

/// Everything plugin loading produced: aliases, per-context menus and quick
/// bindings, all resolved against the type registry.
#[derive(Debug, Clone)]
pub struct RegistryState {
    resolver: Resolver,
    data: IndexMap<MenuKey, Vec<MenuEntry<Arc<DataType>>>>,
    actions: IndexMap<MenuKey, Vec<MenuEntry<Arc<ActionType>>>>,
    quick_actions: IndexMap<String, Vec<QuickActionBinding>>,
    quick_tasks: IndexMap<String, Vec<QuickTaskBinding>>,
}

impl RegistryState {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            resolver: Resolver::new(registry),
            data: IndexMap::new(),
            actions: IndexMap::new(),
            quick_actions: IndexMap::new(),
            quick_tasks: IndexMap::new(),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.resolver.registry()
    }

    pub fn aliases(&self) -> &AliasMap {
        self.resolver.aliases()
    }

    /// Context keys with at least one menu list, Global first if present
    pub fn keys(&self) -> Vec<MenuKey> {
        let mut keys: Vec<MenuKey> = Vec::new();
        for key in self.data.keys().chain(self.actions.keys()) {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys.sort_by_key(|k| *k != MenuKey::Global);
        keys
    }

    pub fn data_entries(&self, key: &MenuKey) -> &[MenuEntry<Arc<DataType>>] {
        self.data.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn action_entries(&self, key: &MenuKey) -> &[MenuEntry<Arc<ActionType>>] {
        self.actions.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn data_menu(&self, key: &MenuKey) -> Vec<MenuItem<Arc<DataType>>> {
        build_tree(self.data_entries(key))
    }

    pub fn action_menu(&self, key: &MenuKey) -> Vec<MenuItem<Arc<ActionType>>> {
        build_tree(self.action_entries(key))
    }

    /// Quick-Action recipes registered for an exact Data type path
    pub fn quick_actions(&self, data_type: &str) -> &[QuickActionBinding] {
        self.quick_actions
            .get(data_type)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Quick-Task helpers registered for an Action type path
    pub fn quick_tasks(&self, action_type: &str) -> &[QuickTaskBinding] {
        self.quick_tasks
            .get(action_type)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn quick_task(&self, action_type: &str, param: &str) -> Option<&QuickTaskBinding> {
        self.quick_tasks(action_type)
            .iter()
            .find(|binding| binding.target == param)
    }
}

/// Result of a best-effort load: what could be applied plus what failed
#[derive(Debug)]
pub struct Loaded {
    pub state: RegistryState,
    pub errors: Vec<LoadError>,
}

impl Loaded {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Strict mode: any recorded error fails the whole load
    pub fn into_result(self) -> Result<RegistryState> {
        if self.errors.is_empty() {
            Ok(self.state)
        } else {
            Err(DacError::PluginLoad {
                errors: self.errors,
            })
        }
    }
}

/// Applies registry documents to a [`RegistryState`]
#[derive(Debug, Clone)]
pub struct PluginLoader {
    registry: Arc<TypeRegistry>,
}

impl PluginLoader {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Apply `document` on top of `inherited` (or an empty state).
    ///
    /// The document's own `inherit` field is ignored here; file based
    /// inheritance goes through [`PluginLoader::load_file`].
    pub fn load(&self, document: &RegistryDocument, inherited: Option<RegistryState>) -> Loaded {
        let mut state = inherited.unwrap_or_else(|| RegistryState::new(self.registry.clone()));
        let mut errors = Vec::new();

        for (token, prefix) in &document.alias {
            state.resolver.set_alias(token.clone(), prefix.clone());
        }

        for (key, list) in &document.data {
            apply_menu_list(
                &mut state,
                &mut errors,
                "data",
                key,
                list,
                |state, path| state.resolver.resolve_data(path),
                |state| &mut state.data,
            );
        }

        for (key, list) in &document.actions {
            apply_menu_list(
                &mut state,
                &mut errors,
                "actions",
                key,
                list,
                |state, path| state.resolver.resolve_action(path),
                |state| &mut state.actions,
            );
        }

        for (data_key, entries) in &document.quick_actions {
            let data_type = match state.resolver.resolve_data(data_key) {
                Ok(data_type) => data_type,
                Err(e) => {
                    errors.push(LoadError::new("quick_actions", data_key, None, e));
                    continue;
                }
            };
            for (position, entry) in entries.iter().enumerate() {
                match quick_action_binding(&state.resolver, entry) {
                    Ok(binding) => state
                        .quick_actions
                        .entry(data_type.path().to_string())
                        .or_default()
                        .push(binding),
                    Err(e) => errors.push(LoadError::new(
                        "quick_actions",
                        data_key,
                        Some(position),
                        e,
                    )),
                }
            }
        }

        for (action_key, entries) in &document.quick_tasks {
            let action_type = match state.resolver.resolve_action(action_key) {
                Ok(action_type) => action_type,
                Err(e) => {
                    errors.push(LoadError::new("quick_tasks", action_key, None, e));
                    continue;
                }
            };
            for (position, entry) in entries.iter().enumerate() {
                match quick_task_binding(&state.resolver, &action_type, entry) {
                    Ok(binding) => state
                        .quick_tasks
                        .entry(action_type.path().to_string())
                        .or_default()
                        .push(binding),
                    Err(e) => errors.push(LoadError::new(
                        "quick_tasks",
                        action_key,
                        Some(position),
                        e,
                    )),
                }
            }
        }

        for error in &errors {
            warn!(category = error.error.category(), "registry load: {}", error);
        }
        debug!(
            "registry document applied: {} aliases, {} menu keys, {} error(s)",
            state.aliases().len(),
            state.keys().len(),
            errors.len()
        );
        Loaded { state, errors }
    }

    /// Parse and apply a YAML document without file inheritance
    pub fn load_str(&self, text: &str) -> Result<Loaded> {
        let document = RegistryDocument::from_yaml(text)?;
        if let Some(inherit) = &document.inherit {
            warn!("ignoring inherit '{}' of an in-memory document", inherit);
        }
        Ok(self.load(&document, None))
    }

    /// Load a registry file, following `inherit` paths relative to the
    /// inheriting file. Errors of every document in the chain are collected.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Loaded> {
        let mut chain = Vec::new();
        let loaded = self.load_chain(path.as_ref(), &mut chain)?;
        info!(
            "loaded registry {} ({} document(s), {} error(s))",
            path.as_ref().display(),
            chain.len(),
            loaded.errors.len()
        );
        Ok(loaded)
    }

    fn load_chain(&self, path: &Path, chain: &mut Vec<PathBuf>) -> Result<Loaded> {
        let canonical = path
            .canonicalize()
            .map_err(|e| DacError::io(format!("open registry {}", path.display()), e))?;
        if chain.contains(&canonical) {
            return Err(DacError::CyclicInherit { path: canonical });
        }
        chain.push(canonical.clone());

        let document = RegistryDocument::from_file(&canonical)?;
        let (inherited, mut errors) = match &document.inherit {
            Some(parent) => {
                let base_dir = canonical.parent().unwrap_or_else(|| Path::new("."));
                let Loaded { state, errors } = self.load_chain(&base_dir.join(parent), chain)?;
                (Some(state), errors)
            }
            None => (None, Vec::new()),
        };

        let Loaded {
            state,
            errors: own_errors,
        } = self.load(&document, inherited);
        errors.extend(own_errors);
        Ok(Loaded { state, errors })
    }
}

fn apply_menu_list<T, R, S>(
    state: &mut RegistryState,
    errors: &mut Vec<LoadError>,
    section: &'static str,
    key: &str,
    list: &[String],
    resolve: R,
    select: S,
) where
    T: Clone,
    R: Fn(&RegistryState, &str) -> Result<T>,
    S: Fn(&mut RegistryState) -> &mut IndexMap<MenuKey, Vec<MenuEntry<T>>>,
{
    let menu_key = match menu_key(&state.resolver, key) {
        Ok(menu_key) => menu_key,
        Err(e) => {
            errors.push(LoadError::new(section, key, None, e));
            return;
        }
    };

    let mut entries = Vec::with_capacity(list.len());
    let mut balancer = SectionBalancer::new();
    for (position, raw) in list.iter().enumerate() {
        let outcome = match Marker::parse(raw) {
            Marker::Path(path) => {
                resolve(state, path).map(|item| entries.push(MenuEntry::Item(item)))
            }
            marker => balancer.push(&mut entries, &marker, raw),
        };
        if let Err(e) = outcome {
            errors.push(LoadError::new(section, key, Some(position), e));
        }
    }
    if let Err(e) = balancer.finish(&mut entries) {
        errors.push(LoadError::new(section, key, Some(list.len()), e));
    }

    select(state).entry(menu_key).or_default().extend(entries);
}

fn menu_key(resolver: &Resolver, key: &str) -> Result<MenuKey> {
    if key == GLOBAL_KEY {
        return Ok(MenuKey::Global);
    }
    let data_type = resolver.resolve_data(key)?;
    if !data_type.is_context_key() {
        return Err(DacError::type_mismatch(
            key,
            "context-key data type",
            data_type.path(),
        ));
    }
    Ok(MenuKey::of(data_type.path()))
}

fn quick_action_binding(
    resolver: &Resolver,
    entry: &QuickActionEntry,
) -> Result<QuickActionBinding> {
    let (action_path, target, defaults) = entry;
    let action = resolver.resolve_action(action_path)?;
    if action.signature().get(target).is_none() {
        return Err(DacError::not_found(
            "parameter",
            format!("{}.{}", action.path(), target),
        ));
    }
    Ok(QuickActionBinding {
        action,
        target: target.clone(),
        defaults: defaults.clone(),
    })
}

fn quick_task_binding(
    resolver: &Resolver,
    action: &ActionType,
    entry: &QuickTaskEntry,
) -> Result<QuickTaskBinding> {
    let (task_path, label, target) = entry;
    let task = resolver.resolve_task(task_path)?;
    if action.signature().get(target).is_none() {
        return Err(DacError::not_found(
            "parameter",
            format!("{}.{}", action.path(), target),
        ));
    }
    Ok(QuickTaskBinding {
        task,
        label: label.clone(),
        target: target.clone(),
    })
}
