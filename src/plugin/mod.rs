//! Plugin registry documents: aliases, per-context menus and quick bindings.

pub mod document;
pub mod loader;
pub mod menu;

pub use document::{QuickActionEntry, QuickTaskEntry, RegistryDocument, GLOBAL_KEY};
pub use loader::{
    Loaded, MenuKey, PluginLoader, QuickActionBinding, QuickTaskBinding, RegistryState,
};
pub use menu::{MenuEntry, MenuItem};
