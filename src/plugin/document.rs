use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::errors::{DacError, Result};
use crate::node::ConstructConfig;

/// Reserved context key for entries available in the Global context
pub const GLOBAL_KEY: &str = "_";

/// `[action type, target parameter, default literals]`
pub type QuickActionEntry = (String, String, ConstructConfig);

/// `[task type, label, target parameter]`
pub type QuickTaskEntry = (String, String, String);

/// A plugin registry document as written by module authors.
///
/// ```yaml
/// inherit: base.yaml
/// alias:
///   mt: dac.modules.timedata
/// data:
///   _:
///     - dac.core.data.SimpleDefinition
/// actions:
///   dac.core.data.SimpleDefinition:
///     - "[Signals>]"
///     - mt.SignalConstructAction
///     - "[<]"
/// quick_actions:
///   mt.TimeData:
///     - [mt.ShowTimeDataAction, channels, {}]
/// quick_tasks:
///   mt.LoadAction:
///     - [mt.FillFpathsTask, "Select files", fpaths]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherit: Option<String>,
    pub alias: IndexMap<String, String>,
    pub data: IndexMap<String, Vec<String>>,
    pub actions: IndexMap<String, Vec<String>>,
    pub quick_actions: IndexMap<String, Vec<QuickActionEntry>>,
    pub quick_tasks: IndexMap<String, Vec<QuickTaskEntry>>,
}

impl RegistryDocument {
    /// Parse a YAML (or JSON) document
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| DacError::serialization("registry document", e))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| DacError::io(format!("read registry {}", path.display()), e))?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
