use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Unified error type for the dac core
#[derive(Debug, Error)]
pub enum DacError {
    /// A type path starts with a token that is neither an alias nor a known package root
    #[error("Unresolved alias '{token}' in type path '{path}'")]
    UnresolvedAlias { token: String, path: String },

    /// A fully expanded type path has no registered factory
    #[error("Type not found: {path}")]
    TypeNotFound { path: String },

    /// A node UUID collides with one already present in local or Global pool
    #[error("Duplicate node UUID: {uuid}")]
    DuplicateUuid { uuid: Uuid },

    /// Lookup of a node, context, action or binding failed
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A Data-typed parameter could not be bound to a live node
    #[error("Parameter '{param}' of {action} is unbound")]
    UnboundParameter {
        action: String,
        param: String,
        reference: Option<Uuid>,
    },

    /// A resolved node or literal has the wrong type for its target
    #[error("Type mismatch for '{subject}': expected {expected}, found {found}")]
    TypeMismatch {
        subject: String,
        expected: String,
        found: String,
    },

    /// A literal parameter has neither a bound value nor a declared default
    #[error("Missing value for parameter '{param}' of {action}")]
    MissingParameter { action: String, param: String },

    /// Section markers in a menu list do not balance
    #[error("Malformed section marker '{marker}': {reason}")]
    MalformedSection { marker: String, reason: String },

    /// The selected node's type has no Quick-Action binding
    #[error("No quick action registered for {type_path}")]
    NoQuickAction { type_path: String },

    /// A construct config value could not be applied to a node field
    #[error("Invalid construct config for {type_path}.{field}: {message}")]
    InvalidConstructConfig {
        type_path: String,
        field: String,
        message: String,
    },

    /// The action's callable returned an error
    #[error("Action {action} failed: {source}")]
    ActionFailed {
        action: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A Quick-Task implementation returned an error
    #[error("Task {task} failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Strict plugin loading turned the aggregated load errors into a failure
    #[error("Plugin loading reported {} error(s)", .errors.len())]
    PluginLoad { errors: Vec<LoadError> },

    /// Registry documents inherit from each other in a loop
    #[error("Inheritance cycle through {}", .path.display())]
    CyclicInherit { path: PathBuf },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// IO errors
    #[error("IO operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DacError {
    pub fn unresolved_alias<T: Into<String>, P: Into<String>>(token: T, path: P) -> Self {
        Self::UnresolvedAlias {
            token: token.into(),
            path: path.into(),
        }
    }

    pub fn type_not_found<S: Into<String>>(path: S) -> Self {
        Self::TypeNotFound { path: path.into() }
    }

    pub fn not_found<S: ToString>(kind: &'static str, id: S) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn unbound<A: Into<String>, P: Into<String>>(
        action: A,
        param: P,
        reference: Option<Uuid>,
    ) -> Self {
        Self::UnboundParameter {
            action: action.into(),
            param: param.into(),
            reference,
        }
    }

    pub fn type_mismatch<S: Into<String>, E: Into<String>, F: Into<String>>(
        subject: S,
        expected: E,
        found: F,
    ) -> Self {
        Self::TypeMismatch {
            subject: subject.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn missing_parameter<A: Into<String>, P: Into<String>>(action: A, param: P) -> Self {
        Self::MissingParameter {
            action: action.into(),
            param: param.into(),
        }
    }

    pub fn malformed_section<M: Into<String>, R: Into<String>>(marker: M, reason: R) -> Self {
        Self::MalformedSection {
            marker: marker.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error pointing at a field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    /// Wrap the error an action's callable returned
    pub fn action_failed<S: Into<String>>(action: S, source: anyhow::Error) -> Self {
        Self::ActionFailed {
            action: action.into(),
            source: source.into(),
        }
    }

    /// Wrap the error a task returned
    pub fn task_failed<S: Into<String>>(task: S, source: anyhow::Error) -> Self {
        Self::TaskFailed {
            task: task.into(),
            source: source.into(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnresolvedAlias { .. } | Self::TypeNotFound { .. } => "resolution",
            Self::DuplicateUuid { .. } | Self::NotFound { .. } => "context",
            Self::UnboundParameter { .. }
            | Self::TypeMismatch { .. }
            | Self::MissingParameter { .. } => "binding",
            Self::MalformedSection { .. } | Self::PluginLoad { .. } | Self::CyclicInherit { .. } => {
                "plugin"
            }
            Self::NoQuickAction { .. } => "quick",
            Self::InvalidConstructConfig { .. } => "construct",
            Self::ActionFailed { .. } | Self::TaskFailed { .. } => "execution",
            Self::Configuration { .. } => "configuration",
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, DacError>;

impl From<std::io::Error> for DacError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", err)
    }
}

impl From<serde_json::Error> for DacError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<serde_yaml::Error> for DacError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}

/// One failed entry of a best-effort registry load.
///
/// `key` is the section key the entry came from (a context-key type path,
/// `_` for Global, or a quick-action/quick-task owner), `position` its index
/// in that key's list when the failure concerns a single entry.
#[derive(Debug)]
pub struct LoadError {
    pub section: &'static str,
    pub key: String,
    pub position: Option<usize>,
    pub error: DacError,
}

impl LoadError {
    pub fn new<K: Into<String>>(
        section: &'static str,
        key: K,
        position: Option<usize>,
        error: DacError,
    ) -> Self {
        Self {
            section,
            key: key.into(),
            position,
            error,
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(
                f,
                "{}.{}[{}]: {}",
                self.section, self.key, position, self.error
            ),
            None => write!(f, "{}.{}: {}", self.section, self.key, self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        assert_eq!(DacError::type_not_found("a.b").category(), "resolution");
        assert_eq!(
            DacError::unbound("act", "input", None).category(),
            "binding"
        );
        assert_eq!(
            DacError::malformed_section("[<]", "no open submenu").category(),
            "plugin"
        );
    }

    #[test]
    fn test_action_failed_keeps_source() {
        let err = DacError::action_failed("act", anyhow::anyhow!("boom"));
        assert!(err.to_string().contains("boom"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_load_error_display() {
        let err = LoadError::new("actions", "_", Some(2), DacError::type_not_found("x.Y"));
        assert_eq!(err.to_string(), "actions._[2]: Type not found: x.Y");
    }
}
