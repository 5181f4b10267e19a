// The derive macro refers to this crate as `::dac`, also from inside it
extern crate self as dac;

// Core infrastructure: errors, configuration, logging
pub mod core;

pub mod any;
pub mod node;
pub mod registry;
pub mod plugin;
pub mod context;
pub mod invoke;
pub mod project;

// Built-in analysis modules and the bundled registry document
pub mod modules;

// Re-exports for convenience
pub use crate::core::config::{CandidatePolicy, DacConfig, LogConfig};
pub use crate::core::errors::{DacError, LoadError, Result};
pub use crate::core::telemetry::init_tracing;

pub use any::DynAny;
pub use context::{Context, ContextKey, DataPool, Session, WorkflowGraph};
pub use invoke::{
    ChannelTask, Disambiguator, FirstCandidate, Invocation, RequireExplicit, Task, TaskOutcome,
};
pub use node::{
    Action, ActionKind, ActionNode, ActionOutput, ActionStatus, Args, Binding, ConstructConfig,
    DataNode, DataNodeType, NodeBase, Param, ParamKind, ParamMap, SequenceAction, Signature,
};
pub use plugin::{MenuItem, MenuKey, PluginLoader, RegistryDocument, RegistryState};
pub use project::{ProjectFormat, ProjectSerializer, ProjectTree};
pub use registry::{Resolver, TypeRegistry};
