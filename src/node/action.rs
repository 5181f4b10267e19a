//! Action nodes: declared call signatures, parameter bindings, resolved
//! arguments and the tagged output of a call.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Debug;
use std::sync::Arc;
use uuid::Uuid;

use super::{from_config_value, to_config_value, ConstructConfig, DataNode, NodeBase};
use crate::any::DynAny;
use crate::core::errors::{DacError, Result};

/// Declared type of one action parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    /// A single Data node of the given type path (or a declared subtype)
    Data(String),
    /// A list of Data nodes of the given type path
    DataList(String),
    Bool,
    Int,
    Float,
    Str,
    /// One of a fixed set of string values
    Enum(Vec<String>),
    /// A homogeneous list of literals
    List(Box<ParamKind>),
    /// Any primitive value
    Any,
}

impl ParamKind {
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data(_) | Self::DataList(_))
    }

    /// Declared Data type path for Data-typed parameters
    pub fn data_type(&self) -> Option<&str> {
        match self {
            Self::Data(path) | Self::DataList(path) => Some(path),
            _ => None,
        }
    }

    /// JSON schema of the values this kind accepts
    pub fn json_schema(&self) -> Value {
        match self {
            Self::Data(path) => json!({ "type": "string", "format": "uuid", "x-data-type": path }),
            Self::DataList(path) => json!({
                "type": "array",
                "items": { "type": "string", "format": "uuid" },
                "x-data-type": path
            }),
            Self::Bool => json!({ "type": "boolean" }),
            Self::Int => json!({ "type": "integer" }),
            Self::Float => json!({ "type": "number" }),
            Self::Str => json!({ "type": "string" }),
            Self::Enum(variants) => json!({ "type": "string", "enum": variants }),
            Self::List(inner) => json!({ "type": "array", "items": inner.json_schema() }),
            Self::Any => json!({}),
        }
    }

    /// Short human description, used in mismatch errors
    pub fn describe(&self) -> String {
        match self {
            Self::Data(path) => path.clone(),
            Self::DataList(path) => format!("list[{}]", path),
            Self::Bool => "bool".to_string(),
            Self::Int => "int".to_string(),
            Self::Float => "float".to_string(),
            Self::Str => "str".to_string(),
            Self::Enum(variants) => format!("one of [{}]", variants.join(", ")),
            Self::List(inner) => format!("list[{}]", inner.describe()),
            Self::Any => "any".to_string(),
        }
    }
}

/// One entry of an action's call signature
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    /// Declared default; `Some(Value::Null)` means "defaults to nothing"
    pub default: Option<Value>,
    pub description: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            description: None,
        }
    }

    pub fn data(name: impl Into<String>, type_path: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Data(type_path.into()))
    }

    pub fn data_list(name: impl Into<String>, type_path: impl Into<String>) -> Self {
        Self::new(name, ParamKind::DataList(type_path.into()))
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Schema of accepted values, admitting `null` when that is the default
    pub fn schema(&self) -> Value {
        let mut schema = self.kind.json_schema();
        if matches!(self.default, Some(Value::Null)) {
            schema = json!({ "anyOf": [schema, { "type": "null" }] });
        }
        if let (Some(description), Value::Object(map)) = (&self.description, &mut schema) {
            map.insert("description".to_string(), json!(description));
        }
        schema
    }

    /// Check a literal against the parameter's schema
    pub fn validate_literal(&self, action: &str, value: &Value) -> Result<()> {
        let schema = self.schema();
        let validator = jsonschema::validator_for(&schema).map_err(|e| {
            DacError::configuration_field(
                format!("invalid schema for parameter '{}': {}", self.name, e),
                format!("{}.{}", action, self.name),
            )
        })?;
        if validator.is_valid(value) {
            Ok(())
        } else {
            Err(DacError::type_mismatch(
                format!("{}.{}", action, self.name),
                self.kind.describe(),
                value.to_string(),
            ))
        }
    }
}

/// Ordered call signature of an action
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<Param>,
    outputs: Vec<String>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Declare an output Data type
    pub fn output(mut self, type_path: impl Into<String>) -> Self {
        self.outputs.push(type_path.into());
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Object schema over all parameters, for presentation layers
    pub fn schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| !p.has_default())
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Stored value of one parameter: a node reference or a literal.
///
/// Untagged on the wire: a UUID string reads back as [`Binding::Node`]. The
/// invoker turns references back into literals for literal-typed parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Binding {
    Node(Uuid),
    Nodes(Vec<Uuid>),
    Literal(Value),
}

impl Binding {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// The literal view of this binding
    pub fn into_literal(self) -> Value {
        match self {
            Self::Node(uuid) => Value::String(uuid.to_string()),
            Self::Nodes(uuids) => Value::Array(
                uuids
                    .into_iter()
                    .map(|u| Value::String(u.to_string()))
                    .collect(),
            ),
            Self::Literal(value) => value,
        }
    }

    /// Node references carried by this binding, if it is one
    pub fn uuids(&self) -> Option<Vec<Uuid>> {
        match self {
            Self::Node(uuid) => Some(vec![*uuid]),
            Self::Nodes(uuids) => Some(uuids.clone()),
            Self::Literal(Value::String(s)) => Uuid::parse_str(s).ok().map(|u| vec![u]),
            Self::Literal(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().and_then(|s| Uuid::parse_str(s).ok()))
                .collect(),
            Self::Literal(_) => None,
        }
    }
}

impl From<Uuid> for Binding {
    fn from(uuid: Uuid) -> Self {
        Self::Node(uuid)
    }
}

impl From<Vec<Uuid>> for Binding {
    fn from(uuids: Vec<Uuid>) -> Self {
        Self::Nodes(uuids)
    }
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

/// Parameter name → stored binding, in declaration or insertion order
pub type ParamMap = IndexMap<String, Binding>;

/// A resolved argument handed to an action's callable
#[derive(Debug, Clone)]
pub enum Arg<'a> {
    Node(&'a dyn DataNode),
    Nodes(Vec<&'a dyn DataNode>),
    Literal(Value),
}

/// Fully resolved argument set of one invocation
#[derive(Debug)]
pub struct Args<'a> {
    action: String,
    values: IndexMap<String, Arg<'a>>,
}

impl<'a> Args<'a> {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            values: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, arg: Arg<'a>) {
        self.values.insert(name.into(), arg);
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn get(&self, name: &str) -> Option<&Arg<'a>> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    /// A single Data argument, type-erased
    pub fn node_dyn(&self, name: &str) -> anyhow::Result<&'a dyn DataNode> {
        match self.values.get(name) {
            Some(Arg::Node(node)) => Ok(*node),
            Some(_) => Err(anyhow::anyhow!(
                "Argument '{}' of {} is not a single node",
                name,
                self.action
            )),
            None => Err(anyhow::anyhow!(
                "Argument '{}' not found for {}",
                name,
                self.action
            )),
        }
    }

    /// A single Data argument as its concrete type
    pub fn node<T: DataNode>(&self, name: &str) -> anyhow::Result<&'a T> {
        let node = self.node_dyn(name)?;
        node.downcast_ref::<T>().ok_or_else(|| {
            anyhow::anyhow!(
                "Argument '{}' of {} is a {}, not {}",
                name,
                self.action,
                node.type_path(),
                std::any::type_name::<T>()
            )
        })
    }

    /// A Data-list argument, type-erased
    pub fn nodes_dyn(&self, name: &str) -> anyhow::Result<Vec<&'a dyn DataNode>> {
        match self.values.get(name) {
            Some(Arg::Nodes(nodes)) => Ok(nodes.clone()),
            Some(Arg::Node(node)) => Ok(vec![*node]),
            Some(Arg::Literal(_)) => Err(anyhow::anyhow!(
                "Argument '{}' of {} is a literal",
                name,
                self.action
            )),
            None => Err(anyhow::anyhow!(
                "Argument '{}' not found for {}",
                name,
                self.action
            )),
        }
    }

    /// A Data-list argument with every element as `T`
    pub fn nodes<T: DataNode>(&self, name: &str) -> anyhow::Result<Vec<&'a T>> {
        self.nodes_dyn(name)?
            .into_iter()
            .map(|node| {
                node.downcast_ref::<T>().ok_or_else(|| {
                    anyhow::anyhow!(
                        "Element of '{}' in {} is a {}",
                        name,
                        self.action,
                        node.type_path()
                    )
                })
            })
            .collect()
    }

    /// Deserialize a literal argument
    pub fn literal<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        match self.values.get(name) {
            Some(Arg::Literal(value)) => serde_json::from_value(value.clone()).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to deserialize argument '{}' of {}: {}",
                    name,
                    self.action,
                    e
                )
            }),
            Some(_) => Err(anyhow::anyhow!(
                "Argument '{}' of {} is a node reference",
                name,
                self.action
            )),
            None => Err(anyhow::anyhow!(
                "Argument '{}' not found for {}",
                name,
                self.action
            )),
        }
    }

    /// Deserialize a literal argument whose `null` means "not given"
    pub fn literal_opt<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        match self.values.get(name) {
            Some(Arg::Literal(Value::Null)) | None => Ok(None),
            Some(_) => self.literal(name).map(Some),
        }
    }
}

/// What one call produced
#[derive(Debug)]
pub enum ActionOutput {
    /// Nothing to capture
    NoOutput,
    /// Data nodes to insert into the invoking Context
    Nodes(Vec<Box<dyn DataNode>>),
    /// A side-channel value (figures, summaries) handed back to the caller
    Opaque(DynAny),
}

impl ActionOutput {
    pub fn node(node: impl DataNode) -> Self {
        Self::Nodes(vec![Box::new(node)])
    }

    pub fn nodes(nodes: Vec<Box<dyn DataNode>>) -> Self {
        Self::Nodes(nodes)
    }

    pub fn opaque<T: Clone + Send + Sync + 'static>(value: T) -> Self {
        Self::Opaque(Box::new(value))
    }
}

/// An operation with a declared call signature.
///
/// `call` receives the fully resolved argument set and is executed exactly
/// once per invocation. It must not assume anything about the Context it
/// runs in; all inputs arrive through `args`.
pub trait Action: Debug + Send + Sync {
    /// Human-facing label used in menus
    fn caption(&self) -> &str;

    fn signature(&self) -> Signature;

    fn call(&self, args: &Args<'_>) -> anyhow::Result<ActionOutput>;
}

/// Registration metadata of a concrete Action type
pub trait ActionKind: Action + Default + 'static {
    const TYPE_PATH: &'static str;
}

/// Lifecycle of an action node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    #[default]
    Init,
    Configured,
    Complete,
    Failed,
}

/// A persisted, re-runnable instance of an action inside a Context
#[derive(Debug, Clone)]
pub struct ActionNode {
    base: NodeBase,
    type_path: String,
    action: Arc<dyn Action>,
    params: ParamMap,
    status: ActionStatus,
    outputs: Vec<Uuid>,
    last_run: Option<DateTime<Utc>>,
}

impl ActionNode {
    pub fn new(type_path: impl Into<String>, action: Arc<dyn Action>, params: ParamMap) -> Self {
        let status = if params.is_empty() {
            ActionStatus::Init
        } else {
            ActionStatus::Configured
        };
        Self {
            base: NodeBase::new(action.caption()),
            type_path: type_path.into(),
            action,
            params,
            status,
            outputs: Vec::new(),
            last_run: None,
        }
    }

    pub fn base(&self) -> &NodeBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    pub fn uuid(&self) -> Uuid {
        self.base.uuid()
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn type_path(&self) -> &str {
        &self.type_path
    }

    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }

    pub fn caption(&self) -> &str {
        self.action.caption()
    }

    pub fn signature(&self) -> Signature {
        self.action.signature()
    }

    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Binding> {
        self.params.get(name)
    }

    /// Store a parameter value; previous results become stale
    pub fn set_param(&mut self, name: impl Into<String>, binding: impl Into<Binding>) {
        self.params.insert(name.into(), binding.into());
        self.status = ActionStatus::Configured;
    }

    pub fn clear_param(&mut self, name: &str) -> Option<Binding> {
        let removed = self.params.shift_remove(name);
        if removed.is_some() {
            self.status = ActionStatus::Configured;
        }
        removed
    }

    pub fn status(&self) -> ActionStatus {
        self.status
    }

    /// UUIDs of the Data nodes the last successful run produced
    pub fn outputs(&self) -> &[Uuid] {
        &self.outputs
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    pub(crate) fn reassign(&mut self, uuid: Uuid) {
        self.base.reassign(uuid);
    }

    pub(crate) fn record_success(&mut self, params: ParamMap, outputs: Vec<Uuid>) {
        self.params = params;
        self.outputs = outputs;
        self.status = ActionStatus::Complete;
        self.last_run = Some(Utc::now());
    }

    pub(crate) fn record_failure(&mut self) {
        self.status = ActionStatus::Failed;
        self.last_run = Some(Utc::now());
    }

    /// Stored parameters, status and produced outputs as primitives
    pub fn construct_config(&self) -> ConstructConfig {
        let mut config = ConstructConfig::new();
        config.insert("params".to_string(), to_config_value(&self.params));
        config.insert("status".to_string(), to_config_value(&self.status));
        config.insert("outputs".to_string(), to_config_value(&self.outputs));
        config
    }

    pub fn apply_construct_config(&mut self, config: &ConstructConfig) -> Result<()> {
        if let Some(value) = config.get("params") {
            self.params = from_config_value(&self.type_path, "params", value)?;
        }
        if let Some(value) = config.get("status") {
            self.status = from_config_value(&self.type_path, "status", value)?;
        }
        if let Some(value) = config.get("outputs") {
            self.outputs = from_config_value(&self.type_path, "outputs", value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct Scale;

    impl Action for Scale {
        fn caption(&self) -> &str {
            "Scale"
        }

        fn signature(&self) -> Signature {
            Signature::new()
                .param(Param::new("factor", ParamKind::Float).with_default(1.0))
                .param(Param::new(
                    "mode",
                    ParamKind::Enum(vec!["lin".to_string(), "db".to_string()]),
                ))
                .param(Param::new("label", ParamKind::Str).with_default(Value::Null))
        }

        fn call(&self, _args: &Args<'_>) -> anyhow::Result<ActionOutput> {
            Ok(ActionOutput::NoOutput)
        }
    }

    #[test]
    fn test_binding_wire_format() {
        let uuid = Uuid::new_v4();
        let mut params = ParamMap::new();
        params.insert("input".to_string(), Binding::Node(uuid));
        params.insert("factor".to_string(), Binding::literal(2.0));
        params.insert("names".to_string(), Binding::literal(json!(["a", "b"])));

        let text = serde_json::to_string(&params).unwrap();
        let back: ParamMap = serde_json::from_str(&text).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_binding_views() {
        let uuid = Uuid::new_v4();
        assert_eq!(Binding::Node(uuid).uuids(), Some(vec![uuid]));
        assert_eq!(
            Binding::literal(uuid.to_string()).uuids(),
            Some(vec![uuid])
        );
        assert_eq!(Binding::literal(3).uuids(), None);
        assert_eq!(
            Binding::Node(uuid).into_literal(),
            Value::String(uuid.to_string())
        );
    }

    #[test]
    fn test_literal_validation() {
        let signature = Scale.signature();
        let mode = signature.get("mode").unwrap();
        assert!(mode.validate_literal("Scale", &json!("db")).is_ok());
        assert!(matches!(
            mode.validate_literal("Scale", &json!("log")),
            Err(DacError::TypeMismatch { .. })
        ));

        let label = signature.get("label").unwrap();
        assert!(label.validate_literal("Scale", &Value::Null).is_ok());
        assert!(label.validate_literal("Scale", &json!(4)).is_err());
    }

    #[test]
    fn test_signature_schema_marks_required() {
        let schema = Scale.signature().schema();
        assert_eq!(schema["required"], json!(["mode"]));
        assert_eq!(schema["properties"]["factor"]["type"], json!("number"));
    }

    #[test]
    fn test_action_node_status_and_config() {
        let mut node = ActionNode::new("test.Scale", Arc::new(Scale), ParamMap::new());
        assert_eq!(node.status(), ActionStatus::Init);
        assert_eq!(node.name(), "Scale");

        node.set_param("factor", Binding::literal(3.0));
        assert_eq!(node.status(), ActionStatus::Configured);

        let produced = vec![Uuid::new_v4()];
        node.record_success(node.params().clone(), produced.clone());
        let config = node.construct_config();

        let mut restored = ActionNode::new("test.Scale", Arc::new(Scale), ParamMap::new());
        restored.apply_construct_config(&config).unwrap();
        assert_eq!(restored.params(), node.params());
        assert_eq!(restored.status(), ActionStatus::Complete);
        assert_eq!(restored.outputs(), produced.as_slice());
    }
}
