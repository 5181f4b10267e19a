//! Action invocation: argument binding, the single call, output capture.

pub mod quick;

use std::collections::HashSet;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::any::DynAny;
use crate::context::{Candidate, Context, DataPool};
use crate::core::config::CandidatePolicy;
use crate::core::errors::{DacError, Result};
use crate::node::{Action, ActionOutput, Arg, Args, Binding, DataNode, Param, ParamKind, ParamMap};

pub use quick::{
    run_quick, run_task, ChannelTask, Task, TaskKind, TaskOutcome, TaskPrompt, TaskRequest,
};

/// Tagged result of one invocation
#[derive(Debug)]
pub enum Invocation {
    NoOutput,
    /// UUIDs of the Data nodes inserted into the invoking Context
    Nodes(Vec<Uuid>),
    /// Side-channel value handed back to the caller
    Opaque(DynAny),
}

impl Invocation {
    /// UUIDs of inserted nodes, empty unless this is [`Invocation::Nodes`]
    pub fn produced(&self) -> Vec<Uuid> {
        match self {
            Self::Nodes(uuids) => uuids.clone(),
            _ => Vec::new(),
        }
    }

    pub fn into_opaque(self) -> Option<DynAny> {
        match self {
            Self::Opaque(value) => Some(value),
            _ => None,
        }
    }
}

/// Decides which candidate an unbound Data-typed parameter gets.
///
/// Candidates arrive local first, then Global, each in insertion order.
pub trait Disambiguator: Send + Sync {
    fn choose(&self, action: &str, param: &Param, candidates: &[Candidate<'_>]) -> Option<Uuid>;

    fn choose_many(
        &self,
        action: &str,
        param: &Param,
        candidates: &[Candidate<'_>],
    ) -> Option<Vec<Uuid>>;
}

/// Takes the first candidate, or every candidate for list parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstCandidate;

impl Disambiguator for FirstCandidate {
    fn choose(&self, _action: &str, _param: &Param, candidates: &[Candidate<'_>]) -> Option<Uuid> {
        candidates.first().map(|c| c.uuid)
    }

    fn choose_many(
        &self,
        _action: &str,
        _param: &Param,
        candidates: &[Candidate<'_>],
    ) -> Option<Vec<Uuid>> {
        if candidates.is_empty() {
            None
        } else {
            Some(candidates.iter().map(|c| c.uuid).collect())
        }
    }
}

/// Never picks; every Data parameter must be bound
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireExplicit;

impl Disambiguator for RequireExplicit {
    fn choose(&self, _action: &str, _param: &Param, _candidates: &[Candidate<'_>]) -> Option<Uuid> {
        None
    }

    fn choose_many(
        &self,
        _action: &str,
        _param: &Param,
        _candidates: &[Candidate<'_>],
    ) -> Option<Vec<Uuid>> {
        None
    }
}

impl Disambiguator for CandidatePolicy {
    fn choose(&self, action: &str, param: &Param, candidates: &[Candidate<'_>]) -> Option<Uuid> {
        match self {
            Self::First => FirstCandidate.choose(action, param, candidates),
            Self::RequireExplicit => RequireExplicit.choose(action, param, candidates),
        }
    }

    fn choose_many(
        &self,
        action: &str,
        param: &Param,
        candidates: &[Candidate<'_>],
    ) -> Option<Vec<Uuid>> {
        match self {
            Self::First => FirstCandidate.choose_many(action, param, candidates),
            Self::RequireExplicit => RequireExplicit.choose_many(action, param, candidates),
        }
    }
}

/// A successful invocation plus the parameters it actually used
#[derive(Debug)]
pub struct Completed {
    pub invocation: Invocation,
    pub params: ParamMap,
}

/// Binds arguments, calls the action once and captures its outputs
pub struct ActionInvoker<'p> {
    policy: &'p dyn Disambiguator,
}

impl<'p> ActionInvoker<'p> {
    pub fn new(policy: &'p dyn Disambiguator) -> Self {
        Self { policy }
    }

    /// Invoke `action` against `context`.
    ///
    /// `action_uuid` is the UUID of the stored Action node, if any; output
    /// nodes never reuse it. Outputs are inserted only if all of them can be.
    #[instrument(skip_all, fields(action = %label))]
    pub fn invoke(
        &self,
        context: &mut Context,
        global: Option<&DataPool>,
        action: &dyn Action,
        label: &str,
        action_uuid: Option<Uuid>,
        bound: &ParamMap,
    ) -> Result<Completed> {
        let signature = action.signature();
        let (output, params) = {
            let mut args = Args::new(label);
            let mut used = ParamMap::new();
            for param in signature.params() {
                let (arg, binding) =
                    self.bind(context, global, label, param, bound.get(&param.name))?;
                args.insert(param.name.clone(), arg);
                used.insert(param.name.clone(), binding);
            }
            debug!("calling {} with {} argument(s)", label, args.len());
            let output = action
                .call(&args)
                .map_err(|e| DacError::action_failed(label, e))?;
            (output, used)
        };

        let invocation = match output {
            ActionOutput::NoOutput => Invocation::NoOutput,
            ActionOutput::Opaque(value) => Invocation::Opaque(value),
            ActionOutput::Nodes(nodes) => {
                Invocation::Nodes(self.capture(context, global, action_uuid, nodes)?)
            }
        };
        debug!("{} finished: {:?}", label, invocation_summary(&invocation));
        Ok(Completed { invocation, params })
    }

    fn bind<'c>(
        &self,
        context: &'c Context,
        global: Option<&'c DataPool>,
        label: &str,
        param: &Param,
        binding: Option<&Binding>,
    ) -> Result<(Arg<'c>, Binding)> {
        match &param.kind {
            ParamKind::Data(type_path) => {
                let uuid = match binding {
                    Some(Binding::Literal(serde_json::Value::Null)) | None
                        if matches!(param.default, Some(serde_json::Value::Null)) =>
                    {
                        return Ok((
                            Arg::Literal(serde_json::Value::Null),
                            Binding::Literal(serde_json::Value::Null),
                        ));
                    }
                    Some(binding) => single_reference(label, param, binding)?,
                    None => {
                        let candidates = context.resolve_for_type(global, type_path);
                        self.policy
                            .choose(label, param, &candidates)
                            .ok_or_else(|| DacError::unbound(label, &param.name, None))?
                    }
                };
                let node = resolve_node(context, global, label, param, type_path, uuid)?;
                Ok((Arg::Node(node), Binding::Node(uuid)))
            }
            ParamKind::DataList(type_path) => {
                let uuids = match binding {
                    Some(binding) => binding.uuids().ok_or_else(|| {
                        DacError::type_mismatch(
                            format!("{}.{}", label, param.name),
                            param.kind.describe(),
                            "literal",
                        )
                    })?,
                    None => {
                        let candidates = context.resolve_for_type(global, type_path);
                        self.policy
                            .choose_many(label, param, &candidates)
                            .ok_or_else(|| DacError::unbound(label, &param.name, None))?
                    }
                };
                let nodes = uuids
                    .iter()
                    .map(|uuid| resolve_node(context, global, label, param, type_path, *uuid))
                    .collect::<Result<Vec<_>>>()?;
                Ok((Arg::Nodes(nodes), Binding::Nodes(uuids)))
            }
            _ => {
                let value = match binding {
                    Some(binding) => binding.clone().into_literal(),
                    None => param
                        .default
                        .clone()
                        .ok_or_else(|| DacError::missing_parameter(label, &param.name))?,
                };
                param.validate_literal(label, &value)?;
                Ok((Arg::Literal(value.clone()), Binding::Literal(value)))
            }
        }
    }

    fn capture(
        &self,
        context: &mut Context,
        global: Option<&DataPool>,
        action_uuid: Option<Uuid>,
        mut nodes: Vec<Box<dyn DataNode>>,
    ) -> Result<Vec<Uuid>> {
        let mut assigned: HashSet<Uuid> = HashSet::new();
        for node in nodes.iter_mut() {
            let uuid = loop {
                let candidate = Uuid::new_v4();
                if Some(candidate) != action_uuid
                    && !assigned.contains(&candidate)
                    && !context.is_taken(global, &candidate)
                {
                    break candidate;
                }
            };
            node.base_mut().reassign(uuid);
            assigned.insert(uuid);
        }

        let mut produced = Vec::with_capacity(nodes.len());
        for node in nodes {
            produced.push(context.insert_data(global, node)?);
        }
        Ok(produced)
    }
}

fn single_reference(label: &str, param: &Param, binding: &Binding) -> Result<Uuid> {
    match binding.uuids().as_deref() {
        Some([uuid]) => Ok(*uuid),
        _ => Err(DacError::type_mismatch(
            format!("{}.{}", label, param.name),
            param.kind.describe(),
            match binding {
                Binding::Nodes(_) => "node list".to_string(),
                other => other.clone().into_literal().to_string(),
            },
        )),
    }
}

fn resolve_node<'c>(
    context: &'c Context,
    global: Option<&'c DataPool>,
    label: &str,
    param: &Param,
    type_path: &str,
    uuid: Uuid,
) -> Result<&'c dyn DataNode> {
    let (node, _) = context
        .lookup(global, &uuid)
        .ok_or_else(|| DacError::unbound(label, &param.name, Some(uuid)))?;
    if !context.registry().is_compatible(node.type_path(), type_path) {
        return Err(DacError::type_mismatch(
            format!("{}.{}", label, param.name),
            type_path,
            node.type_path(),
        ));
    }
    Ok(node)
}

fn invocation_summary(invocation: &Invocation) -> String {
    match invocation {
        Invocation::NoOutput => "no output".to_string(),
        Invocation::Nodes(uuids) => format!("{} node(s)", uuids.len()),
        Invocation::Opaque(value) => format!("opaque {}", (**value).type_name()),
    }
}
