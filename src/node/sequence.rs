//! Composite actions that run several member actions against one argument
//! set.
//!
//! The composite's signature is the union of its members' signatures in
//! member order. A parameter name shared by several members is declared
//! once, by the first member that names it, and the bound value is handed to
//! every member that declares it. Each member is called exactly once, in
//! order. The first failing member aborts the call, so nothing any member
//! returned is captured.

use anyhow::{bail, Context as _};
use std::sync::Arc;

use super::{short_name, Action, ActionOutput, Args, Signature};
use crate::any::DynAny;
use crate::registry::ActionType;

/// Runs its members in order as one action
#[derive(Debug, Clone)]
pub struct SequenceAction {
    caption: String,
    members: Vec<(String, Arc<dyn Action>)>,
}

impl SequenceAction {
    /// A sequence with one fresh instance of every member type
    pub fn new(caption: impl Into<String>, members: &[ActionType]) -> Self {
        Self {
            caption: caption.into(),
            members: members
                .iter()
                .map(|t| (t.path().to_string(), t.create()))
                .collect(),
        }
    }

    /// Type paths of the members, in call order
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|(path, _)| path.as_str())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Action for SequenceAction {
    fn caption(&self) -> &str {
        &self.caption
    }

    fn signature(&self) -> Signature {
        let mut union = Signature::new();
        let mut outputs: Vec<String> = Vec::new();
        for (_, member) in &self.members {
            let signature = member.signature();
            for param in signature.params() {
                if union.get(&param.name).is_none() {
                    union = union.param(param.clone());
                }
            }
            for output in signature.outputs() {
                if !outputs.contains(output) {
                    outputs.push(output.clone());
                }
            }
        }
        outputs.into_iter().fold(union, |s, output| s.output(output))
    }

    /// Member outputs combine into one result: Data nodes are concatenated,
    /// side-channel values are collected into a `Vec<DynAny>` in member
    /// order. A sequence whose members return both kinds fails.
    fn call(&self, args: &Args<'_>) -> anyhow::Result<ActionOutput> {
        let mut nodes = Vec::new();
        let mut opaque: Vec<DynAny> = Vec::new();
        for (step, (path, member)) in self.members.iter().enumerate() {
            let mut member_args = Args::new(format!("{}/{}", args.action(), short_name(path)));
            for param in member.signature().params() {
                if let Some(arg) = args.get(&param.name) {
                    member_args.insert(param.name.clone(), arg.clone());
                }
            }
            let output = member
                .call(&member_args)
                .with_context(|| format!("step {} ({}) of {}", step + 1, path, args.action()))?;
            match output {
                ActionOutput::NoOutput => {}
                ActionOutput::Nodes(mut produced) => nodes.append(&mut produced),
                ActionOutput::Opaque(value) => opaque.push(value),
            }
        }

        match (nodes.is_empty(), opaque.is_empty()) {
            (true, true) => Ok(ActionOutput::NoOutput),
            (false, true) => Ok(ActionOutput::Nodes(nodes)),
            (true, false) => Ok(ActionOutput::opaque(opaque)),
            (false, false) => bail!(
                "{} mixes {} Data node(s) with {} side-channel result(s)",
                args.action(),
                nodes.len(),
                opaque.len()
            ),
        }
    }
}
