//! One-click dispatch: Quick Actions on a selected Data node and Quick Tasks
//! filling a single Action parameter.

use serde_json::Value;
use std::fmt::Debug;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Disambiguator, Invocation};
use crate::context::{Context, DataPool};
use crate::core::errors::{DacError, Result};
use crate::node::{Binding, ParamMap};
use crate::plugin::RegistryState;

/// What a task is asked to produce
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub action_type: String,
    pub param: String,
    /// Label of the Quick-Task binding, for prompts
    pub label: String,
    /// The parameter's stored value, if any
    pub current: Option<Binding>,
    /// JSON schema of acceptable values
    pub schema: Value,
}

/// Result of a task: a value for the parameter, or "leave it alone"
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Resolved(Binding),
    Cancelled,
}

/// A helper that computes or asks for the value of one Action parameter.
///
/// Runs synchronously and may block on an interactive step. Returning
/// [`TaskOutcome::Cancelled`] is not an error.
pub trait Task: Debug + Send + Sync {
    fn run(&self, request: &TaskRequest) -> anyhow::Result<TaskOutcome>;
}

/// Registration metadata of a Default-constructible Task type
pub trait TaskKind: Task + Default + 'static {
    const TYPE_PATH: &'static str;
}

/// A request forwarded to an interactive front end
#[derive(Debug)]
pub struct TaskPrompt {
    pub request: TaskRequest,
    reply: oneshot::Sender<TaskOutcome>,
}

impl TaskPrompt {
    pub fn respond(self, outcome: TaskOutcome) {
        // The asking side may have given up already; nothing to do then.
        let _ = self.reply.send(outcome);
    }

    pub fn resolve(self, binding: impl Into<Binding>) {
        self.respond(TaskOutcome::Resolved(binding.into()));
    }

    pub fn cancel(self) {
        self.respond(TaskOutcome::Cancelled);
    }
}

/// Task that hands every request to a front end over a channel and blocks
/// until it answers. A prompt dropped without an answer counts as cancelled.
///
/// Must not be run from inside an async runtime thread.
#[derive(Debug, Clone)]
pub struct ChannelTask {
    prompts: mpsc::UnboundedSender<TaskPrompt>,
}

impl ChannelTask {
    pub fn new(prompts: mpsc::UnboundedSender<TaskPrompt>) -> Self {
        Self { prompts }
    }

    /// A task plus the receiving end a front end should drain
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TaskPrompt>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl Task for ChannelTask {
    fn run(&self, request: &TaskRequest) -> anyhow::Result<TaskOutcome> {
        let (reply, answer) = oneshot::channel();
        self.prompts
            .send(TaskPrompt {
                request: request.clone(),
                reply,
            })
            .map_err(|_| anyhow::anyhow!("no front end is listening for task prompts"))?;
        Ok(answer.blocking_recv().unwrap_or(TaskOutcome::Cancelled))
    }
}

/// Run the Quick Action registered for the selected node's exact type.
///
/// The first recipe for that type is used. Its defaults are merged under
/// `overrides` and the target parameter is bound to `data_uuid`. The action
/// is transient: it is invoked against `context` but never stored there.
pub fn run_quick(
    state: &RegistryState,
    context: &mut Context,
    global: Option<&DataPool>,
    data_uuid: Uuid,
    overrides: &ParamMap,
    policy: &dyn Disambiguator,
) -> Result<Invocation> {
    let (node, _) = context
        .lookup(global, &data_uuid)
        .ok_or_else(|| DacError::not_found("data node", data_uuid))?;
    let type_path = node.type_path();
    let recipe = state
        .quick_actions(type_path)
        .first()
        .ok_or_else(|| DacError::NoQuickAction {
            type_path: type_path.to_string(),
        })?
        .clone();

    let mut params: ParamMap = recipe
        .defaults
        .iter()
        .map(|(name, value)| (name.clone(), Binding::Literal(value.clone())))
        .collect();
    for (name, binding) in overrides {
        params.insert(name.clone(), binding.clone());
    }
    params.insert(recipe.target.clone(), Binding::Node(data_uuid));

    info!(
        "quick action {} on {} ({})",
        recipe.action.path(),
        type_path,
        data_uuid
    );
    let action = recipe.action.create();
    context.invoke(global, action.as_ref(), recipe.action.path(), &params, policy)
}

/// Run the Quick Task bound to `param` of `action_type`.
///
/// Only computes the value; storing it is up to the caller, and a
/// cancelled task leaves everything as it was.
pub fn run_task(
    state: &RegistryState,
    action_type: &str,
    param: &str,
    current: Option<&Binding>,
) -> Result<TaskOutcome> {
    let action = state.resolver().resolve_action(action_type)?;
    let binding = state
        .quick_task(action.path(), param)
        .ok_or_else(|| DacError::not_found("quick task", format!("{}.{}", action.path(), param)))?;
    let schema = action
        .signature()
        .get(param)
        .map(|p| p.schema())
        .unwrap_or(Value::Null);

    let request = TaskRequest {
        action_type: action.path().to_string(),
        param: param.to_string(),
        label: binding.label.clone(),
        current: current.cloned(),
        schema,
    };
    debug!("running task {} for {}.{}", binding.task.path(), request.action_type, param);
    binding
        .task
        .create()
        .run(&request)
        .map_err(|e| DacError::task_failed(binding.task.path(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    fn request() -> TaskRequest {
        TaskRequest {
            action_type: "dac.modules.timedata.LoadAction".to_string(),
            param: "fpaths".to_string(),
            label: "Select files".to_string(),
            current: None,
            schema: Value::Null,
        }
    }

    #[test]
    fn test_channel_task_answered() {
        let (task, mut prompts) = ChannelTask::channel();
        let front_end = thread::spawn(move || {
            let prompt = prompts.blocking_recv().unwrap();
            assert_eq!(prompt.request.param, "fpaths");
            prompt.resolve(serde_json::json!(["a.txt"]));
        });

        let outcome = task.run(&request()).unwrap();
        front_end.join().unwrap();
        assert_eq!(
            outcome,
            TaskOutcome::Resolved(Binding::literal(serde_json::json!(["a.txt"])))
        );
    }

    #[test]
    fn test_dropped_prompt_is_cancelled() {
        let (task, mut prompts) = ChannelTask::channel();
        let front_end = thread::spawn(move || {
            drop(prompts.blocking_recv());
        });
        assert_eq!(task.run(&request()).unwrap(), TaskOutcome::Cancelled);
        front_end.join().unwrap();
    }

    #[test]
    fn test_no_front_end_is_an_error() {
        let (task, prompts) = ChannelTask::channel();
        drop(prompts);
        assert!(task.run(&request()).is_err());
    }
}
