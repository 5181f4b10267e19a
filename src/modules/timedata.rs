//! Time-domain signals: the `TimeData` node and the actions that create,
//! cut and show it.

use anyhow::{bail, Context as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use crate::invoke::quick::{Task, TaskKind, TaskOutcome, TaskRequest};
use crate::node::{
    Action, ActionKind, ActionOutput, Args, Binding, DataNode, NodeBase, Param, ParamKind,
    Signature,
};
use crate::registry::{TypeRegistry, PLUGINS};

pub const TIME_DATA: &str = "dac.modules.timedata.TimeData";

/// Upper bound on generated samples per signal
pub const MAX_SAMPLES: usize = 1 << 28;

/// An equidistantly sampled signal
#[derive(Debug, Clone, DataNode)]
#[data_node(path = "dac.modules.timedata.TimeData", parent = "dac.core.data.DataBase")]
pub struct TimeData {
    pub base: NodeBase,
    #[construct(skip)]
    pub y: Vec<f64>,
    /// Sample interval in seconds
    pub dt: f64,
    pub y_unit: String,
    pub comment: String,
}

impl Default for TimeData {
    fn default() -> Self {
        Self {
            base: NodeBase::default(),
            y: Vec::new(),
            dt: 1.0,
            y_unit: "-".to_string(),
            comment: String::new(),
        }
    }
}

impl TimeData {
    pub fn new(name: impl Into<String>, y: Vec<f64>, dt: f64) -> Self {
        Self {
            base: NodeBase::new(name),
            y,
            dt,
            ..Self::default()
        }
    }

    /// Sampling frequency
    pub fn fs(&self) -> f64 {
        1.0 / self.dt
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Sample instants
    pub fn t(&self) -> Vec<f64> {
        (0..self.y.len()).map(|i| i as f64 * self.dt).collect()
    }
}

/// Sum of cosines plus offset
#[derive(Debug, Default)]
pub struct SignalConstructAction;

impl Action for SignalConstructAction {
    fn caption(&self) -> &str {
        "Construct signal with cosines"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .param(
                Param::new(
                    "components",
                    ParamKind::List(Box::new(ParamKind::List(Box::new(ParamKind::Float)))),
                )
                .with_default(json!([]))
                .describe("[freq Hz, amplitude, phase deg] per cosine"),
            )
            .param(Param::new("offset", ParamKind::Float).with_default(0.0))
            .param(Param::new("duration", ParamKind::Float).with_default(10.0))
            .param(Param::new("fs", ParamKind::Int).with_default(1000))
            .output(TIME_DATA)
    }

    fn call(&self, args: &Args<'_>) -> anyhow::Result<ActionOutput> {
        let components: Vec<(f64, f64, f64)> = args.literal("components")?;
        let offset: f64 = args.literal("offset")?;
        let duration: f64 = args.literal("duration")?;
        let fs: i64 = args.literal("fs")?;
        if fs <= 0 {
            bail!("sampling frequency must be positive, got {}", fs);
        }
        if duration < 0.0 {
            bail!("duration must not be negative, got {}", duration);
        }

        let fs = fs as f64;
        let requested = duration * fs;
        if !requested.is_finite() || requested > MAX_SAMPLES as f64 {
            bail!(
                "{} s at {} Hz exceeds the limit of {} samples",
                duration,
                fs,
                MAX_SAMPLES
            );
        }
        let samples = requested as usize;
        let y = (0..samples)
            .map(|i| {
                let t = i as f64 / fs;
                offset
                    + components
                        .iter()
                        .map(|(freq, amp, phase)| {
                            amp * (2.0 * PI * freq * t + phase.to_radians()).cos()
                        })
                        .sum::<f64>()
            })
            .collect();

        let mut signal = TimeData::new("Generated signal", y, 1.0 / fs);
        signal.comment = "Constructed time data".to_string();
        Ok(ActionOutput::node(signal))
    }
}

impl ActionKind for SignalConstructAction {
    const TYPE_PATH: &'static str = "dac.modules.timedata.SignalConstructAction";
}

/// Reads plain-text sample files, one channel per file. Blank lines and
/// lines starting with `#` are skipped.
#[derive(Debug, Default)]
pub struct LoadAction;

impl Action for LoadAction {
    fn caption(&self) -> &str {
        "Load measurement data"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .param(Param::new("fpaths", ParamKind::List(Box::new(ParamKind::Str))))
            .param(Param::new("dt", ParamKind::Float).with_default(1.0))
            .param(Param::new("y_unit", ParamKind::Str).with_default("-"))
            .output(TIME_DATA)
    }

    fn call(&self, args: &Args<'_>) -> anyhow::Result<ActionOutput> {
        let fpaths: Vec<String> = args.literal("fpaths")?;
        let dt: f64 = args.literal("dt")?;
        let y_unit: String = args.literal("y_unit")?;

        let mut channels: Vec<Box<dyn DataNode>> = Vec::with_capacity(fpaths.len());
        for fpath in &fpaths {
            let path = Path::new(fpath);
            let text =
                fs::read_to_string(path).with_context(|| format!("Failed to read {}", fpath))?;
            let y = parse_samples(&text).with_context(|| format!("Failed to parse {}", fpath))?;
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(fpath.as_str());
            let mut channel = TimeData::new(name, y, dt);
            channel.y_unit = y_unit.clone();
            channel.comment = format!("Loaded from {}", fpath);
            channels.push(Box::new(channel));
        }
        Ok(ActionOutput::nodes(channels))
    }
}

impl ActionKind for LoadAction {
    const TYPE_PATH: &'static str = "dac.modules.timedata.LoadAction";
}

fn parse_samples(text: &str) -> anyhow::Result<Vec<f64>> {
    let mut samples = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for token in line.split(|c: char| c.is_whitespace() || c == ',' || c == ';') {
            if token.is_empty() {
                continue;
            }
            let value = token
                .parse::<f64>()
                .with_context(|| format!("line {}: '{}' is not a number", line_no + 1, token))?;
            samples.push(value);
        }
    }
    Ok(samples)
}

/// Cuts every channel to `[start, end)` seconds; an end of 0 keeps the tail
#[derive(Debug, Default)]
pub struct TruncAction;

impl Action for TruncAction {
    fn caption(&self) -> &str {
        "Truncate TimeData"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .param(Param::data_list("channels", TIME_DATA))
            .param(
                Param::new("duration", ParamKind::List(Box::new(ParamKind::Float)))
                    .with_default(json!([0.0, 0.0])),
            )
            .output(TIME_DATA)
    }

    fn call(&self, args: &Args<'_>) -> anyhow::Result<ActionOutput> {
        let channels = args.nodes::<TimeData>("channels")?;
        let (start, end): (f64, f64) = args.literal("duration")?;
        if start < 0.0 || (end != 0.0 && end < start) {
            bail!("invalid duration ({}, {})", start, end);
        }

        let truncated = channels
            .into_iter()
            .map(|channel| {
                let first = ((start / channel.dt).round() as usize).min(channel.len());
                let last = if end == 0.0 {
                    channel.len()
                } else {
                    ((end / channel.dt).round() as usize).clamp(first, channel.len())
                };
                let mut cut = TimeData::new(
                    channel.name().to_string(),
                    channel.y[first..last].to_vec(),
                    channel.dt,
                );
                cut.y_unit = channel.y_unit.clone();
                cut.comment = format!("Truncated to ({}, {})", start, end);
                Box::new(cut) as Box<dyn DataNode>
            })
            .collect();
        Ok(ActionOutput::nodes(truncated))
    }
}

impl ActionKind for TruncAction {
    const TYPE_PATH: &'static str = "dac.modules.timedata.TruncAction";
}

/// Line data for a front end to draw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSeries {
    pub label: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Prepares one line per channel, optionally thinned to `plot_dt`
#[derive(Debug, Default)]
pub struct ShowTimeDataAction;

impl Action for ShowTimeDataAction {
    fn caption(&self) -> &str {
        "Show measurement data"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .param(Param::data_list("channels", TIME_DATA))
            .param(Param::new("plot_dt", ParamKind::Float).with_default(Value::Null))
    }

    fn call(&self, args: &Args<'_>) -> anyhow::Result<ActionOutput> {
        let channels = args.nodes::<TimeData>("channels")?;
        let plot_dt: Option<f64> = args.literal_opt("plot_dt")?;

        let series: Vec<PlotSeries> = channels
            .into_iter()
            .map(|channel| {
                let step = match plot_dt {
                    Some(plot_dt) if plot_dt > channel.dt => {
                        (plot_dt / channel.dt).round().max(1.0) as usize
                    }
                    _ => 1,
                };
                let t = channel.t();
                PlotSeries {
                    label: format!("{} [{}]", channel.name(), channel.y_unit),
                    x: t.into_iter().step_by(step).collect(),
                    y: channel.y.iter().copied().step_by(step).collect(),
                }
            })
            .collect();
        Ok(ActionOutput::opaque(series))
    }
}

impl ActionKind for ShowTimeDataAction {
    const TYPE_PATH: &'static str = "dac.modules.timedata.ShowTimeDataAction";
}

/// Fills a file list parameter from a directory: when the stored value
/// names a directory, it is replaced by the sorted files inside it.
/// Anything else is left alone.
#[derive(Debug, Default)]
pub struct FillFpathsTask;

impl Task for FillFpathsTask {
    fn run(&self, request: &TaskRequest) -> anyhow::Result<TaskOutcome> {
        let directory = match &request.current {
            Some(Binding::Literal(Value::String(dir))) => dir.clone(),
            Some(Binding::Literal(Value::Array(items))) if items.len() == 1 => {
                match items[0].as_str() {
                    Some(dir) => dir.to_string(),
                    None => return Ok(TaskOutcome::Cancelled),
                }
            }
            _ => return Ok(TaskOutcome::Cancelled),
        };
        let dir = Path::new(&directory);
        if !dir.is_dir() {
            return Ok(TaskOutcome::Cancelled);
        }

        let mut fpaths = Vec::new();
        for entry in
            fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() {
                fpaths.push(path.to_string_lossy().into_owned());
            }
        }
        if fpaths.is_empty() {
            return Ok(TaskOutcome::Cancelled);
        }
        fpaths.sort();
        Ok(TaskOutcome::Resolved(Binding::literal(json!(fpaths))))
    }
}

impl TaskKind for FillFpathsTask {
    const TYPE_PATH: &'static str = "dac.modules.timedata.FillFpathsTask";
}

#[linkme::distributed_slice(PLUGINS)]
static REGISTER_TIMEDATA: fn(&mut TypeRegistry) = register;

fn register(registry: &mut TypeRegistry) {
    registry.register_data::<TimeData>();
    registry.register_action::<SignalConstructAction>();
    registry.register_action::<LoadAction>();
    registry.register_action::<TruncAction>();
    registry.register_action::<ShowTimeDataAction>();
    registry.register_task::<FillFpathsTask>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::any::downcast;
    use crate::context::{Context, ContextKey};
    use crate::core::errors::DacError;
    use crate::invoke::{FirstCandidate, Invocation};
    use crate::node::ParamMap;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn context() -> Context {
        Context::new(
            "signals",
            ContextKey::Global,
            Arc::new(TypeRegistry::with_plugins()),
        )
    }

    fn construct(ctx: &mut Context, params: ParamMap) -> uuid::Uuid {
        let produced = ctx
            .invoke(None, &SignalConstructAction, "construct", &params, &FirstCandidate)
            .unwrap()
            .produced();
        produced[0]
    }

    #[test]
    fn test_signal_construct() {
        let mut ctx = context();
        let mut params = ParamMap::new();
        params.insert("components".to_string(), Binding::literal(json!([[1.0, 2.0, 0.0]])));
        params.insert("offset".to_string(), Binding::literal(0.5));
        params.insert("duration".to_string(), Binding::literal(2.0));
        params.insert("fs".to_string(), Binding::literal(4));
        let uuid = construct(&mut ctx, params);

        let signal = ctx.data().get_as::<TimeData>(&uuid).unwrap();
        assert_eq!(signal.len(), 8);
        assert_eq!(signal.dt, 0.25);
        assert!((signal.y[0] - 2.5).abs() < 1e-12);
        assert!((signal.y[2] - (0.5 - 2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_signal_construct_rejects_oversized_request() {
        let mut ctx = context();
        for duration in [1e10, 1e300] {
            let mut params = ParamMap::new();
            params.insert("duration".to_string(), Binding::literal(duration));
            params.insert("fs".to_string(), Binding::literal(1000));
            let err = ctx
                .invoke(None, &SignalConstructAction, "construct", &params, &FirstCandidate)
                .unwrap_err();
            assert!(matches!(err, DacError::ActionFailed { .. }), "{:?}", err);
        }
        assert!(ctx.data().is_empty());
    }

    #[test]
    fn test_trunc_keeps_source() {
        let mut ctx = context();
        let mut params = ParamMap::new();
        params.insert("duration".to_string(), Binding::literal(1.0));
        params.insert("fs".to_string(), Binding::literal(10));
        let source = construct(&mut ctx, params);

        let mut trunc = ParamMap::new();
        trunc.insert("channels".to_string(), Binding::Nodes(vec![source]));
        trunc.insert("duration".to_string(), Binding::literal(json!([0.2, 0.5])));
        let produced = ctx
            .invoke(None, &TruncAction, "trunc", &trunc, &FirstCandidate)
            .unwrap()
            .produced();

        assert_eq!(ctx.data().get_as::<TimeData>(&source).unwrap().len(), 10);
        assert_eq!(ctx.data().get_as::<TimeData>(&produced[0]).unwrap().len(), 3);
    }

    #[test]
    fn test_show_returns_plot_series() {
        let mut ctx = context();
        let mut params = ParamMap::new();
        params.insert("duration".to_string(), Binding::literal(1.0));
        params.insert("fs".to_string(), Binding::literal(10));
        construct(&mut ctx, params);

        let invocation = ctx
            .invoke(
                None,
                &ShowTimeDataAction,
                "show",
                &ParamMap::new(),
                &FirstCandidate,
            )
            .unwrap();
        let Invocation::Opaque(value) = invocation else {
            panic!("expected opaque output");
        };
        let series = downcast::<Vec<PlotSeries>>(value).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].label, "Generated signal [-]");
        assert_eq!(series[0].y.len(), 10);
    }

    #[test]
    fn test_load_action_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("acc.txt");
        fs::write(&file, "# header\n1.0 2.0\n3.5\n\n").unwrap();

        let mut ctx = context();
        let mut params = ParamMap::new();
        params.insert(
            "fpaths".to_string(),
            Binding::literal(json!([file.to_string_lossy()])),
        );
        params.insert("dt".to_string(), Binding::literal(0.01));
        let produced = ctx
            .invoke(None, &LoadAction, "load", &params, &FirstCandidate)
            .unwrap()
            .produced();

        let channel = ctx.data().get_as::<TimeData>(&produced[0]).unwrap();
        assert_eq!(channel.name(), "acc");
        assert_eq!(channel.y, vec![1.0, 2.0, 3.5]);
    }

    #[test]
    fn test_fill_fpaths_expands_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "1").unwrap();
        fs::write(dir.path().join("a.txt"), "1").unwrap();
        let request = TaskRequest {
            action_type: LoadAction::TYPE_PATH.to_string(),
            param: "fpaths".to_string(),
            label: "Select files".to_string(),
            current: Some(Binding::literal(dir.path().to_string_lossy().into_owned())),
            schema: Value::Null,
        };

        let TaskOutcome::Resolved(Binding::Literal(Value::Array(files))) =
            FillFpathsTask.run(&request).unwrap()
        else {
            panic!("expected a file list");
        };
        assert_eq!(files.len(), 2);
        assert!(files[0].as_str().unwrap().ends_with("a.txt"));

        let nothing = TaskRequest {
            current: None,
            ..request
        };
        assert_eq!(FillFpathsTask.run(&nothing).unwrap(), TaskOutcome::Cancelled);
    }
}
