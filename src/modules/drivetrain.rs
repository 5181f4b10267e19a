//! Rolling-element bearings and their characteristic frequencies.

use serde::{Deserialize, Serialize};

use super::timedata::ShowTimeDataAction;
use crate::node::{
    Action, ActionKind, ActionOutput, Args, DataNode, NodeBase, Param, ParamKind, Signature,
};
use crate::registry::{ActionType, TypeRegistry, PLUGINS};

pub const BALL_BEARING: &str = "dac.modules.drivetrain.BallBearing";

/// Time data plot plus the bearing's characteristic frequencies
pub const SHOW_TIME_DATA_WITH_FREQ_LINES: &str =
    "dac.modules.drivetrain.ShowTimeDataWithFreqLines";

/// Geometry of a ball bearing; diameters share one length unit and the
/// contact angle is in degrees.
#[derive(Debug, Clone, DataNode)]
#[data_node(path = "dac.modules.drivetrain.BallBearing", parent = "dac.core.data.DataBase")]
pub struct BallBearing {
    pub base: NodeBase,
    pub n_balls: u32,
    pub d_ball: f64,
    pub d_pitch: f64,
    pub beta: f64,
}

impl Default for BallBearing {
    fn default() -> Self {
        Self {
            base: NodeBase::default(),
            n_balls: 8,
            d_ball: 2.0,
            d_pitch: 12.0,
            beta: 15.0,
        }
    }
}

impl BallBearing {
    fn ratio(&self) -> f64 {
        self.d_ball / self.d_pitch * self.beta.to_radians().cos()
    }

    /// Ball pass frequency, outer race, as orders of shaft speed
    pub fn bpfo(&self) -> f64 {
        self.n_balls as f64 / 2.0 * (1.0 - self.ratio())
    }

    /// Ball pass frequency, inner race
    pub fn bpfi(&self) -> f64 {
        self.n_balls as f64 / 2.0 * (1.0 + self.ratio())
    }

    /// Ball spin frequency
    pub fn bsf(&self) -> f64 {
        let ratio = self.ratio();
        self.d_pitch / (2.0 * self.d_ball) * (1.0 - ratio * ratio)
    }

    /// Fundamental train (cage) frequency
    pub fn ftf(&self) -> f64 {
        0.5 * (1.0 - self.ratio())
    }
}

#[derive(Debug, Default)]
pub struct CreateBearing;

impl Action for CreateBearing {
    fn caption(&self) -> &str {
        "Make a bearing"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .param(Param::new("name", ParamKind::Str).with_default("Bearing"))
            .param(Param::new("n_balls", ParamKind::Int).with_default(8))
            .param(Param::new("d_ball", ParamKind::Float).with_default(2.0))
            .param(Param::new("d_pitch", ParamKind::Float).with_default(12.0))
            .param(Param::new("beta", ParamKind::Float).with_default(15.0))
            .output(BALL_BEARING)
    }

    fn call(&self, args: &Args<'_>) -> anyhow::Result<ActionOutput> {
        let d_ball: f64 = args.literal("d_ball")?;
        let d_pitch: f64 = args.literal("d_pitch")?;
        if d_ball <= 0.0 || d_pitch <= d_ball {
            anyhow::bail!(
                "pitch diameter {} must exceed ball diameter {} > 0",
                d_pitch,
                d_ball
            );
        }
        Ok(ActionOutput::node(BallBearing {
            base: NodeBase::new(args.literal::<String>("name")?),
            n_balls: args.literal("n_balls")?,
            d_ball,
            d_pitch,
            beta: args.literal("beta")?,
        }))
    }
}

impl ActionKind for CreateBearing {
    const TYPE_PATH: &'static str = "dac.modules.drivetrain.CreateBearing";
}

/// Characteristic frequencies in Hz at a given shaft speed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BearingFrequencies {
    pub bearing: String,
    pub speed: f64,
    pub bpfo: f64,
    pub bpfi: f64,
    pub bsf: f64,
    pub ftf: f64,
}

#[derive(Debug, Default)]
pub struct BearingFrequenciesAction;

impl Action for BearingFrequenciesAction {
    fn caption(&self) -> &str {
        "Bearing frequencies"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .param(Param::data("bearing", BALL_BEARING))
            .param(
                Param::new("speed", ParamKind::Float)
                    .with_default(1.0)
                    .describe("shaft speed in Hz"),
            )
    }

    fn call(&self, args: &Args<'_>) -> anyhow::Result<ActionOutput> {
        let bearing = args.node::<BallBearing>("bearing")?;
        let speed: f64 = args.literal("speed")?;
        Ok(ActionOutput::opaque(BearingFrequencies {
            bearing: bearing.name().to_string(),
            speed,
            bpfo: bearing.bpfo() * speed,
            bpfi: bearing.bpfi() * speed,
            bsf: bearing.bsf() * speed,
            ftf: bearing.ftf() * speed,
        }))
    }
}

impl ActionKind for BearingFrequenciesAction {
    const TYPE_PATH: &'static str = "dac.modules.drivetrain.BearingFrequenciesAction";
}

#[linkme::distributed_slice(PLUGINS)]
static REGISTER_DRIVETRAIN: fn(&mut TypeRegistry) = register;

fn register(registry: &mut TypeRegistry) {
    registry.register_data::<BallBearing>();
    registry.register_action::<CreateBearing>();
    registry.register_action::<BearingFrequenciesAction>();
    registry.register_action_type(ActionType::sequence(
        SHOW_TIME_DATA_WITH_FREQ_LINES,
        "Show time data with bearing frequencies",
        vec![
            ActionType::of::<ShowTimeDataAction>(),
            ActionType::of::<BearingFrequenciesAction>(),
        ],
    ));
}
