//! Frequency-domain data and the transform that produces it.

use anyhow::bail;
use std::f64::consts::PI;

use super::timedata::{TimeData, TIME_DATA};
use crate::node::{
    Action, ActionKind, ActionOutput, Args, DataNode, NodeBase, Param, ParamKind, Signature,
};
use crate::registry::{TypeRegistry, PLUGINS};

pub const FREQ_DOMAIN_DATA: &str = "dac.modules.nvh.FreqDomainData";

/// Single-sided amplitude spectrum on an equidistant frequency axis
#[derive(Debug, Clone, DataNode)]
#[data_node(path = "dac.modules.nvh.FreqDomainData", parent = "dac.core.data.DataBase")]
pub struct FreqDomainData {
    pub base: NodeBase,
    #[construct(skip)]
    pub y: Vec<f64>,
    /// Frequency resolution in Hz
    pub df: f64,
    pub y_unit: String,
}

impl Default for FreqDomainData {
    fn default() -> Self {
        Self {
            base: NodeBase::default(),
            y: Vec::new(),
            df: 1.0,
            y_unit: "-".to_string(),
        }
    }
}

impl FreqDomainData {
    pub fn f(&self) -> Vec<f64> {
        (0..self.y.len()).map(|i| i as f64 * self.df).collect()
    }

    /// Frequency of the largest line, skipping DC
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.y
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, amp)| (i as f64 * self.df, *amp))
    }
}

const WINDOWS: [&str; 3] = ["uniform", "hanning", "hamming"];

fn window(name: &str, n: usize) -> anyhow::Result<Vec<f64>> {
    let denom = n.saturating_sub(1).max(1) as f64;
    let w = match name {
        "uniform" => vec![1.0; n],
        "hanning" => (0..n)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / denom).cos())
            .collect(),
        "hamming" => (0..n)
            .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / denom).cos())
            .collect(),
        other => bail!("unknown window '{}'", other),
    };
    Ok(w)
}

/// Amplitude-corrected single-sided DFT
fn spectrum(samples: &[f64], window: &[f64]) -> Vec<f64> {
    let n = samples.len();
    let gain: f64 = window.iter().sum::<f64>() / n as f64;
    let lines = n / 2 + 1;
    (0..lines)
        .map(|k| {
            let (mut re, mut im) = (0.0, 0.0);
            for (i, (x, w)) in samples.iter().zip(window).enumerate() {
                let phi = 2.0 * PI * (k * i) as f64 / n as f64;
                re += x * w * phi.cos();
                im -= x * w * phi.sin();
            }
            let amp = (re * re + im * im).sqrt() / (n as f64 * gain);
            if k == 0 || (n % 2 == 0 && k == n / 2) {
                amp
            } else {
                2.0 * amp
            }
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct ToFrequencyDomainAction;

impl Action for ToFrequencyDomainAction {
    fn caption(&self) -> &str {
        "Simple FFT to frequency domain"
    }

    fn signature(&self) -> Signature {
        Signature::new()
            .param(Param::data("channel", TIME_DATA))
            .param(
                Param::new(
                    "window",
                    ParamKind::Enum(WINDOWS.iter().map(|w| w.to_string()).collect()),
                )
                .with_default("uniform"),
            )
            .output(FREQ_DOMAIN_DATA)
    }

    fn call(&self, args: &Args<'_>) -> anyhow::Result<ActionOutput> {
        let channel = args.node::<TimeData>("channel")?;
        let window_name: String = args.literal("window")?;
        if channel.is_empty() {
            bail!("channel '{}' has no samples", channel.name());
        }

        let w = window(&window_name, channel.len())?;
        let freq = FreqDomainData {
            base: NodeBase::new(format!("{} spectrum", channel.name())),
            y: spectrum(&channel.y, &w),
            df: 1.0 / (channel.len() as f64 * channel.dt),
            y_unit: channel.y_unit.clone(),
        };
        Ok(ActionOutput::node(freq))
    }
}

impl ActionKind for ToFrequencyDomainAction {
    const TYPE_PATH: &'static str = "dac.modules.nvh.ToFrequencyDomainAction";
}

#[linkme::distributed_slice(PLUGINS)]
static REGISTER_NVH: fn(&mut TypeRegistry) = register;

fn register(registry: &mut TypeRegistry) {
    registry.register_data::<FreqDomainData>();
    registry.register_action::<ToFrequencyDomainAction>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spectrum_amplitude_of_cosine() {
        let n = 64;
        let samples: Vec<f64> = (0..n)
            .map(|i| 1.0 + 3.0 * (2.0 * PI * 4.0 * i as f64 / n as f64).cos())
            .collect();
        let amps = spectrum(&samples, &window("uniform", n).unwrap());
        assert_eq!(amps.len(), n / 2 + 1);
        assert!((amps[0] - 1.0).abs() < 1e-9);
        assert!((amps[4] - 3.0).abs() < 1e-9);
        assert!(amps[5].abs() < 1e-9);
    }

    #[test]
    fn test_window_shapes() {
        let hann = window("hanning", 5).unwrap();
        assert!(hann[0].abs() < 1e-12);
        assert!((hann[2] - 1.0).abs() < 1e-12);
        let hamming = window("hamming", 5).unwrap();
        assert!((hamming[0] - 0.08).abs() < 1e-12);
        assert!(window("kaiser", 5).is_err());
    }

    #[test]
    fn test_peak_skips_dc() {
        let spectrum = FreqDomainData {
            y: vec![10.0, 1.0, 4.0, 2.0],
            df: 0.5,
            ..FreqDomainData::default()
        };
        assert_eq!(spectrum.peak(), Some((1.0, 4.0)));
    }
}
