//! Turning hit probabilities into discrete hits.
//!
//! Two families:
//!
//! - [`hits_activation`]: one global rule for every voice, either a fixed
//!   threshold or comparison against uniform noise.
//! - [`select_hits`]: per-voice density budget. Each voice keeps at most
//!   `voice_max_count_allowed[voice]` hits, chosen by [`SamplingMode`]:
//!   - `TopK`: the highest-probability steps, kept only above the voice threshold.
//!   - `Bernoulli`: Bernoulli draws from the probabilities; among the
//!     successful steps the highest-probability ones are kept. No threshold.
//!
//! Selection runs independently for every batch item.

use candle_core::{DType, Device, Tensor};

use crate::config::OffsetActivation;
use crate::noise::NoiseSource;
use crate::{Error, Result};

/// Per-voice hit selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingMode {
    /// Top-k by probability, then threshold.
    #[default]
    TopK,
    /// Bernoulli draws, then top-k by probability among successes.
    Bernoulli,
}

impl SamplingMode {
    pub fn index(self) -> i64 {
        match self {
            SamplingMode::TopK => 0,
            SamplingMode::Bernoulli => 1,
        }
    }
}

impl TryFrom<i64> for SamplingMode {
    type Error = Error;

    fn try_from(mode: i64) -> Result<Self> {
        match mode {
            0 => Ok(SamplingMode::TopK),
            1 => Ok(SamplingMode::Bernoulli),
            other => Err(Error::UnsupportedSamplingMode(other)),
        }
    }
}

/// Arguments of [`VaeDecoder::sample`](super::decoder::VaeDecoder::sample).
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// Minimum probability for a top-k hit, one per voice. Unused by `Bernoulli`.
    pub voice_thresholds: Vec<f32>,
    /// Hit budget per voice over the whole pattern.
    pub voice_max_count_allowed: Vec<usize>,
    pub mode: SamplingMode,
    /// Hit logits are divided by this before the sigmoid.
    pub temperature: f64,
}

impl SamplingParams {
    /// Same threshold and budget for every voice.
    pub fn uniform(voices: usize, threshold: f32, max_count: usize, mode: SamplingMode) -> Self {
        Self {
            voice_thresholds: vec![threshold; voices],
            voice_max_count_allowed: vec![max_count; voices],
            mode,
            temperature: 1.0,
        }
    }

    pub fn validate(&self, voices: usize) -> Result<()> {
        if self.voice_thresholds.len() != voices {
            return Err(Error::InvalidArgument(format!(
                "expected {voices} voice thresholds, got {}",
                self.voice_thresholds.len()
            )));
        }
        if self.voice_max_count_allowed.len() != voices {
            return Err(Error::InvalidArgument(format!(
                "expected {voices} voice hit budgets, got {}",
                self.voice_max_count_allowed.len()
            )));
        }
        if self.temperature.is_nan() || self.temperature <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "temperature must be > 0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Sigmoid hit probabilities → {0, 1}.
///
/// With `use_thres`, a step is a hit when its probability exceeds `threshold`.
/// Otherwise each entry is compared against its own `U[0, 1)` draw.
pub fn hits_activation(
    h_logits: &Tensor,
    use_thres: bool,
    threshold: f64,
    noise: &mut NoiseSource,
) -> Result<Tensor> {
    let probs = candle_nn::ops::sigmoid(h_logits)?;
    let hits = if use_thres {
        probs.gt(threshold)?
    } else {
        let u = noise.uniform(probs.dims(), probs.dtype(), probs.device())?;
        probs.gt(&u)?
    };
    Ok(hits.to_dtype(h_logits.dtype())?)
}

/// Velocity logits → [0, 1].
pub fn velocity_activation(v_logits: &Tensor) -> Result<Tensor> {
    Ok(candle_nn::ops::sigmoid(v_logits)?)
}

/// Offset logits → [-0.5, 0.5].
pub fn offset_activation(o_logits: &Tensor, activation: OffsetActivation) -> Result<Tensor> {
    let o = match activation {
        OffsetActivation::Tanh => (o_logits.tanh()? * 0.5)?,
        OffsetActivation::Sigmoid => (candle_nn::ops::sigmoid(o_logits)? - 0.5)?,
    };
    Ok(o)
}

/// Temperature-scaled sigmoid: `1 / (1 + exp(-logits / temperature))`.
pub fn hit_probabilities(h_logits: &Tensor, temperature: f64) -> Result<Tensor> {
    Ok(candle_nn::ops::sigmoid(&(h_logits / temperature)?)?)
}

/// Apply the per-voice budget to `probs` `[B, T, voices]`.
///
/// Returns a {0, 1} tensor of the same shape, dtype and device.
pub fn select_hits(
    probs: &Tensor,
    params: &SamplingParams,
    noise: &mut NoiseSource,
) -> Result<Tensor> {
    let (batch, steps, voices) = probs.dims3()?;
    params.validate(voices)?;

    let values: Vec<Vec<Vec<f32>>> = probs
        .to_device(&Device::Cpu)?
        .to_dtype(DType::F32)?
        .to_vec3()?;

    let mut hits = vec![0f32; batch * steps * voices];
    for (b, pattern) in values.iter().enumerate() {
        for voice in 0..voices {
            let column: Vec<f32> = pattern.iter().map(|step| step[voice]).collect();
            let max_count = params.voice_max_count_allowed[voice];
            let chosen = match params.mode {
                SamplingMode::TopK => {
                    top_k_above_threshold(&column, max_count, params.voice_thresholds[voice])
                }
                SamplingMode::Bernoulli => bernoulli_top_k(&column, max_count, noise),
            };
            for t in chosen {
                hits[(b * steps + t) * voices + voice] = 1.0;
            }
        }
    }
    tracing::debug!(
        mode = ?params.mode,
        total_hits = hits.iter().filter(|&&h| h > 0.0).count(),
        "selected hits"
    );

    Ok(Tensor::from_vec(hits, (batch, steps, voices), &Device::Cpu)?
        .to_dtype(probs.dtype())?
        .to_device(probs.device())?)
}

/// Step indices of the `k` largest values, highest first. Ties keep the
/// earlier step. `k` larger than the column keeps every step.
fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    order.truncate(k);
    order
}

/// Mode 0: the `max_count` most probable steps, kept when above `threshold`.
fn top_k_above_threshold(probs: &[f32], max_count: usize, threshold: f32) -> Vec<usize> {
    top_k_indices(probs, max_count)
        .into_iter()
        .filter(|&t| probs[t] > threshold)
        .collect()
}

/// Mode 1: Bernoulli draw per step, then the `max_count` most probable
/// successful steps.
fn bernoulli_top_k(probs: &[f32], max_count: usize, noise: &mut NoiseSource) -> Vec<usize> {
    let weighted: Vec<f32> = probs
        .iter()
        .map(|&p| if noise.bernoulli(p) { p } else { 0.0 })
        .collect();
    top_k_indices(&weighted, max_count)
        .into_iter()
        .filter(|&t| weighted[t] > 0.0)
        .collect()
}
