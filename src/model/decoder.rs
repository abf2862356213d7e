//! Generative head of the VAE.
//!
//! ```text
//! z [B, latent_dim]
//!   → DecoderInput      [B, max_len, d_model]
//!   → TransformerStack  [B, max_len, d_model]   (non-causal)
//!   → OutputLayer       (h, v, o) logits, each [B, max_len, voices]
//! ```
//!
//! [`VaeDecoder::forward`] stops at the logits so callers pick the activation
//! (loss computation vs. sampling). [`VaeDecoder::decode`] and
//! [`VaeDecoder::sample`] are the inference entry points.

use candle_core::{D, Module, Tensor};
use candle_nn::VarBuilder;

use super::latent::DecoderInput;
use super::output::{Hvo, HvoLogits, OutputLayer};
use super::sampling::{self, SamplingParams};
use super::transformer::TransformerStack;
use crate::config::{DecoderConfig, OffsetActivation};
use crate::noise::NoiseSource;
use crate::Result;

/// Sampled pattern plus the temperature-scaled hit probabilities it came from.
#[derive(Debug, Clone)]
pub struct SampledHvo {
    pub hvo: Hvo,
    /// `[B, T, voices]`, before any selection.
    pub hit_probabilities: Tensor,
}

#[derive(Debug, Clone)]
pub struct VaeDecoder {
    input: DecoderInput,
    backbone: TransformerStack,
    output: OutputLayer,
    o_activation: OffsetActivation,
    latent_dim: usize,
}

impl VaeDecoder {
    pub fn new(cfg: &DecoderConfig, vb: VarBuilder) -> Result<Self> {
        cfg.validate()?;
        let input = DecoderInput::new(
            cfg.output_max_len,
            cfg.latent_dim,
            cfg.d_model,
            cfg.init_range,
            vb.pp("input"),
        )?;
        let backbone = TransformerStack::new(
            cfg.d_model,
            cfg.nhead,
            cfg.dim_feedforward,
            cfg.num_decoder_layers,
            cfg.dropout,
            vb.pp("backbone"),
        )?;
        let output = OutputLayer::new(
            cfg.output_embedding_size,
            cfg.d_model,
            cfg.o_activation,
            cfg.init_range,
            vb.pp("output"),
        )?;
        Ok(Self {
            input,
            backbone,
            output,
            o_activation: cfg.o_activation,
            latent_dim: cfg.latent_dim,
        })
    }

    pub fn o_activation(&self) -> OffsetActivation {
        self.o_activation
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    pub fn voices(&self) -> usize {
        self.output.voices()
    }

    /// Inference-mode logits for `z` `[B, latent_dim]`.
    pub fn forward(&self, z: &Tensor) -> Result<HvoLogits> {
        self.forward_t(z, false)
    }

    /// Logits with dropout active when `train` is set.
    pub fn forward_t(&self, z: &Tensor, train: bool) -> Result<HvoLogits> {
        let h = self.input.forward(z)?;
        let h = self.backbone.forward_t(&h, train)?;
        Ok(self.output.forward(&h)?)
    }

    /// Logits → (h, v, o).
    ///
    /// Hits are `sigmoid(h) > threshold` with `use_thres`, otherwise compared
    /// against uniform noise per entry. Results are detached from the graph.
    pub fn decode(
        &self,
        z: &Tensor,
        threshold: f64,
        use_thres: bool,
        noise: &mut NoiseSource,
    ) -> Result<Hvo> {
        let logits = self.forward(z)?;
        let hits = sampling::hits_activation(&logits.hits, use_thres, threshold, noise)?;
        let (velocities, offsets) = self.continuous_channels(&logits)?;
        Ok(Hvo {
            hits: hits.detach(),
            velocities,
            offsets,
        })
    }

    /// [`decode`](Self::decode) as one `[B, T, 3 * voices]` tensor.
    pub fn decode_and_return_concatenated(
        &self,
        z: &Tensor,
        threshold: f64,
        use_thres: bool,
        noise: &mut NoiseSource,
    ) -> Result<Tensor> {
        Ok(self.decode(z, threshold, use_thres, noise)?.concatenated()?)
    }

    /// Logits → (h, v, o) under a per-voice hit budget.
    ///
    /// See [`sampling::select_hits`] for the two selection modes.
    pub fn sample(
        &self,
        z: &Tensor,
        params: &SamplingParams,
        noise: &mut NoiseSource,
    ) -> Result<SampledHvo> {
        params.validate(self.voices())?;
        let logits = self.forward(z)?;
        let probs = sampling::hit_probabilities(&logits.hits, params.temperature)?.detach();
        let hits = sampling::select_hits(&probs, params, noise)?;
        let (velocities, offsets) = self.continuous_channels(&logits)?;
        tracing::debug!(
            batch = z.dim(0)?,
            mode = params.mode.index(),
            temperature = params.temperature,
            "sampled patterns"
        );
        Ok(SampledHvo {
            hvo: Hvo {
                hits,
                velocities,
                offsets,
            },
            hit_probabilities: probs,
        })
    }

    /// [`sample`](Self::sample) with (h, v, o) concatenated on the feature axis.
    pub fn sample_and_return_concatenated(
        &self,
        z: &Tensor,
        params: &SamplingParams,
        noise: &mut NoiseSource,
    ) -> Result<(Tensor, Tensor)> {
        let sampled = self.sample(z, params, noise)?;
        let hvo = Tensor::cat(
            &[
                &sampled.hvo.hits,
                &sampled.hvo.velocities,
                &sampled.hvo.offsets,
            ],
            D::Minus1,
        )?;
        Ok((hvo, sampled.hit_probabilities))
    }

    fn continuous_channels(&self, logits: &HvoLogits) -> Result<(Tensor, Tensor)> {
        let velocities = sampling::velocity_activation(&logits.velocities)?.detach();
        let offsets = sampling::offset_activation(&logits.offsets, self.o_activation)?.detach();
        Ok((velocities, offsets))
    }
}
