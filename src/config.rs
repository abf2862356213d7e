//! Model configuration.
//!
//! Field names match the `config.json` files written next to trained weights,
//! so a checkpoint directory can be loaded without any key mapping.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Activation applied to offset logits.
///
/// - `Tanh`: `tanh(o) * 0.5`
/// - `Sigmoid`: `sigmoid(o) - 0.5`
///
/// Both map into `[-0.5, 0.5]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetActivation {
    Sigmoid,
    #[default]
    Tanh,
}

impl OffsetActivation {
    /// Bias fill for the output projection when weights are created fresh.
    pub fn output_bias_init(self) -> f64 {
        match self {
            OffsetActivation::Tanh => 0.0,
            OffsetActivation::Sigmoid => 0.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OffsetActivation::Sigmoid => "sigmoid",
            OffsetActivation::Tanh => "tanh",
        }
    }
}

impl FromStr for OffsetActivation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sigmoid" => Ok(OffsetActivation::Sigmoid),
            "tanh" => Ok(OffsetActivation::Tanh),
            other => Err(Error::UnsupportedActivation(other.to_string())),
        }
    }
}

impl std::fmt::Display for OffsetActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How conditioning parameters enter a density model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParamInjection {
    /// Parameters projected to one extra time step, prepended to the sequence.
    #[default]
    #[serde(rename = "1d")]
    OneD,
    /// Parameters broadcast over time and concatenated on the feature axis.
    #[serde(rename = "2d")]
    TwoD,
}

/// Hyperparameters of the generative decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    pub latent_dim: usize,
    pub d_model: usize,
    pub num_decoder_layers: usize,
    pub nhead: usize,
    pub dim_feedforward: usize,
    pub output_max_len: usize,
    /// `3 * voices`.
    pub output_embedding_size: usize,
    pub dropout: f32,
    pub o_activation: OffsetActivation,
    /// Uniform init range for fresh projection weights.
    pub init_range: f64,
}

impl DecoderConfig {
    /// Number of voices (instrument channels).
    pub fn voices(&self) -> usize {
        self.output_embedding_size / 3
    }

    pub fn validate(&self) -> Result<()> {
        check_embedding_size("output_embedding_size", self.output_embedding_size)?;
        check_heads(self.d_model, self.nhead)?;
        check_nonzero("latent_dim", self.latent_dim)?;
        check_nonzero("output_max_len", self.output_max_len)?;
        check_nonzero("dim_feedforward", self.dim_feedforward)?;
        check_dropout(self.dropout)
    }
}

/// Configuration of the complete groove VAE (encoder + latent + decoder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrooveVaeConfig {
    #[serde(default = "default_d_model_enc")]
    pub d_model_enc: usize,
    #[serde(default = "default_d_model_dec")]
    pub d_model_dec: usize,

    /// Input feature width (`3 * voices`).
    #[serde(default = "default_embedding_size")]
    pub embedding_size_src: usize,
    /// Output feature width (`3 * voices`).
    #[serde(default = "default_embedding_size")]
    pub embedding_size_tgt: usize,

    #[serde(default = "default_nhead")]
    pub nhead_enc: usize,
    #[serde(default = "default_nhead")]
    pub nhead_dec: usize,

    #[serde(default = "default_dim_feedforward")]
    pub dim_feedforward_enc: usize,
    #[serde(default = "default_dim_feedforward")]
    pub dim_feedforward_dec: usize,

    #[serde(default = "default_num_layers")]
    pub num_encoder_layers: usize,
    #[serde(default = "default_num_layers")]
    pub num_decoder_layers: usize,

    #[serde(default = "default_dropout")]
    pub dropout: f32,

    #[serde(default = "default_latent_dim")]
    pub latent_dim: usize,

    /// Time steps seen by the encoder.
    #[serde(default = "default_max_len")]
    pub max_len_enc: usize,
    /// Time steps produced by the decoder.
    #[serde(default = "default_max_len")]
    pub max_len_dec: usize,

    #[serde(default)]
    pub o_activation: OffsetActivation,

    #[serde(default = "default_init_range")]
    pub init_range: f64,
}

impl Default for GrooveVaeConfig {
    fn default() -> Self {
        Self {
            d_model_enc: default_d_model_enc(),
            d_model_dec: default_d_model_dec(),
            embedding_size_src: default_embedding_size(),
            embedding_size_tgt: default_embedding_size(),
            nhead_enc: default_nhead(),
            nhead_dec: default_nhead(),
            dim_feedforward_enc: default_dim_feedforward(),
            dim_feedforward_dec: default_dim_feedforward(),
            num_encoder_layers: default_num_layers(),
            num_decoder_layers: default_num_layers(),
            dropout: default_dropout(),
            latent_dim: default_latent_dim(),
            max_len_enc: default_max_len(),
            max_len_dec: default_max_len(),
            o_activation: OffsetActivation::default(),
            init_range: default_init_range(),
        }
    }
}

impl GrooveVaeConfig {
    /// Read a JSON config file; missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Decoder half of this configuration.
    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            latent_dim: self.latent_dim,
            d_model: self.d_model_dec,
            num_decoder_layers: self.num_decoder_layers,
            nhead: self.nhead_dec,
            dim_feedforward: self.dim_feedforward_dec,
            output_max_len: self.max_len_dec,
            output_embedding_size: self.embedding_size_tgt,
            dropout: self.dropout,
            o_activation: self.o_activation,
            init_range: self.init_range,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_embedding_size("embedding_size_src", self.embedding_size_src)?;
        check_heads(self.d_model_enc, self.nhead_enc)?;
        check_nonzero("max_len_enc", self.max_len_enc)?;
        check_nonzero("dim_feedforward_enc", self.dim_feedforward_enc)?;
        self.decoder_config().validate()
    }
}

/// Configuration of a parameter-conditioned density VAE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityVaeConfig {
    #[serde(flatten)]
    pub base: GrooveVaeConfig,

    /// Width of the conditioning vector.
    #[serde(default = "default_n_params")]
    pub n_params: usize,

    #[serde(default)]
    pub param_injection: ParamInjection,
}

impl Default for DensityVaeConfig {
    fn default() -> Self {
        Self {
            base: GrooveVaeConfig::default(),
            n_params: default_n_params(),
            param_injection: ParamInjection::default(),
        }
    }
}

impl DensityVaeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<()> {
        check_nonzero("n_params", self.n_params)?;
        self.base.validate()
    }
}

/// Configuration of the plain (non-variational) groove transformer.
///
/// Maps an event tensor straight to hit / velocity / offset logits of the
/// same length, without a latent bottleneck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrooveTransformerConfig {
    #[serde(default = "default_d_model_enc")]
    pub d_model: usize,
    #[serde(default = "default_embedding_size")]
    pub embedding_size_src: usize,
    #[serde(default = "default_embedding_size")]
    pub embedding_size_tgt: usize,
    #[serde(default = "default_nhead")]
    pub nhead: usize,
    #[serde(default = "default_dim_feedforward")]
    pub dim_feedforward: usize,
    #[serde(default = "default_dropout")]
    pub dropout: f32,
    #[serde(default = "default_num_layers")]
    pub num_encoder_layers: usize,
    #[serde(default = "default_max_len")]
    pub max_len: usize,
    #[serde(default)]
    pub o_activation: OffsetActivation,
    #[serde(default = "default_init_range")]
    pub init_range: f64,
}

impl Default for GrooveTransformerConfig {
    fn default() -> Self {
        Self {
            d_model: default_d_model_enc(),
            embedding_size_src: default_embedding_size(),
            embedding_size_tgt: default_embedding_size(),
            nhead: default_nhead(),
            dim_feedforward: default_dim_feedforward(),
            dropout: default_dropout(),
            num_encoder_layers: default_num_layers(),
            max_len: default_max_len(),
            o_activation: OffsetActivation::default(),
            init_range: default_init_range(),
        }
    }
}

impl GrooveTransformerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<()> {
        check_embedding_size("embedding_size_src", self.embedding_size_src)?;
        check_embedding_size("embedding_size_tgt", self.embedding_size_tgt)?;
        check_heads(self.d_model, self.nhead)?;
        check_nonzero("max_len", self.max_len)?;
        check_nonzero("dim_feedforward", self.dim_feedforward)?;
        check_dropout(self.dropout)
    }
}

fn check_embedding_size(name: &str, size: usize) -> Result<()> {
    if size == 0 || size % 3 != 0 {
        return Err(Error::Config(format!(
            "{name} must be a positive multiple of 3 (hit/velocity/offset per voice), got {size}"
        )));
    }
    Ok(())
}

fn check_heads(d_model: usize, nhead: usize) -> Result<()> {
    if nhead == 0 || d_model == 0 || d_model % nhead != 0 {
        return Err(Error::Config(format!(
            "d_model ({d_model}) must be divisible by nhead ({nhead})"
        )));
    }
    Ok(())
}

fn check_nonzero(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(Error::Config(format!("{name} must be > 0")));
    }
    Ok(())
}

fn check_dropout(p: f32) -> Result<()> {
    if !(0.0..1.0).contains(&p) {
        return Err(Error::Config(format!("dropout must be in [0, 1), got {p}")));
    }
    Ok(())
}

fn default_d_model_enc() -> usize {
    128
}
fn default_d_model_dec() -> usize {
    128
}
fn default_embedding_size() -> usize {
    27
}
fn default_nhead() -> usize {
    4
}
fn default_dim_feedforward() -> usize {
    512
}
fn default_num_layers() -> usize {
    3
}
fn default_dropout() -> f32 {
    0.1
}
fn default_latent_dim() -> usize {
    128
}
fn default_max_len() -> usize {
    32
}
fn default_init_range() -> f64 {
    crate::model::init::DEFAULT_INIT_RANGE
}
fn default_n_params() -> usize {
    1
}
