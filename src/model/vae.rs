//! Unconditioned groove VAE: encoder, latent bottleneck and decoder.

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};

use super::decoder::VaeDecoder;
use super::input::{InputDims, InputKind, InputLayer, check_events};
use super::latent::{LatentLayer, LatentOutput};
use super::output::{Hvo, HvoLogits};
use super::transformer::TransformerStack;
use crate::config::GrooveVaeConfig;
use crate::noise::NoiseSource;
use crate::Result;

/// Reconstruction logits plus the posterior they were decoded from.
#[derive(Debug, Clone)]
pub struct VaeOutput {
    pub logits: HvoLogits,
    pub latent: LatentOutput,
}

/// Encoder half shared by the groove and density models.
#[derive(Debug, Clone)]
pub(crate) struct Encoder {
    input: InputLayer,
    backbone: TransformerStack,
    latent: LatentLayer,
    max_len: usize,
    embedding_size: usize,
}

impl Encoder {
    pub(crate) fn new(
        cfg: &GrooveVaeConfig,
        kind: InputKind,
        device: &Device,
        vb: &VarBuilder,
    ) -> Result<Self> {
        let input = InputLayer::new(
            kind,
            InputDims {
                embedding_size: cfg.embedding_size_src,
                d_model: cfg.d_model_enc,
                max_len: cfg.max_len_enc,
                dropout: cfg.dropout,
                init_range: cfg.init_range,
            },
            device,
            vb.pp("input"),
        )?;
        let backbone = TransformerStack::new(
            cfg.d_model_enc,
            cfg.nhead_enc,
            cfg.dim_feedforward_enc,
            cfg.num_encoder_layers,
            cfg.dropout,
            vb.pp("encoder"),
        )?;
        let latent = LatentLayer::new(
            input.sequence_len(),
            cfg.d_model_enc,
            cfg.latent_dim,
            cfg.init_range,
            vb.pp("latent"),
        )?;
        Ok(Self {
            input,
            backbone,
            latent,
            max_len: cfg.max_len_enc,
            embedding_size: cfg.embedding_size_src,
        })
    }

    pub(crate) fn forward_t(
        &self,
        src: &Tensor,
        params: Option<&Tensor>,
        train: bool,
        noise: &mut NoiseSource,
    ) -> Result<LatentOutput> {
        check_events(src, self.max_len, self.embedding_size)?;
        let x = self.input.forward_t(src, params, train)?;
        let x = self.backbone.forward_t(&x, train)?;
        Ok(self.latent.forward(&x, noise)?)
    }
}

#[derive(Debug, Clone)]
pub struct GrooveVae {
    encoder: Encoder,
    decoder: VaeDecoder,
    config: GrooveVaeConfig,
}

impl GrooveVae {
    pub fn new(config: &GrooveVaeConfig, device: &Device, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let encoder = Encoder::new(config, InputKind::Plain, device, &vb)?;
        let decoder = VaeDecoder::new(&config.decoder_config(), vb.pp("decoder"))?;
        Ok(Self {
            encoder,
            decoder,
            config: config.clone(),
        })
    }

    /// Freshly initialized model plus the [`VarMap`] owning its weights.
    pub fn fresh(config: &GrooveVaeConfig, device: &Device) -> Result<(Self, VarMap)> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Self::new(config, device, vb)?;
        Ok((model, varmap))
    }

    pub fn config(&self) -> &GrooveVaeConfig {
        &self.config
    }

    pub fn decoder(&self) -> &VaeDecoder {
        &self.decoder
    }

    /// `src` `[B, max_len_enc, embedding_size_src]` → reconstruction logits.
    pub fn forward_t(&self, src: &Tensor, train: bool, noise: &mut NoiseSource) -> Result<VaeOutput> {
        let latent = self.encoder.forward_t(src, None, train, noise)?;
        let logits = self.decoder.forward_t(&latent.z, train)?;
        Ok(VaeOutput { logits, latent })
    }

    /// Posterior for `src` in inference mode, detached.
    pub fn encode(&self, src: &Tensor, noise: &mut NoiseSource) -> Result<LatentOutput> {
        Ok(self.encoder.forward_t(src, None, false, noise)?.detach())
    }

    /// Encode then decode with the given hit threshold.
    pub fn predict(
        &self,
        src: &Tensor,
        threshold: f64,
        use_thres: bool,
        noise: &mut NoiseSource,
    ) -> Result<(Hvo, LatentOutput)> {
        let latent = self.encode(src, noise)?;
        let hvo = self.decoder.decode(&latent.z, threshold, use_thres, noise)?;
        Ok((hvo, latent))
    }
}
