//! Parameter-conditioned groove VAE.
//!
//! Identical to [`GrooveVae`](super::vae::GrooveVae) except that the encoder
//! input carries a `[B, n_params]` conditioning vector (e.g. note density).
//! The decoder is unconditioned: the parameters only shape the posterior.

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};

use super::decoder::VaeDecoder;
use super::input::InputKind;
use super::latent::LatentOutput;
use super::output::Hvo;
use super::vae::{Encoder, VaeOutput};
use crate::config::{DensityVaeConfig, ParamInjection};
use crate::noise::NoiseSource;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct DensityVae {
    encoder: Encoder,
    decoder: VaeDecoder,
    config: DensityVaeConfig,
}

impl DensityVae {
    pub fn new(config: &DensityVaeConfig, device: &Device, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let kind = match config.param_injection {
            ParamInjection::OneD => InputKind::Param1D {
                n_params: config.n_params,
            },
            ParamInjection::TwoD => InputKind::Param2D {
                n_params: config.n_params,
            },
        };
        let encoder = Encoder::new(&config.base, kind, device, &vb)?;
        let decoder = VaeDecoder::new(&config.base.decoder_config(), vb.pp("decoder"))?;
        Ok(Self {
            encoder,
            decoder,
            config: config.clone(),
        })
    }

    /// Freshly initialized model plus the [`VarMap`] owning its weights.
    pub fn fresh(config: &DensityVaeConfig, device: &Device) -> Result<(Self, VarMap)> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Self::new(config, device, vb)?;
        Ok((model, varmap))
    }

    pub fn config(&self) -> &DensityVaeConfig {
        &self.config
    }

    pub fn decoder(&self) -> &VaeDecoder {
        &self.decoder
    }

    pub fn forward_t(
        &self,
        src: &Tensor,
        params: &Tensor,
        train: bool,
        noise: &mut NoiseSource,
    ) -> Result<VaeOutput> {
        self.check_params(src, params)?;
        let latent = self.encoder.forward_t(src, Some(params), train, noise)?;
        let logits = self.decoder.forward_t(&latent.z, train)?;
        Ok(VaeOutput { logits, latent })
    }

    pub fn encode(
        &self,
        src: &Tensor,
        params: &Tensor,
        noise: &mut NoiseSource,
    ) -> Result<LatentOutput> {
        self.check_params(src, params)?;
        Ok(self
            .encoder
            .forward_t(src, Some(params), false, noise)?
            .detach())
    }

    pub fn predict(
        &self,
        src: &Tensor,
        params: &Tensor,
        threshold: f64,
        use_thres: bool,
        noise: &mut NoiseSource,
    ) -> Result<(Hvo, LatentOutput)> {
        let latent = self.encode(src, params, noise)?;
        let hvo = self.decoder.decode(&latent.z, threshold, use_thres, noise)?;
        Ok((hvo, latent))
    }

    fn check_params(&self, src: &Tensor, params: &Tensor) -> Result<()> {
        let (batch, width) = params.dims2()?;
        let src_batch = src.dim(0)?;
        if batch != src_batch || width != self.config.n_params {
            return Err(Error::InvalidArgument(format!(
                "params must be [{src_batch}, {}], got [{batch}, {width}]",
                self.config.n_params
            )));
        }
        Ok(())
    }
}
