//! Variational bottleneck and its inverse.
//!
//! - [`LatentLayer`]: `[B, S, D]` → flatten → `mu`, `log_var` → `z`
//! - [`DecoderInput`]: `z` `[B, latent_dim]` → `[B, max_len, D]`

use candle_core::{Module, Result, Tensor};
use candle_nn::{Linear, VarBuilder};

use super::init::uniform_linear;
use crate::noise::NoiseSource;

/// Gaussian posterior parameters and one sample from it, each `[B, latent_dim]`.
#[derive(Debug, Clone)]
pub struct LatentOutput {
    pub mu: Tensor,
    pub log_var: Tensor,
    pub z: Tensor,
}

impl LatentOutput {
    /// Copy with gradient tracking cut.
    pub fn detach(&self) -> Self {
        Self {
            mu: self.mu.detach(),
            log_var: self.log_var.detach(),
            z: self.z.detach(),
        }
    }
}

/// `z = mu + exp(0.5 * log_var) * eps`, `eps ~ N(0, 1)`.
///
/// `eps` is drawn outside the graph, so `z` stays differentiable with respect
/// to `mu` and `log_var`.
pub fn reparameterize(mu: &Tensor, log_var: &Tensor, noise: &mut NoiseSource) -> Result<Tensor> {
    let std = (log_var * 0.5)?.exp()?;
    let eps = noise.standard_normal(std.dims(), std.dtype(), std.device())?;
    (eps * std)? + mu
}

/// Flattened encoder output → `mu`, `log_var`, `z`.
#[derive(Debug, Clone)]
pub struct LatentLayer {
    fc_mu: Linear,
    fc_var: Linear,
}

impl LatentLayer {
    /// `seq_len` is the encoder output length, including any conditioning step.
    pub fn new(
        seq_len: usize,
        d_model: usize,
        latent_dim: usize,
        init_range: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        let flat = seq_len * d_model;
        Ok(Self {
            fc_mu: uniform_linear(flat, latent_dim, init_range, 0.0, vb.pp("fc_mu"))?,
            fc_var: uniform_linear(flat, latent_dim, init_range, 0.0, vb.pp("fc_var"))?,
        })
    }

    pub fn forward(&self, src: &Tensor, noise: &mut NoiseSource) -> Result<LatentOutput> {
        let flat = src.flatten_from(1)?;
        let mu = self.fc_mu.forward(&flat)?;
        let log_var = self.fc_var.forward(&flat)?;
        let z = reparameterize(&mu, &log_var, noise)?;
        Ok(LatentOutput { mu, log_var, z })
    }
}

/// Latent vector → full-length decoder input sequence.
#[derive(Debug, Clone)]
pub struct DecoderInput {
    updims: Linear,
    max_len: usize,
    d_model: usize,
}

impl DecoderInput {
    pub fn new(
        max_len: usize,
        latent_dim: usize,
        d_model: usize,
        init_range: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            updims: uniform_linear(latent_dim, max_len * d_model, init_range, 0.0, vb.pp("updims"))?,
            max_len,
            d_model,
        })
    }
}

impl Module for DecoderInput {
    fn forward(&self, z: &Tensor) -> Result<Tensor> {
        let batch = z.dim(0)?;
        self.updims
            .forward(z)?
            .reshape((batch, self.max_len, self.d_model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn near_zero_variance_returns_mu() {
        let dev = Device::Cpu;
        let mut noise = NoiseSource::from_seed(11);
        let mu = Tensor::new(&[[0.5f32, -1.0, 2.0], [3.0, 0.0, -0.25]], &dev).unwrap();
        let log_var = Tensor::full(-1e4f32, (2, 3), &dev).unwrap();
        for _ in 0..5 {
            let z = reparameterize(&mu, &log_var, &mut noise).unwrap();
            let diff: f32 = (z - &mu)
                .unwrap()
                .abs()
                .unwrap()
                .max_all()
                .unwrap()
                .to_scalar()
                .unwrap();
            assert!(diff < 1e-6, "z drifted from mu by {diff}");
        }
    }

    #[test]
    fn unit_variance_draws_vary() {
        let dev = Device::Cpu;
        let mut noise = NoiseSource::from_seed(2);
        let mu = Tensor::zeros((1, 64), DType::F32, &dev).unwrap();
        let log_var = Tensor::zeros((1, 64), DType::F32, &dev).unwrap();
        let a = reparameterize(&mu, &log_var, &mut noise).unwrap();
        let b = reparameterize(&mu, &log_var, &mut noise).unwrap();
        let diff: f32 = (a - b).unwrap().abs().unwrap().sum_all().unwrap().to_scalar().unwrap();
        assert!(diff > 0.0);
    }

    #[test]
    fn latent_layer_shapes() {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let layer = LatentLayer::new(32, 16, 8, 0.1, vb.pp("latent")).unwrap();
        let src = Tensor::randn(0f32, 1.0, (4, 32, 16), &dev).unwrap();
        let out = layer.forward(&src, &mut NoiseSource::from_seed(0)).unwrap();
        assert_eq!(out.mu.dims(), &[4, 8]);
        assert_eq!(out.log_var.dims(), &[4, 8]);
        assert_eq!(out.z.dims(), &[4, 8]);
    }

    #[test]
    fn decoder_input_expands_latent() {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let layer = DecoderInput::new(32, 8, 16, 0.1, vb.pp("decoder_input")).unwrap();
        let z = Tensor::randn(0f32, 1.0, (3, 8), &dev).unwrap();
        let y = layer.forward(&z).unwrap();
        assert_eq!(y.dims(), &[3, 32, 16]);

        // Zero latent with zero bias gives a zero sequence.
        let zeros = Tensor::zeros((2, 8), DType::F32, &dev).unwrap();
        let sum: f32 = layer
            .forward(&zeros)
            .unwrap()
            .abs()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar()
            .unwrap();
        assert_eq!(sum, 0.0);
    }
}
