//! Seedable noise for reparameterization and hit sampling.
//!
//! Every stochastic step of inference draws from a [`NoiseSource`] handed in by
//! the caller, so a fixed seed reproduces latent vectors and sampled patterns
//! exactly. Dropout masks are not drawn here; they only exist in training mode
//! and come from candle's device RNG.

use candle_core::{DType, Device, Result, Shape, Tensor};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

/// ChaCha8-backed random source.
#[derive(Debug, Clone)]
pub struct NoiseSource {
    rng: ChaCha8Rng,
}

impl NoiseSource {
    /// Reproducible source.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Source seeded from the thread-local OS-backed generator.
    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }

    /// Tensor of `N(0, 1)` draws.
    pub fn standard_normal<S: Into<Shape>>(
        &mut self,
        shape: S,
        dtype: DType,
        device: &Device,
    ) -> Result<Tensor> {
        let shape = shape.into();
        let data: Vec<f32> = (0..shape.elem_count())
            .map(|_| self.rng.sample::<f32, _>(StandardNormal))
            .collect();
        Tensor::from_vec(data, shape, device)?.to_dtype(dtype)
    }

    /// Tensor of `U[0, 1)` draws.
    pub fn uniform<S: Into<Shape>>(
        &mut self,
        shape: S,
        dtype: DType,
        device: &Device,
    ) -> Result<Tensor> {
        let shape = shape.into();
        let data: Vec<f32> = (0..shape.elem_count())
            .map(|_| self.rng.random::<f32>())
            .collect();
        Tensor::from_vec(data, shape, device)?.to_dtype(dtype)
    }

    /// Single Bernoulli trial with success probability `p`.
    pub fn bernoulli(&mut self, p: f32) -> bool {
        self.rng.random::<f32>() < p
    }
}

impl Default for NoiseSource {
    fn default() -> Self {
        Self::from_entropy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_draws() {
        let dev = Device::Cpu;
        let mut a = NoiseSource::from_seed(7);
        let mut b = NoiseSource::from_seed(7);
        let xa: Vec<f32> = a
            .standard_normal(16, DType::F32, &dev)
            .unwrap()
            .to_vec1()
            .unwrap();
        let xb: Vec<f32> = b
            .standard_normal(16, DType::F32, &dev)
            .unwrap()
            .to_vec1()
            .unwrap();
        assert_eq!(xa, xb);
    }

    #[test]
    fn uniform_in_unit_interval() {
        let mut noise = NoiseSource::from_seed(1);
        let u: Vec<f32> = noise
            .uniform((4, 8), DType::F32, &Device::Cpu)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert_eq!(u.len(), 32);
        assert!(u.iter().all(|&x| (0.0..1.0).contains(&x)));
    }

    #[test]
    fn standard_normal_moments() {
        let mut noise = NoiseSource::from_seed(3);
        let x = noise
            .standard_normal(20_000, DType::F32, &Device::Cpu)
            .unwrap();
        let mean: f32 = x.mean_all().unwrap().to_scalar().unwrap();
        let var: f32 = x.sqr().unwrap().mean_all().unwrap().to_scalar().unwrap();
        assert!(mean.abs() < 0.05, "mean={mean}");
        assert!((var - 1.0).abs() < 0.05, "var={var}");
    }

    #[test]
    fn bernoulli_extremes() {
        let mut noise = NoiseSource::from_seed(0);
        assert!((0..100).all(|_| !noise.bernoulli(0.0)));
        assert!((0..100).all(|_| noise.bernoulli(1.0)));
    }
}
