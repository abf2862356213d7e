//! Output projection and the hit/velocity/offset tensor bundles.

use candle_core::{D, IndexOp, Module, Result, Tensor};
use candle_nn::{Linear, VarBuilder};

use super::init::uniform_linear;
use crate::config::OffsetActivation;

/// Pre-activation logits, each `[B, T, voices]`.
#[derive(Debug, Clone)]
pub struct HvoLogits {
    pub hits: Tensor,
    pub velocities: Tensor,
    pub offsets: Tensor,
}

/// Activated pattern, each `[B, T, voices]`.
///
/// `hits` ∈ {0, 1}, `velocities` ∈ [0, 1], `offsets` ∈ [-0.5, 0.5].
#[derive(Debug, Clone)]
pub struct Hvo {
    pub hits: Tensor,
    pub velocities: Tensor,
    pub offsets: Tensor,
}

impl Hvo {
    /// `[B, T, 3 * voices]` laid out as `[hits | velocities | offsets]`.
    pub fn concatenated(&self) -> Result<Tensor> {
        Tensor::cat(&[&self.hits, &self.velocities, &self.offsets], D::Minus1)
    }
}

/// `[B, T, d_model]` → `[B, T, 3, voices]` → hit / velocity / offset logits.
#[derive(Debug, Clone)]
pub struct OutputLayer {
    linear: Linear,
    voices: usize,
}

impl OutputLayer {
    /// Fresh biases follow [`OffsetActivation::output_bias_init`].
    pub fn new(
        embedding_size: usize,
        d_model: usize,
        o_activation: OffsetActivation,
        init_range: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        if embedding_size % 3 != 0 {
            candle_core::bail!("embedding_size ({embedding_size}) must be divisible by 3");
        }
        let bias = o_activation.output_bias_init();
        tracing::debug!(%o_activation, bias, "output layer bias init");
        Ok(Self {
            linear: uniform_linear(d_model, embedding_size, init_range, bias, vb.pp("linear"))?,
            voices: embedding_size / 3,
        })
    }

    pub fn voices(&self) -> usize {
        self.voices
    }

    pub fn forward(&self, decoder_out: &Tensor) -> Result<HvoLogits> {
        let (batch, seq_len, _) = decoder_out.dims3()?;
        let y = self
            .linear
            .forward(decoder_out)?
            .reshape((batch, seq_len, 3, self.voices))?;
        Ok(HvoLogits {
            hits: y.i((.., .., 0, ..))?.contiguous()?,
            velocities: y.i((.., .., 1, ..))?.contiguous()?,
            offsets: y.i((.., .., 2, ..))?.contiguous()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn splits_into_three_groups_in_order() {
        let dev = Device::Cpu;
        // Identity-like projection: d_model = embedding_size = 6, bias = 0.
        let weight = Tensor::eye(6, DType::F32, &dev).unwrap();
        let bias = Tensor::zeros(6, DType::F32, &dev).unwrap();
        let layer = OutputLayer {
            linear: Linear::new(weight, Some(bias)),
            voices: 2,
        };
        let x = Tensor::new(&[[[1f32, 2., 3., 4., 5., 6.]]], &dev).unwrap();
        let logits = layer.forward(&x).unwrap();
        assert_eq!(logits.hits.to_vec3::<f32>().unwrap(), vec![vec![vec![1., 2.]]]);
        assert_eq!(logits.velocities.to_vec3::<f32>().unwrap(), vec![vec![vec![3., 4.]]]);
        assert_eq!(logits.offsets.to_vec3::<f32>().unwrap(), vec![vec![vec![5., 6.]]]);
    }

    #[test]
    fn output_shapes() {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let layer = OutputLayer::new(27, 16, OffsetActivation::Tanh, 0.1, vb.pp("out")).unwrap();
        assert_eq!(layer.voices(), 9);
        let x = Tensor::randn(0f32, 1.0, (2, 32, 16), &dev).unwrap();
        let logits = layer.forward(&x).unwrap();
        for t in [&logits.hits, &logits.velocities, &logits.offsets] {
            assert_eq!(t.dims(), &[2, 32, 9]);
        }
    }

    #[test]
    fn sigmoid_offsets_get_half_bias() {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let layer =
            OutputLayer::new(6, 4, OffsetActivation::Sigmoid, 0.1, vb.pp("out")).unwrap();
        let bias: Vec<f32> = layer.linear.bias().unwrap().to_vec1().unwrap();
        assert_eq!(bias, vec![0.5; 6]);
    }

    #[test]
    fn concatenation_layout() {
        let dev = Device::Cpu;
        let ones = Tensor::ones((1, 2, 3), DType::F32, &dev).unwrap();
        let hvo = Hvo {
            hits: ones.clone(),
            velocities: (&ones * 2.0).unwrap(),
            offsets: (&ones * 3.0).unwrap(),
        };
        let cat = hvo.concatenated().unwrap();
        assert_eq!(cat.dims(), &[1, 2, 9]);
        let row: Vec<f32> = cat.i((0, 0)).unwrap().to_vec1().unwrap();
        assert_eq!(row, vec![1., 1., 1., 2., 2., 2., 3., 3., 3.]);
    }

    #[test]
    fn rejects_embedding_not_divisible_by_three() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        assert!(OutputLayer::new(10, 4, OffsetActivation::Tanh, 0.1, vb).is_err());
    }
}
