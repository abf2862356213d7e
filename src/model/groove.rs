//! Plain groove transformer: events in, events out, no latent bottleneck.
//!
//! ```text
//! src [B, T, 3·voices] → InputLayer(Plain) → TransformerStack → OutputLayer → (h, v, o)
//! ```
//!
//! Used for groove-to-groove mapping (e.g. a tapped rhythm to a full drum
//! pattern) where every output step is computed from the whole input.

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};

use super::input::{InputDims, InputKind, InputLayer, check_events};
use super::output::{Hvo, HvoLogits, OutputLayer};
use super::sampling;
use super::transformer::TransformerStack;
use crate::config::GrooveTransformerConfig;
use crate::noise::NoiseSource;
use crate::Result;

#[derive(Debug, Clone)]
pub struct GrooveTransformer {
    input: InputLayer,
    encoder: TransformerStack,
    output: OutputLayer,
    config: GrooveTransformerConfig,
}

impl GrooveTransformer {
    pub fn new(config: &GrooveTransformerConfig, device: &Device, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let input = InputLayer::new(
            InputKind::Plain,
            InputDims {
                embedding_size: config.embedding_size_src,
                d_model: config.d_model,
                max_len: config.max_len,
                dropout: config.dropout,
                init_range: config.init_range,
            },
            device,
            vb.pp("input"),
        )?;
        let encoder = TransformerStack::new(
            config.d_model,
            config.nhead,
            config.dim_feedforward,
            config.num_encoder_layers,
            config.dropout,
            vb.pp("encoder"),
        )?;
        let output = OutputLayer::new(
            config.embedding_size_tgt,
            config.d_model,
            config.o_activation,
            config.init_range,
            vb.pp("output"),
        )?;
        Ok(Self {
            input,
            encoder,
            output,
            config: config.clone(),
        })
    }

    /// Freshly initialized model plus the [`VarMap`] owning its weights.
    pub fn fresh(config: &GrooveTransformerConfig, device: &Device) -> Result<(Self, VarMap)> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Self::new(config, device, vb)?;
        Ok((model, varmap))
    }

    pub fn config(&self) -> &GrooveTransformerConfig {
        &self.config
    }

    pub fn voices(&self) -> usize {
        self.output.voices()
    }

    /// `src` `[B, max_len, embedding_size_src]` → logits `[B, max_len, voices]` each.
    pub fn forward_t(&self, src: &Tensor, train: bool) -> Result<HvoLogits> {
        check_events(src, self.config.max_len, self.config.embedding_size_src)?;
        let x = self.input.forward_t(src, None, train)?;
        let x = self.encoder.forward_t(&x, train)?;
        Ok(self.output.forward(&x)?)
    }

    /// Inference-mode forward pass with activated, detached outputs.
    ///
    /// Hits follow the same rule as
    /// [`VaeDecoder::decode`](super::decoder::VaeDecoder::decode).
    pub fn predict(
        &self,
        src: &Tensor,
        threshold: f64,
        use_thres: bool,
        noise: &mut NoiseSource,
    ) -> Result<Hvo> {
        let logits = self.forward_t(src, false)?;
        let hits = sampling::hits_activation(&logits.hits, use_thres, threshold, noise)?;
        let velocities = sampling::velocity_activation(&logits.velocities)?;
        let offsets = sampling::offset_activation(&logits.offsets, self.config.o_activation)?;
        Ok(Hvo {
            hits: hits.detach(),
            velocities: velocities.detach(),
            offsets: offsets.detach(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OffsetActivation;

    fn small_config() -> GrooveTransformerConfig {
        GrooveTransformerConfig {
            d_model: 16,
            embedding_size_src: 9,
            embedding_size_tgt: 9,
            nhead: 2,
            dim_feedforward: 32,
            num_encoder_layers: 2,
            max_len: 32,
            o_activation: OffsetActivation::Sigmoid,
            ..GrooveTransformerConfig::default()
        }
    }

    fn src(batch: usize) -> Tensor {
        NoiseSource::from_seed(11)
            .uniform((batch, 32, 9), DType::F32, &Device::Cpu)
            .unwrap()
    }

    #[test]
    fn forward_shapes_and_weight_names() {
        let (model, varmap) = GrooveTransformer::fresh(&small_config(), &Device::Cpu).unwrap();
        assert_eq!(model.voices(), 3);
        let logits = model.forward_t(&src(2), true).unwrap();
        for t in [&logits.hits, &logits.velocities, &logits.offsets] {
            assert_eq!(t.dims(), &[2, 32, 3]);
        }
        let vars = varmap.data().lock().unwrap();
        for name in [
            "input.linear.weight",
            "encoder.layers.1.norm2.weight",
            "encoder.norm.bias",
            "output.linear.weight",
        ] {
            assert!(vars.contains_key(name), "missing {name}");
        }
    }

    #[test]
    fn thresholded_predict_is_deterministic_and_bounded() {
        let (model, _varmap) = GrooveTransformer::fresh(&small_config(), &Device::Cpu).unwrap();
        let x = src(3);
        let a = model
            .predict(&x, 0.5, true, &mut NoiseSource::from_seed(0))
            .unwrap();
        let b = model
            .predict(&x, 0.5, true, &mut NoiseSource::from_seed(99))
            .unwrap();
        let a = a.concatenated().unwrap();
        assert_eq!(a.dims(), &[3, 32, 9]);
        assert_eq!(
            a.to_vec3::<f32>().unwrap(),
            b.concatenated().unwrap().to_vec3::<f32>().unwrap()
        );

        let flat: Vec<f32> = a.flatten_all().unwrap().to_vec1().unwrap();
        for (i, x) in flat.iter().enumerate() {
            match (i % 9) / 3 {
                0 => assert!(*x == 0.0 || *x == 1.0),
                1 => assert!((0.0..=1.0).contains(x)),
                _ => assert!((-0.5..=0.5).contains(x)),
            }
        }
    }

    #[test]
    fn rejects_wrong_event_shape() {
        let (model, _varmap) = GrooveTransformer::fresh(&small_config(), &Device::Cpu).unwrap();
        let short = Tensor::zeros((1, 16, 9), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            model.forward_t(&short, false),
            Err(crate::Error::InvalidArgument(_))
        ));
    }
}
