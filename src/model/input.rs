//! Input projection: event features (and optional conditioning) → `d_model`.
//!
//! Three strategies, chosen once at construction:
//!
//! | Variant   | Conditioning                                 | Output length   |
//! |-----------|----------------------------------------------|-----------------|
//! | `Plain`   | none                                         | `max_len`       |
//! | `Param1D` | own projection, prepended as one extra step  | `max_len + 1`   |
//! | `Param2D` | broadcast over time, concatenated on features | `max_len`      |
//!
//! Every variant ends with ReLU and [`PositionalEncoding`].

use candle_core::{Device, Module, Tensor};
use candle_nn::{Linear, VarBuilder};

use super::init::uniform_linear;
use super::position::PositionalEncoding;
use crate::{Error, Result};

/// Which input strategy to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Plain,
    Param1D { n_params: usize },
    Param2D { n_params: usize },
}

/// Shape parameters shared by every input variant.
#[derive(Debug, Clone, Copy)]
pub struct InputDims {
    pub embedding_size: usize,
    pub d_model: usize,
    pub max_len: usize,
    pub dropout: f32,
    pub init_range: f64,
}

/// Events only.
#[derive(Debug, Clone)]
pub struct PlainInput {
    linear: Linear,
    pos: PositionalEncoding,
}

/// Events plus one conditioning vector occupying its own leading time step.
#[derive(Debug, Clone)]
pub struct Param1DInput {
    hvo_linear: Linear,
    param_linear: Linear,
    pos: PositionalEncoding,
}

/// Events with the conditioning vector appended to every step's features.
#[derive(Debug, Clone)]
pub struct Param2DInput {
    linear: Linear,
    n_params: usize,
    pos: PositionalEncoding,
}

#[derive(Debug, Clone)]
pub enum InputLayer {
    Plain(PlainInput),
    Param1D(Param1DInput),
    Param2D(Param2DInput),
}

impl InputLayer {
    pub fn new(kind: InputKind, dims: InputDims, device: &Device, vb: VarBuilder) -> Result<Self> {
        let InputDims {
            embedding_size,
            d_model,
            max_len,
            dropout,
            init_range,
        } = dims;

        let layer = match kind {
            InputKind::Plain => InputLayer::Plain(PlainInput {
                linear: uniform_linear(embedding_size, d_model, init_range, 0.0, vb.pp("linear"))?,
                pos: PositionalEncoding::new(d_model, max_len, dropout, device)?,
            }),
            InputKind::Param1D { n_params } => InputLayer::Param1D(Param1DInput {
                hvo_linear: uniform_linear(
                    embedding_size,
                    d_model,
                    init_range,
                    0.0,
                    vb.pp("hvo_linear"),
                )?,
                param_linear: uniform_linear(
                    n_params,
                    d_model,
                    init_range,
                    0.0,
                    vb.pp("param_linear"),
                )?,
                pos: PositionalEncoding::new(d_model, max_len + 1, dropout, device)?,
            }),
            InputKind::Param2D { n_params } => InputLayer::Param2D(Param2DInput {
                linear: uniform_linear(
                    embedding_size + n_params,
                    d_model,
                    init_range,
                    0.0,
                    vb.pp("linear"),
                )?,
                n_params,
                pos: PositionalEncoding::new(d_model, max_len, dropout, device)?,
            }),
        };
        Ok(layer)
    }

    /// Time steps produced for an input of `max_len` steps.
    pub fn sequence_len(&self) -> usize {
        match self {
            InputLayer::Plain(layer) => layer.pos.max_len(),
            InputLayer::Param1D(layer) => layer.pos.max_len(),
            InputLayer::Param2D(layer) => layer.pos.max_len(),
        }
    }

    /// Project `src` `[B, S, embedding_size]` (and `params` `[B, n_params]`
    /// for the conditioned variants) to `[B, S', d_model]`.
    pub fn forward_t(&self, src: &Tensor, params: Option<&Tensor>, train: bool) -> Result<Tensor> {
        match (self, params) {
            (InputLayer::Plain(layer), None) => {
                let x = layer.linear.forward(src)?.relu()?;
                Ok(layer.pos.forward_t(&x, train)?)
            }
            (InputLayer::Plain(_), Some(_)) => Err(Error::InvalidArgument(
                "plain input layer takes no conditioning parameters".to_string(),
            )),
            (InputLayer::Param1D(layer), Some(params)) => {
                let hvo = layer.hvo_linear.forward(src)?; // [B, S, D]
                let params = params.unsqueeze(1)?.to_dtype(src.dtype())?; // [B, 1, n_params]
                let param = layer.param_linear.forward(&params)?; // [B, 1, D]
                let x = Tensor::cat(&[&param, &hvo], 1)?.relu()?;
                Ok(layer.pos.forward_t(&x, train)?)
            }
            (InputLayer::Param2D(layer), Some(params)) => {
                let (batch, seq_len, _) = src.dims3()?;
                let params = params
                    .unsqueeze(1)?
                    .broadcast_as((batch, seq_len, layer.n_params))?
                    .to_dtype(src.dtype())?;
                let x = Tensor::cat(&[src, &params], 2)?;
                let x = layer.linear.forward(&x)?.relu()?;
                Ok(layer.pos.forward_t(&x, train)?)
            }
            (_, None) => Err(Error::InvalidArgument(
                "conditioned input layer requires conditioning parameters".to_string(),
            )),
        }
    }
}

/// Check that `src` is `[B, max_len, embedding_size]`.
pub(crate) fn check_events(src: &Tensor, max_len: usize, embedding_size: usize) -> Result<()> {
    match src.dims() {
        &[_, steps, width] if steps == max_len && width == embedding_size => Ok(()),
        dims => Err(Error::InvalidArgument(format!(
            "events must be [batch, {max_len}, {embedding_size}], got {dims:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn dims() -> InputDims {
        InputDims {
            embedding_size: 9,
            d_model: 16,
            max_len: 32,
            dropout: 0.1,
            init_range: 0.1,
        }
    }

    fn build(kind: InputKind) -> (VarMap, InputLayer) {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let layer = InputLayer::new(kind, dims(), &dev, vb.pp("input")).unwrap();
        (varmap, layer)
    }

    fn hvo() -> Tensor {
        Tensor::rand(0f32, 1.0, (4, 32, 9), &Device::Cpu).unwrap()
    }

    #[test]
    fn plain_projection() {
        let (_varmap, layer) = build(InputKind::Plain);
        assert_eq!(layer.sequence_len(), 32);
        let y = layer.forward_t(&hvo(), None, false).unwrap();
        assert_eq!(y.dims(), &[4, 32, 16]);
    }

    #[test]
    fn param_1d_prepends_one_step() {
        let (_varmap, layer) = build(InputKind::Param1D { n_params: 1 });
        assert_eq!(layer.sequence_len(), 33);
        let params = Tensor::new(&[[0.1f32], [0.4], [0.7], [1.0]], &Device::Cpu).unwrap();
        let y = layer.forward_t(&hvo(), Some(&params), false).unwrap();
        assert_eq!(y.dims(), &[4, 33, 16]);
    }

    #[test]
    fn param_2d_keeps_length() {
        let (_varmap, layer) = build(InputKind::Param2D { n_params: 2 });
        assert_eq!(layer.sequence_len(), 32);
        let params = Tensor::rand(0f32, 1.0, (4, 2), &Device::Cpu).unwrap();
        let y = layer.forward_t(&hvo(), Some(&params), false).unwrap();
        assert_eq!(y.dims(), &[4, 32, 16]);
    }

    #[test]
    fn conditioning_must_match_variant() {
        let (_varmap, plain) = build(InputKind::Plain);
        let params = Tensor::zeros((4, 1), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            plain.forward_t(&hvo(), Some(&params), false),
            Err(Error::InvalidArgument(_))
        ));

        let (_varmap, param) = build(InputKind::Param1D { n_params: 1 });
        assert!(matches!(
            param.forward_t(&hvo(), None, false),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn param_1d_casts_params_to_model_dtype() {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F64, &dev);
        let layer =
            InputLayer::new(InputKind::Param1D { n_params: 1 }, dims(), &dev, vb.pp("input"))
                .unwrap();
        let src = hvo().to_dtype(DType::F64).unwrap();
        let params = Tensor::new(&[[0.1f32], [0.4], [0.7], [1.0]], &dev).unwrap();
        let y = layer.forward_t(&src, Some(&params), false).unwrap();
        assert_eq!(y.dims(), &[4, 33, 16]);
        assert_eq!(y.dtype(), DType::F64);
    }

    #[test]
    fn event_shape_check() {
        check_events(&hvo(), 32, 9).unwrap();
        assert!(matches!(
            check_events(&hvo(), 16, 9),
            Err(Error::InvalidArgument(_))
        ));
        let flat = Tensor::zeros((4, 9), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            check_events(&flat, 32, 9),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn fresh_biases_are_zero() {
        let (varmap, _layer) = build(InputKind::Param1D { n_params: 3 });
        let vars = varmap.data().lock().unwrap();
        for name in ["input.hvo_linear.bias", "input.param_linear.bias"] {
            let bias: Vec<f32> = vars[name].as_tensor().to_vec1().unwrap();
            assert!(bias.iter().all(|&b| b == 0.0), "{name} not zeroed");
        }
    }
}
