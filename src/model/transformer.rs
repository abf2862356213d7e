//! Shared transformer stack.
//!
//! One [`TransformerStack`] type serves as the probabilistic encoder and as
//! the generative decoder's backbone; the two instances hold independent
//! weights. The stack is **non-causal**: self-attention sees the whole
//! sequence, and patterns are modeled jointly rather than step by step.
//!
//! ```text
//! x = norm1(x + dropout(self_attn(x)))
//! x = norm2(x + dropout(linear2(dropout(relu(linear1(x))))))
//! ...  × num_layers
//! out = final_norm(x)
//! ```

pub mod attention;

use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{Dropout, LayerNorm, Linear, VarBuilder, layer_norm, linear};

use attention::SelfAttention;

const LAYER_NORM_EPS: f64 = 1e-5;

/// Post-norm encoder block: self-attention + ReLU feed-forward.
#[derive(Debug, Clone)]
pub struct EncoderLayer {
    self_attn: SelfAttention,
    linear1: Linear,
    linear2: Linear,
    norm1: LayerNorm,
    norm2: LayerNorm,
    dropout: Dropout,
    dropout1: Dropout,
    dropout2: Dropout,
}

impl EncoderLayer {
    pub fn new(
        d_model: usize,
        nhead: usize,
        dim_feedforward: usize,
        dropout: f32,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            self_attn: SelfAttention::new(d_model, nhead, dropout, vb.pp("self_attn"))?,
            linear1: linear(d_model, dim_feedforward, vb.pp("linear1"))?,
            linear2: linear(dim_feedforward, d_model, vb.pp("linear2"))?,
            norm1: layer_norm(d_model, LAYER_NORM_EPS, vb.pp("norm1"))?,
            norm2: layer_norm(d_model, LAYER_NORM_EPS, vb.pp("norm2"))?,
            dropout: Dropout::new(dropout),
            dropout1: Dropout::new(dropout),
            dropout2: Dropout::new(dropout),
        })
    }

    /// `[B, S, d_model]` → `[B, S, d_model]`.
    pub fn forward_t(&self, hidden_states: &Tensor, train: bool) -> Result<Tensor> {
        // Self-attention with residual
        let attn = self.self_attn.forward_t(hidden_states, train)?;
        let attn = self.dropout1.forward_t(&attn, train)?;
        let h = self.norm1.forward(&(hidden_states + attn)?)?;

        // Feed-forward with residual
        let ff = self.linear1.forward(&h)?.relu()?;
        let ff = self.dropout.forward_t(&ff, train)?;
        let ff = self.linear2.forward(&ff)?;
        let ff = self.dropout2.forward_t(&ff, train)?;
        self.norm2.forward(&(h + ff)?)
    }
}

/// `num_layers` encoder blocks followed by a final LayerNorm.
#[derive(Debug, Clone)]
pub struct TransformerStack {
    layers: Vec<EncoderLayer>,
    norm: LayerNorm,
}

impl TransformerStack {
    pub fn new(
        d_model: usize,
        nhead: usize,
        dim_feedforward: usize,
        num_layers: usize,
        dropout: f32,
        vb: VarBuilder,
    ) -> Result<Self> {
        let layers = (0..num_layers)
            .map(|i| {
                EncoderLayer::new(
                    d_model,
                    nhead,
                    dim_feedforward,
                    dropout,
                    vb.pp(format!("layers.{i}")),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let norm = layer_norm(d_model, LAYER_NORM_EPS, vb.pp("norm"))?;
        Ok(Self { layers, norm })
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// `[B, S, d_model]` → `[B, S, d_model]`.
    pub fn forward_t(&self, src: &Tensor, train: bool) -> Result<Tensor> {
        let mut h = src.clone();
        for layer in &self.layers {
            h = layer.forward_t(&h, train)?;
        }
        self.norm.forward(&h)
    }
}
