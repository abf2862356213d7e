//! Multi-head self-attention.

use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{Dropout, Linear, VarBuilder, linear};

/// Scaled dot-product self-attention over the whole sequence.
///
/// No mask is applied: every step attends to every other step, before and
/// after it.
#[derive(Debug, Clone)]
pub struct SelfAttention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    /// Dropout on the attention weights.
    dropout: Dropout,
    num_heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    pub fn new(d_model: usize, num_heads: usize, dropout: f32, vb: VarBuilder) -> Result<Self> {
        if num_heads == 0 || d_model % num_heads != 0 {
            candle_core::bail!("d_model ({d_model}) must be divisible by num_heads ({num_heads})");
        }
        Ok(Self {
            q_proj: linear(d_model, d_model, vb.pp("q_proj"))?,
            k_proj: linear(d_model, d_model, vb.pp("k_proj"))?,
            v_proj: linear(d_model, d_model, vb.pp("v_proj"))?,
            out_proj: linear(d_model, d_model, vb.pp("out_proj"))?,
            dropout: Dropout::new(dropout),
            num_heads,
            head_dim: d_model / num_heads,
        })
    }

    /// `hidden_states`: `[B, S, d_model]` → `[B, S, d_model]`.
    pub fn forward_t(&self, hidden_states: &Tensor, train: bool) -> Result<Tensor> {
        let (batch, seq_len, _) = hidden_states.dims3()?;

        let q = self.q_proj.forward(hidden_states)?;
        let k = self.k_proj.forward(hidden_states)?;
        let v = self.v_proj.forward(hidden_states)?;

        // [B, S, D] → [B, H, S, head_dim]
        let q = q
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let k = k
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let v = v
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;

        let scale = (self.head_dim as f64).sqrt();
        let attn_weights = (q.matmul(&k.t()?)? / scale)?;
        let attn_weights = candle_nn::ops::softmax_last_dim(&attn_weights)?;
        let attn_weights = self.dropout.forward_t(&attn_weights, train)?;

        let out = attn_weights.matmul(&v)?; // [B, H, S, head_dim]
        let out = out.transpose(1, 2)?.contiguous()?.reshape((
            batch,
            seq_len,
            self.num_heads * self.head_dim,
        ))?;

        self.out_proj.forward(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn output_shape() {
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let attn = SelfAttention::new(16, 2, 0.0, vb.pp("attn")).unwrap();
        let x = Tensor::randn(0f32, 1.0, (3, 7, 16), &dev).unwrap();
        let y = attn.forward_t(&x, false).unwrap();
        assert_eq!(y.dims(), &[3, 7, 16]);
    }

    #[test]
    fn attends_to_later_steps() {
        // Perturbing the last step must change the first step's output:
        // the attention is not causal.
        let dev = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &dev);
        let attn = SelfAttention::new(8, 2, 0.0, vb.pp("attn")).unwrap();

        let x = Tensor::randn(0f32, 1.0, (1, 4, 8), &dev).unwrap();
        let bump = Tensor::ones((1, 1, 8), DType::F32, &dev).unwrap();
        let head = x.narrow(1, 0, 3).unwrap();
        let last = (x.narrow(1, 3, 1).unwrap() + bump).unwrap();
        let x2 = Tensor::cat(&[&head, &last], 1).unwrap();

        let y1 = attn.forward_t(&x, false).unwrap().narrow(1, 0, 1).unwrap();
        let y2 = attn.forward_t(&x2, false).unwrap().narrow(1, 0, 1).unwrap();
        let diff: f32 = (y1 - y2)
            .unwrap()
            .abs()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!(diff > 1e-6, "first step ignored later context, diff={diff}");
    }

    #[test]
    fn rejects_indivisible_heads() {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        assert!(SelfAttention::new(10, 3, 0.0, vb).is_err());
    }
}
