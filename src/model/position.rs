//! Fixed sinusoidal positional encoding.

use candle_core::{Device, ModuleT, Result, Tensor};
use candle_nn::Dropout;

/// Sinusoidal position table added to input embeddings.
///
/// ```text
/// PE(pos, 2i)   = sin(pos / 10000^(2i / d_model))
/// PE(pos, 2i+1) = cos(pos / 10000^(2i / d_model))
/// ```
///
/// The table is not a learnable parameter and is never loaded from weights.
/// For odd `d_model` the last column is a sine column, so the cosine block is
/// one column shorter.
#[derive(Debug, Clone)]
pub struct PositionalEncoding {
    table: Tensor, // [max_len, d_model]
    dropout: Dropout,
}

impl PositionalEncoding {
    pub fn new(d_model: usize, max_len: usize, dropout: f32, device: &Device) -> Result<Self> {
        let log_base = 10000f64.ln();
        let mut data = vec![0f32; max_len * d_model];
        for pos in 0..max_len {
            for col in 0..d_model {
                let two_i = (col - col % 2) as f64;
                let angle = pos as f64 * (-two_i * log_base / d_model as f64).exp();
                data[pos * d_model + col] = if col % 2 == 0 {
                    angle.sin() as f32
                } else {
                    angle.cos() as f32
                };
            }
        }
        let table = Tensor::from_vec(data, (max_len, d_model), device)?;
        Ok(Self {
            table,
            dropout: Dropout::new(dropout),
        })
    }

    /// The precomputed `[max_len, d_model]` table.
    pub fn table(&self) -> &Tensor {
        &self.table
    }

    pub fn max_len(&self) -> usize {
        self.table.dims()[0]
    }

    /// `x`: `[B, S, d_model]` with `S <= max_len`.
    pub fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let (_, seq_len, _) = x.dims3()?;
        if seq_len > self.max_len() {
            candle_core::bail!(
                "sequence length {seq_len} exceeds positional table length {}",
                self.max_len()
            );
        }
        let pe = self
            .table
            .narrow(0, 0, seq_len)?
            .unsqueeze(0)?
            .to_dtype(x.dtype())?;
        let x = x.broadcast_add(&pe)?;
        self.dropout.forward_t(&x, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    #[test]
    fn table_shape() {
        let pe = PositionalEncoding::new(16, 32, 0.1, &Device::Cpu).unwrap();
        assert_eq!(pe.table().dims(), &[32, 16]);
    }

    #[test]
    fn table_is_reproducible() {
        let a = PositionalEncoding::new(12, 20, 0.1, &Device::Cpu).unwrap();
        let b = PositionalEncoding::new(12, 20, 0.5, &Device::Cpu).unwrap();
        let a: Vec<Vec<f32>> = a.table().to_vec2().unwrap();
        let b: Vec<Vec<f32>> = b.table().to_vec2().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sin_cos_layout() {
        let pe = PositionalEncoding::new(4, 8, 0.0, &Device::Cpu).unwrap();
        let t: Vec<Vec<f32>> = pe.table().to_vec2().unwrap();
        // Position 0: sin(0) = 0, cos(0) = 1.
        assert_eq!(t[0], vec![0.0, 1.0, 0.0, 1.0]);
        // Position 3, i = 1: angle = 3 / 10000^(2/4) = 0.03.
        assert!((t[3][0] - 3f32.sin()).abs() < 1e-6);
        assert!((t[3][2] - 0.03f32.sin()).abs() < 1e-6);
        assert!((t[3][3] - 0.03f32.cos()).abs() < 1e-6);
    }

    #[test]
    fn odd_d_model_ends_with_sine() {
        let pe = PositionalEncoding::new(5, 4, 0.0, &Device::Cpu).unwrap();
        let t: Vec<Vec<f32>> = pe.table().to_vec2().unwrap();
        assert_eq!(t[0], vec![0.0, 1.0, 0.0, 1.0, 0.0]);
        // Column 4 shares frequency index i = 2 with nothing: sin only.
        let angle = 2f64 * (-4.0 * 10000f64.ln() / 5.0).exp();
        assert!((t[2][4] - angle.sin() as f32).abs() < 1e-6);
    }

    #[test]
    fn adds_prefix_rows_in_eval() {
        let dev = Device::Cpu;
        let pe = PositionalEncoding::new(6, 10, 0.5, &dev).unwrap();
        let x = Tensor::zeros((2, 4, 6), DType::F32, &dev).unwrap();
        let y = pe.forward_t(&x, false).unwrap();
        assert_eq!(y.dims(), &[2, 4, 6]);
        let expected: Vec<Vec<f32>> = pe.table().narrow(0, 0, 4).unwrap().to_vec2().unwrap();
        let row: Vec<Vec<f32>> = y.get(1).unwrap().to_vec2().unwrap();
        assert_eq!(row, expected);
    }

    #[test]
    fn rejects_sequence_longer_than_table() {
        let dev = Device::Cpu;
        let pe = PositionalEncoding::new(4, 3, 0.0, &dev).unwrap();
        let x = Tensor::zeros((1, 5, 4), DType::F32, &dev).unwrap();
        assert!(pe.forward_t(&x, false).is_err());
    }
}
