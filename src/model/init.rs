//! Weight initialization for projection layers.
//!
//! Init hints only take effect when the `VarBuilder` is backed by a `VarMap`
//! (fresh weights). Safetensors-backed builders ignore them and return the
//! stored tensors.

use candle_core::Result;
use candle_nn::{Init, Linear, VarBuilder};

/// Default half-width of the uniform weight range.
pub const DEFAULT_INIT_RANGE: f64 = 0.1;

/// `Linear(in_dim → out_dim)` with weights `U[-init_range, init_range]` and
/// every bias entry set to `bias_fill`.
pub fn uniform_linear(
    in_dim: usize,
    out_dim: usize,
    init_range: f64,
    bias_fill: f64,
    vb: VarBuilder,
) -> Result<Linear> {
    let weight = vb.get_with_hints(
        (out_dim, in_dim),
        "weight",
        Init::Uniform {
            lo: -init_range,
            up: init_range,
        },
    )?;
    let bias = vb.get_with_hints(out_dim, "bias", Init::Const(bias_fill))?;
    Ok(Linear::new(weight, Some(bias)))
}
