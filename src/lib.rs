//! Transformer VAE for symbolic drum grooves, in pure Rust.
//!
//! A candle-based implementation of a groove variational autoencoder. Patterns
//! are hit / velocity / offset (HVO) grids: per time step and per voice, an
//! onset flag, a loudness and a microtiming offset.
//!
//! ## Architecture
//!
//! ```text
//! hvo [B, T, 3·voices] (+ params) → InputLayer → TransformerStack ──┐
//!                                                                    ↓
//!                                                  LatentLayer (mu, log_var, z)
//!                                                                    ↓
//!              DecoderInput → TransformerStack → OutputLayer → (h, v, o)
//! ```
//!
//! ## Modules
//!
//! - [`config`] — serde model configurations
//! - [`model`] — layers, decoder, complete models
//! - [`loader`] — `config.json` + `model.safetensors` checkpoints
//! - [`noise`] — seedable randomness for sampling and reparameterization

pub mod config;
pub mod loader;
pub mod model;
pub mod noise;

mod error;

pub use error::{Error, Result};
