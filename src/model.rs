//! Model components.
//!
//! ## Components
//!
//! - [`input`] — event (and conditioning) projection + [`position`]al encoding
//! - [`transformer`] — non-causal transformer stack shared by encoder and decoder
//! - [`latent`] — Gaussian bottleneck and the latent → sequence expansion
//! - [`output`] — hit / velocity / offset projection
//! - [`decoder`] — generative decoder with thresholded and budgeted sampling
//! - [`vae`], [`density`] — complete unconditioned and conditioned models
//! - [`groove`] — plain groove-to-groove transformer without a latent

pub mod decoder;
pub mod density;
pub mod groove;
pub mod init;
pub mod input;
pub mod latent;
pub mod output;
pub mod position;
pub mod sampling;
pub mod transformer;
pub mod vae;
