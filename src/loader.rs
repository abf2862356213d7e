//! Checkpoint directories.
//!
//! A checkpoint is a directory holding `config.json` (the model's serde
//! config) and `model.safetensors` (weights named as in the model's
//! `VarBuilder` tree: `input.*`, `encoder.*`, `latent.*`, `decoder.*`, and
//! `output.*` for the plain groove transformer).

use std::path::{Path, PathBuf};

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use serde::Serialize;

use crate::config::{DensityVaeConfig, GrooveTransformerConfig, GrooveVaeConfig};
use crate::model::density::DensityVae;
use crate::model::groove::GrooveTransformer;
use crate::model::vae::GrooveVae;
use crate::{Error, Result};

pub const CONFIG_FILE: &str = "config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Load an unconditioned groove VAE from `dir`.
pub fn load_groove_vae(dir: impl AsRef<Path>, device: &Device, dtype: DType) -> Result<GrooveVae> {
    let dir = dir.as_ref();
    let config = GrooveVaeConfig::from_file(config_path(dir)?)?;
    config.validate()?;
    let vb = mmap_weights(dir, device, dtype)?;
    let model = GrooveVae::new(&config, device, vb)
        .map_err(|e| Error::WeightLoad(format!("groove VAE init: {e}")))?;
    tracing::info!(
        latent_dim = config.latent_dim,
        voices = model.decoder().voices(),
        "groove VAE loaded"
    );
    Ok(model)
}

/// Load a parameter-conditioned density VAE from `dir`.
pub fn load_density_vae(
    dir: impl AsRef<Path>,
    device: &Device,
    dtype: DType,
) -> Result<DensityVae> {
    let dir = dir.as_ref();
    let config = DensityVaeConfig::from_file(config_path(dir)?)?;
    config.validate()?;
    let vb = mmap_weights(dir, device, dtype)?;
    let model = DensityVae::new(&config, device, vb)
        .map_err(|e| Error::WeightLoad(format!("density VAE init: {e}")))?;
    tracing::info!(
        latent_dim = config.base.latent_dim,
        n_params = config.n_params,
        injection = ?config.param_injection,
        "density VAE loaded"
    );
    Ok(model)
}

/// Load a plain groove transformer from `dir`.
pub fn load_groove_transformer(
    dir: impl AsRef<Path>,
    device: &Device,
    dtype: DType,
) -> Result<GrooveTransformer> {
    let dir = dir.as_ref();
    let config = GrooveTransformerConfig::from_file(config_path(dir)?)?;
    config.validate()?;
    let vb = mmap_weights(dir, device, dtype)?;
    let model = GrooveTransformer::new(&config, device, vb)
        .map_err(|e| Error::WeightLoad(format!("groove transformer init: {e}")))?;
    tracing::info!(
        d_model = config.d_model,
        layers = config.num_encoder_layers,
        "groove transformer loaded"
    );
    Ok(model)
}

/// Write `config` and the weights in `varmap` as a checkpoint directory.
///
/// Creates `dir` if needed.
pub fn save_checkpoint<C: Serialize>(
    dir: impl AsRef<Path>,
    config: &C,
    varmap: &VarMap,
) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(CONFIG_FILE), serde_json::to_string_pretty(config)?)?;
    varmap.save(dir.join(WEIGHTS_FILE))?;
    tracing::info!("checkpoint written to {}", dir.display());
    Ok(())
}

fn required_file(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(Error::WeightLoad(format!("missing {}", path.display())));
    }
    Ok(path)
}

fn config_path(dir: &Path) -> Result<PathBuf> {
    let path = required_file(dir, CONFIG_FILE)?;
    tracing::info!("Loading config from {}", path.display());
    Ok(path)
}

fn mmap_weights<'a>(dir: &Path, device: &Device, dtype: DType) -> Result<VarBuilder<'a>> {
    let path = required_file(dir, WEIGHTS_FILE)?;
    tracing::info!("Loading weights from {}", path.display());
    // SAFETY: the file is not modified while mapped.
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[path.as_path()], dtype, device)
            .map_err(|e| Error::WeightLoad(format!("{}: {e}", path.display())))?
    };
    Ok(vb)
}
