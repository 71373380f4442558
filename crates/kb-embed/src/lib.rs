//! kb-embed
//!
//! Embedding providers behind `kb_core::traits::Embedder`: a BGE-M3 model
//! run with Candle, and a hashing embedder for tests and offline runs.

pub mod device;
pub mod hash;
pub mod model;
pub mod pool;
pub mod tokenize;

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use kb_core::config::{expand_path, EmbeddingSettings};
use kb_core::traits::Embedder;

pub use hash::HashEmbedder;
pub use model::{EmbeddingModel, BGE_M3_DIM};
pub use pool::masked_mean_l2;

/// Pick the embedder the settings ask for. `APP_USE_FAKE_EMBEDDINGS=1`
/// forces the hashing embedder regardless of the config file.
pub fn embedder_from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let env_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if settings.use_fake || env_fake {
        info!(dim = settings.fake_dim, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.fake_dim)));
    }
    let model_dir = resolve_model_dir(settings.model_dir.as_deref())?;
    Ok(Arc::new(EmbeddingModel::load(&model_dir, settings.batch_size)?))
}

/// Model directory: configured path, then `APP_MODEL_DIR`/`MODEL_DIR`, then
/// the conventional `models/bge-m3` locations.
pub fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = expand_path(dir);
        if p.exists() { return Ok(p); }
        return Err(anyhow!("configured model dir {} does not exist", p.display()));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = expand_path(&dir);
            if p.exists() { info!(var, dir = %p.display(), "using model dir from env"); return Ok(p); }
        }
    }
    for candidate in ["../models/bge-m3", "models/bge-m3"] {
        let p = Path::new(candidate);
        if p.exists() { return Ok(p.to_path_buf()); }
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}
