//! Lightweight configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`APP_RETRIEVAL__TOP_K=8` sets `retrieval.top_k`). Provides helpers to
//! expand `~` and `${VAR}` and to resolve relative paths against a known base
//! directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::data_processor::ChunkingConfig;
use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    /// Wrap an already-assembled Figment (tests, embedding applications).
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed section, or its defaults when the section is absent.
    pub fn section<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if self.figment.contains(key) { self.get(key) } else { Ok(T::default()) }
    }

    pub fn retrieval(&self) -> anyhow::Result<RetrievalSettings> {
        let settings: RetrievalSettings = self.section("retrieval")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn embedding(&self) -> anyhow::Result<EmbeddingSettings> {
        self.section("embedding")
    }

    pub fn chunking(&self) -> anyhow::Result<ChunkingConfig> {
        self.section("chunking")
    }

    pub fn data(&self) -> anyhow::Result<DataSettings> {
        self.section("data")
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.retrieval()?;
        Ok(())
    }
}

/// Knobs of the hybrid retriever. Defaults follow the original deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub rrf_k: usize,
    /// Each sub-query fetches `fetch_multiplier * top_k` candidates.
    pub fetch_multiplier: usize,
    pub max_variants: usize,
    pub subquery_timeout_ms: u64,
    /// Relax the threshold to this floor when too few results survive.
    pub adaptive_floor: Option<f32>,
    pub adaptive_min_results: usize,
    pub short_query_tokens: usize,
    pub precise_token_ratio: f32,
    pub clarify_min_content_tokens: usize,
    pub unhealthy_after_failures: u32,
    pub unhealthy_cooldown_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.25,
            rrf_k: 60,
            fetch_multiplier: 3,
            max_variants: 5,
            subquery_timeout_ms: 5_000,
            adaptive_floor: Some(0.15),
            adaptive_min_results: 3,
            short_query_tokens: 3,
            precise_token_ratio: 0.5,
            clarify_min_content_tokens: 1,
            unhealthy_after_failures: 3,
            unhealthy_cooldown_ms: 30_000,
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<()> {
        if self.rrf_k == 0 {
            return Err(Error::InvalidConfig("retrieval.rrf_k must be positive".into()));
        }
        if self.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be positive".into()));
        }
        if self.fetch_multiplier == 0 {
            return Err(Error::InvalidConfig("retrieval.fetch_multiplier must be positive".into()));
        }
        if self.max_variants == 0 {
            return Err(Error::InvalidConfig("retrieval.max_variants must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::InvalidConfig(format!(
                "retrieval.similarity_threshold {} outside [0, 1]",
                self.similarity_threshold
            )));
        }
        if let Some(floor) = self.adaptive_floor {
            if !(0.0..=1.0).contains(&floor) {
                return Err(Error::InvalidConfig(format!("retrieval.adaptive_floor {floor} outside [0, 1]")));
            }
        }
        if !(0.0..=1.0).contains(&self.precise_token_ratio) {
            return Err(Error::InvalidConfig("retrieval.precise_token_ratio outside [0, 1]".into()));
        }
        if self.subquery_timeout_ms == 0 {
            return Err(Error::InvalidConfig("retrieval.subquery_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn subquery_timeout(&self) -> Duration {
        Duration::from_millis(self.subquery_timeout_ms)
    }

    pub fn unhealthy_cooldown(&self) -> Duration {
        Duration::from_millis(self.unhealthy_cooldown_ms)
    }

    /// Per-sub-query candidate count for a caller's `top_k`.
    pub fn fetch_count(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.fetch_multiplier).max(top_k)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Directory holding `tokenizer.json`, `config.json` and the weights.
    pub model_dir: Option<String>,
    pub use_fake: bool,
    pub fake_dim: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { model_dir: None, use_fake: false, fake_dim: 1024, batch_size: 32 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub raw_dir: String,
    pub lance_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { raw_dir: "knowledge_base".to_string(), lance_dir: "indexes/lancedb".to_string() }
    }
}

/// Figment provider seeded with every default, for layering in tests.
pub fn defaults_provider() -> Figment {
    Figment::new()
        .merge(Serialized::default("retrieval", RetrievalSettings::default()))
        .merge(Serialized::default("embedding", EmbeddingSettings::default()))
        .merge(Serialized::default("chunking", ChunkingConfig::default()))
        .merge(Serialized::default("data", DataSettings::default()))
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Toml;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = Config::from_figment(Figment::new());
        assert_eq!(config.retrieval().unwrap(), RetrievalSettings::default());
        assert_eq!(config.data().unwrap().raw_dir, "knowledge_base");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let figment = Figment::new().merge(Toml::string("[retrieval]\ntop_k = 8\nrrf_k = 30\n"));
        let settings = Config::from_figment(figment).retrieval().unwrap();
        assert_eq!(settings.top_k, 8);
        assert_eq!(settings.rrf_k, 30);
        assert_eq!(settings.fetch_multiplier, 3);
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let figment = Figment::new().merge(Toml::string("[retrieval]\nsimilarity_threshold = 1.5\n"));
        assert!(Config::from_figment(figment).retrieval().is_err());
    }

    #[test]
    fn defaults_provider_round_trips() {
        let config = Config::from_figment(defaults_provider());
        assert_eq!(config.embedding().unwrap(), EmbeddingSettings::default());
        assert_eq!(config.chunking().unwrap().chunk_size, 500);
    }

    #[test]
    fn fetch_count_over_fetches() {
        let s = RetrievalSettings::default();
        assert_eq!(s.fetch_count(5), 15);
        assert_eq!(s.fetch_count(0), 0);
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let base = Path::new("/srv/kb");
        assert_eq!(resolve_with_base(base, "/tmp/x"), PathBuf::from("/tmp/x"));
        assert_eq!(resolve_with_base(base, "docs"), PathBuf::from("/srv/kb/docs"));
    }
}
