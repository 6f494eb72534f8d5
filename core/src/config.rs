use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{IndexError, IndexResult};
use crate::prune::DfBand;
use crate::weighting::Weighting;

/// Top-level engine configuration. Every field has a default, so a JSON file
/// only needs to mention what it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tokenizer: TokenizerConfig,
    pub build: BuildConfig,
    pub weighting: Weighting,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemmerKind {
    /// Porter2 English stemmer.
    English,
    None,
}

/// What to do with whitespace-delimited chunks that contain no word, such as
/// emoji or symbol runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownTokenPolicy {
    Drop,
    PassThrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub stemmer: StemmerKind,
    pub bigrams: bool,
    pub retain_negations: bool,
    pub min_token_len: usize,
    pub unknown_tokens: UnknownTokenPolicy,
    /// Optional file with additional stopwords, one per line.
    pub extra_stopwords_file: Option<PathBuf>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            stemmer: StemmerKind::English,
            bigrams: true,
            retain_negations: true,
            min_token_len: 1,
            unknown_tokens: UnknownTokenPolicy::Drop,
            extra_stopwords_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Auto,
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub mode: BuildMode,
    /// Worker threads for parallel builds; 0 means one per available core.
    pub workers: usize,
    /// Corpora smaller than this are built sequentially in `auto` mode.
    pub parallel_threshold: usize,
    /// Documents pulled from the corpus per partition.
    pub partition_size: usize,
    pub df_band: Option<DfBand>,
    /// Run the consistency check before handing the index out.
    pub verify: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            mode: BuildMode::Auto,
            workers: 0,
            parallel_threshold: 10_000,
            partition_size: 50_000,
            df_band: None,
            verify: true,
        }
    }
}

impl BuildConfig {
    /// Worker count after resolving `0` against the machine.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            available_workers()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub verify_on_load: bool,
    /// Older generations kept around after a successful save.
    pub keep_generations: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { verify_on_load: false, keep_generations: 0 }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> IndexResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| IndexError::io("config", path, e))?;
        let config: EngineConfig = serde_json::from_reader(BufReader::new(f))
            .map_err(|source| IndexError::Json { stage: "config", path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> IndexResult<()> {
        if self.build.partition_size == 0 {
            return Err(IndexError::Config("build.partition_size must be positive".into()));
        }
        if self.tokenizer.min_token_len == 0 {
            return Err(IndexError::Config("tokenizer.min_token_len must be positive".into()));
        }
        if let Some(band) = &self.build.df_band {
            band.validate()?;
        }
        Ok(())
    }
}

pub fn available_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{ "build": { "mode": "parallel", "workers": 4 } }"#).unwrap();
        assert_eq!(cfg.build.mode, BuildMode::Parallel);
        assert_eq!(cfg.build.workers, 4);
        assert_eq!(cfg.build.partition_size, 50_000);
        assert!(cfg.tokenizer.retain_negations);
        assert_eq!(cfg.tokenizer.stemmer, StemmerKind::English);
    }

    #[test]
    fn rejects_zero_partition() {
        let mut cfg = EngineConfig::default();
        cfg.build.partition_size = 0;
        assert!(cfg.validate().is_err());
    }
}
