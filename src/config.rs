//! Configuration loading and types for tokpass
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/tokpass/config.toml)
//! 3. Environment variables (TOKPASS_*)
//! 4. CLI arguments (highest priority)

use crate::error::TokpassError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# tokpass configuration
#
# Location: ~/.config/tokpass/config.toml
# Search parameters can be overridden via CLI flags

# Number of utterances decoded in parallel (omit for auto-detection)
# threads = 4

[search]
# Language model scale: total = am + lm_scale * lm
lm_scale = 30.0

# Scale of the state duration model log-probabilities
duration_scale = 3.0

# Scale of the HMM transition log-probabilities on arcs
transition_scale = 1.0

# Beams (log-probability differences). Smaller is faster and less accurate.
global_beam = 230.0
node_beam = 230.0
word_end_beam = 150.0

# Approximate cap on live tokens per frame (histogram pruning)
token_limit = 500000

# Tokens dwelling longer than this in a non-silence state are dropped
max_state_duration = 80

# Word/state history garbage collection interval in frames
history_clean_frame_interval = 10

# Force a sentence end transition for hypotheses that did not end in silence
force_sentence_end = true

# Word boundary unit for subword decoding
# word_boundary = "<w>"

# Expand active nodes best first (better early pruning)
sort_active_nodes = true

# Keep <s> and </s> in the reported unit sequence
keep_sentence_markers = false

[nbest]
# Track recombined paths and report alternate hypotheses
enabled = false
beam = 1000.0
max_hypotheses = 20000
max_recombinations = 3

[models]
# Search network in the text graph format
graph = "graph.txt"

# Vocabulary units, one per line (line number = unit id)
vocabulary = "vocab.txt"

# Optional state duration table
# duration = "durations.txt"

# Optional per-node lookahead scores
# lookahead = "lookahead.txt"

[lm]
# Language model: "ngram", "class" or "interpolated"
kind = "ngram"
ngram = "lm.arpa"

# Class n-gram (kind = "class" or "interpolated")
# class_ngram = "class.arpa"
# class_memberships = "classes.txt"

# Subword n-gram (kind = "interpolated")
# subword_ngram = "subword.arpa"
# subword_segmentations = "segmentations.txt"

# Linear interpolation weights (kind = "interpolated")
# word_weight = 0.4
# class_weight = 0.3
# subword_weight = 0.3
"#;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Number of utterances decoded in parallel (None = auto-detect)
    #[serde(default)]
    pub threads: Option<usize>,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub nbest: NbestConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub lm: LmConfig,
}

/// Beam search parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_lm_scale")]
    pub lm_scale: f32,

    #[serde(default = "default_duration_scale")]
    pub duration_scale: f32,

    #[serde(default = "default_transition_scale")]
    pub transition_scale: f32,

    #[serde(default = "default_global_beam")]
    pub global_beam: f32,

    #[serde(default = "default_node_beam")]
    pub node_beam: f32,

    #[serde(default = "default_word_end_beam")]
    pub word_end_beam: f32,

    #[serde(default = "default_token_limit")]
    pub token_limit: usize,

    #[serde(default = "default_max_state_duration")]
    pub max_state_duration: u16,

    #[serde(default = "default_history_clean_frame_interval")]
    pub history_clean_frame_interval: usize,

    #[serde(default = "default_true")]
    pub force_sentence_end: bool,

    /// Unit label marking word boundaries in subword decoding
    #[serde(default)]
    pub word_boundary: Option<String>,

    #[serde(default = "default_true")]
    pub sort_active_nodes: bool,

    #[serde(default)]
    pub keep_sentence_markers: bool,
}

/// Alternate hypothesis (n-best) settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NbestConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Alternates scoring below best - beam are discarded
    #[serde(default = "default_nbest_beam")]
    pub beam: f32,

    #[serde(default = "default_nbest_max_hypotheses")]
    pub max_hypotheses: usize,

    /// Maximum number of recombination links followed per alternate
    #[serde(default = "default_nbest_max_recombinations")]
    pub max_recombinations: usize,
}

/// Model file locations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    #[serde(default = "default_graph_path")]
    pub graph: PathBuf,

    #[serde(default = "default_vocabulary_path")]
    pub vocabulary: PathBuf,

    #[serde(default)]
    pub duration: Option<PathBuf>,

    #[serde(default)]
    pub lookahead: Option<PathBuf>,
}

/// Language model variant
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LmKind {
    /// Plain backoff n-gram over vocabulary units
    #[default]
    Ngram,
    /// Class n-gram with class membership probabilities
    Class,
    /// Word, class and subword n-grams interpolated in the probability domain
    Interpolated,
}

/// Language model configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LmConfig {
    #[serde(default)]
    pub kind: LmKind,

    #[serde(default)]
    pub ngram: Option<PathBuf>,

    #[serde(default)]
    pub class_ngram: Option<PathBuf>,

    #[serde(default)]
    pub class_memberships: Option<PathBuf>,

    #[serde(default)]
    pub subword_ngram: Option<PathBuf>,

    #[serde(default)]
    pub subword_segmentations: Option<PathBuf>,

    #[serde(default = "default_interpolation_weight")]
    pub word_weight: f64,

    #[serde(default = "default_interpolation_weight")]
    pub class_weight: f64,

    #[serde(default = "default_interpolation_weight")]
    pub subword_weight: f64,
}

fn default_lm_scale() -> f32 {
    30.0
}

fn default_duration_scale() -> f32 {
    3.0
}

fn default_transition_scale() -> f32 {
    1.0
}

fn default_global_beam() -> f32 {
    230.0
}

fn default_node_beam() -> f32 {
    230.0
}

fn default_word_end_beam() -> f32 {
    150.0
}

fn default_token_limit() -> usize {
    500_000
}

fn default_max_state_duration() -> u16 {
    80
}

fn default_history_clean_frame_interval() -> usize {
    10
}

fn default_nbest_beam() -> f32 {
    1000.0
}

fn default_nbest_max_hypotheses() -> usize {
    20_000
}

fn default_nbest_max_recombinations() -> usize {
    3
}

fn default_graph_path() -> PathBuf {
    PathBuf::from("graph.txt")
}

fn default_vocabulary_path() -> PathBuf {
    PathBuf::from("vocab.txt")
}

fn default_interpolation_weight() -> f64 {
    1.0 / 3.0
}

fn default_true() -> bool {
    true
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lm_scale: default_lm_scale(),
            duration_scale: default_duration_scale(),
            transition_scale: default_transition_scale(),
            global_beam: default_global_beam(),
            node_beam: default_node_beam(),
            word_end_beam: default_word_end_beam(),
            token_limit: default_token_limit(),
            max_state_duration: default_max_state_duration(),
            history_clean_frame_interval: default_history_clean_frame_interval(),
            force_sentence_end: true,
            word_boundary: None,
            sort_active_nodes: true,
            keep_sentence_markers: false,
        }
    }
}

impl Default for NbestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            beam: default_nbest_beam(),
            max_hypotheses: default_nbest_max_hypotheses(),
            max_recombinations: default_nbest_max_recombinations(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            graph: default_graph_path(),
            vocabulary: default_vocabulary_path(),
            duration: None,
            lookahead: None,
        }
    }
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            kind: LmKind::Ngram,
            ngram: Some(PathBuf::from("lm.arpa")),
            class_ngram: None,
            class_memberships: None,
            subword_ngram: None,
            subword_segmentations: None,
            word_weight: default_interpolation_weight(),
            class_weight: default_interpolation_weight(),
            subword_weight: default_interpolation_weight(),
        }
    }
}

impl SearchConfig {
    /// Reject parameter combinations the search cannot run with
    pub fn validate(&self) -> Result<(), TokpassError> {
        for (name, beam) in [
            ("global_beam", self.global_beam),
            ("node_beam", self.node_beam),
            ("word_end_beam", self.word_end_beam),
        ] {
            if !(beam > 0.0) {
                return Err(TokpassError::Config(format!(
                    "{} must be positive, got {}",
                    name, beam
                )));
            }
        }
        if self.token_limit == 0 {
            return Err(TokpassError::Config("token_limit must be at least 1".to_string()));
        }
        if self.history_clean_frame_interval == 0 {
            return Err(TokpassError::Config(
                "history_clean_frame_interval must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl LmConfig {
    /// Interpolation weights converted to the log domain, normalized to sum to one
    pub fn log_weights(&self) -> Result<[f64; 3], TokpassError> {
        let weights = [self.word_weight, self.class_weight, self.subword_weight];
        if weights.iter().any(|w| !(*w > 0.0)) {
            return Err(TokpassError::Config(
                "interpolation weights must all be positive".to_string(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        Ok(weights.map(|w| (w / sum).ln()))
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "tokpass")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Number of worker threads, falling back to the CPU count
    pub fn resolve_threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Resolve relative model paths against the directory holding the config file
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.models.graph);
        resolve(&mut self.models.vocabulary);
        for p in [
            &mut self.models.duration,
            &mut self.models.lookahead,
            &mut self.lm.ngram,
            &mut self.lm.class_ngram,
            &mut self.lm.class_memberships,
            &mut self.lm.subword_ngram,
            &mut self.lm.subword_segmentations,
        ]
        .into_iter()
        .flatten()
        {
            resolve(p);
        }
    }
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, TokpassError> {
    // Start with defaults
    let mut config = Config::default();

    // Determine config file path
    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    // Load from file if it exists
    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| TokpassError::Config(format!("Failed to read config: {}", e)))?;

            config = toml::from_str(&contents)
                .map_err(|e| TokpassError::Config(format!("Invalid config: {}", e)))?;

            if let Some(base) = path.parent() {
                config.resolve_paths(base);
            }
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    // Override from environment variables
    if let Ok(value) = std::env::var("TOKPASS_LM_SCALE") {
        config.search.lm_scale = parse_env("TOKPASS_LM_SCALE", &value)?;
    }
    if let Ok(value) = std::env::var("TOKPASS_GLOBAL_BEAM") {
        config.search.global_beam = parse_env("TOKPASS_GLOBAL_BEAM", &value)?;
    }
    if let Ok(value) = std::env::var("TOKPASS_TOKEN_LIMIT") {
        config.search.token_limit = parse_env("TOKPASS_TOKEN_LIMIT", &value)?;
    }
    if let Ok(value) = std::env::var("TOKPASS_THREADS") {
        config.threads = Some(parse_env("TOKPASS_THREADS", &value)?);
    }

    Ok(config)
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, TokpassError> {
    value
        .trim()
        .parse()
        .map_err(|_| TokpassError::Config(format!("Invalid value for {}: '{}'", name, value)))
}

/// Save configuration to file
pub fn save_config(config: &Config, path: &Path) -> Result<(), TokpassError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| TokpassError::Config(format!("Failed to create config dir: {}", e)))?;
    }

    let contents = toml::to_string_pretty(config)
        .map_err(|e| TokpassError::Config(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, contents)
        .map_err(|e| TokpassError::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.search.lm_scale, 30.0);
        assert_eq!(config.search.token_limit, 500_000);
        assert_eq!(config.search.history_clean_frame_interval, 10);
        assert!(config.search.force_sentence_end);
        assert!(!config.nbest.enabled);
        assert_eq!(config.lm.kind, LmKind::Ngram);
    }

    #[test]
    fn test_default_config_string_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.search, SearchConfig::default());
        assert_eq!(config.models.graph, PathBuf::from("graph.txt"));
        assert_eq!(config.lm.ngram, Some(PathBuf::from("lm.arpa")));
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
            threads = 2

            [search]
            lm_scale = 28.0
            global_beam = 200.0
            word_boundary = "<w>"

            [nbest]
            enabled = true

            [lm]
            kind = "interpolated"
            ngram = "word.arpa"
            class_ngram = "class.arpa"
            class_memberships = "classes.txt"
            subword_ngram = "morph.arpa"
            subword_segmentations = "segs.txt"
            word_weight = 0.5
            class_weight = 0.25
            subword_weight = 0.25
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.threads, Some(2));
        assert_eq!(config.search.lm_scale, 28.0);
        assert_eq!(config.search.global_beam, 200.0);
        assert_eq!(config.search.node_beam, 230.0); // default
        assert_eq!(config.search.word_boundary.as_deref(), Some("<w>"));
        assert!(config.nbest.enabled);
        assert_eq!(config.nbest.max_recombinations, 3);
        assert_eq!(config.lm.kind, LmKind::Interpolated);
    }

    #[test]
    fn test_log_weights_are_normalized() {
        let lm = LmConfig {
            word_weight: 2.0,
            class_weight: 1.0,
            subword_weight: 1.0,
            ..LmConfig::default()
        };
        let [w, c, s] = lm.log_weights().unwrap();
        assert!((w - 0.5f64.ln()).abs() < 1e-12);
        assert!((c - 0.25f64.ln()).abs() < 1e-12);
        assert!((s - 0.25f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_bad_beams() {
        let mut search = SearchConfig::default();
        assert!(search.validate().is_ok());
        search.node_beam = 0.0;
        assert!(search.validate().is_err());

        let search = SearchConfig {
            token_limit: 0,
            ..SearchConfig::default()
        };
        assert!(search.validate().is_err());
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = Config::default();
        config.models.lookahead = Some(PathBuf::from("/abs/la.txt"));
        config.resolve_paths(Path::new("/models"));
        assert_eq!(config.models.graph, PathBuf::from("/models/graph.txt"));
        assert_eq!(config.lm.ngram, Some(PathBuf::from("/models/lm.arpa")));
        assert_eq!(config.models.lookahead, Some(PathBuf::from("/abs/la.txt")));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = Config::default();
        config.search.token_limit = 1234;
        save_config(&config, &path).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.search.token_limit, 1234);
        assert_eq!(loaded.models.graph, dir.path().join("nested/graph.txt"));
    }
}
