// Configuration loading and parsing (analysis.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::records::EntityKey;

pub const CONFIG_FILE: &str = "analysis.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Shared option enums
// ---------------------------------------------------------------------------

/// What to do with a record that has a missing feature value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Drop the record from the candidate set.
    Drop,
    /// Replace the missing value with the feature's mean over observed values.
    ImputeMean,
}

/// How entities map onto similarity-graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeIdentity {
    /// One node per player name; all of a player's seasons collapse into it.
    Player,
    /// One node per (name, season).
    PlayerSeason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Pipeline sections
// ---------------------------------------------------------------------------

/// Nearest-neighbor queries over min-max normalized features.
#[derive(Debug, Clone, Deserialize)]
pub struct SimilarityConfig {
    pub data_path: String,
    pub features: Vec<String>,
    #[serde(default = "default_missing_impute")]
    pub missing: MissingPolicy,
    #[serde(default)]
    pub coerce_invalid: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Skip every season of the query player, not just the queried one.
    #[serde(default)]
    pub exclude_same_player: bool,
    #[serde(default)]
    pub queries: Vec<EntityKey>,
}

/// Similarity network over one team's players.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub data_path: String,
    pub features: Vec<String>,
    /// Restrict the graph to one team code. `None` uses every row.
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default = "default_missing_drop")]
    pub missing: MissingPolicy,
    #[serde(default)]
    pub coerce_invalid: bool,
    /// Edges connect entities closer than this. Lower means sparser.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_identity")]
    pub node_identity: NodeIdentity,
    #[serde(default = "default_top_central")]
    pub top_central: usize,
    /// Raw columns averaged over the group for the summary line.
    #[serde(default)]
    pub summary_columns: Vec<String>,
}

/// K-means clustering of standardized pitcher metrics.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusteringConfig {
    pub data_path: String,
    pub features: Vec<String>,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    #[serde(default = "default_n_init")]
    pub n_init: usize,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_top_per_cluster")]
    pub top_per_cluster: usize,
    #[serde(default = "default_rank_by")]
    pub rank_by: String,
}

/// Random-forest regression of a target stat.
#[derive(Debug, Clone, Deserialize)]
pub struct RegressionConfig {
    pub data_path: String,
    pub features: Vec<String>,
    #[serde(default = "default_rank_by")]
    pub target: String,
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_worst_errors")]
    pub worst_errors: usize,
    #[serde(default = "default_best_predictions")]
    pub best_predictions: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_missing_impute() -> MissingPolicy {
    MissingPolicy::ImputeMean
}
fn default_missing_drop() -> MissingPolicy {
    MissingPolicy::Drop
}
fn default_top_k() -> usize {
    10
}
fn default_threshold() -> f64 {
    0.3
}
fn default_identity() -> NodeIdentity {
    NodeIdentity::Player
}
fn default_top_central() -> usize {
    3
}
fn default_k() -> usize {
    4
}
fn default_max_k() -> usize {
    10
}
fn default_n_init() -> usize {
    10
}
fn default_max_iter() -> usize {
    300
}
fn default_tolerance() -> f64 {
    1e-4
}
fn default_seed() -> u64 {
    42
}
fn default_top_per_cluster() -> usize {
    3
}
fn default_rank_by() -> String {
    "WAR".into()
}
fn default_test_fraction() -> f64 {
    0.2
}
fn default_n_estimators() -> usize {
    100
}
fn default_min_samples_split() -> usize {
    2
}
fn default_worst_errors() -> usize {
    5
}
fn default_best_predictions() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

/// Every section is optional; the runner executes the ones present.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub similarity: Option<SimilarityConfig>,
    #[serde(default)]
    pub network: Option<NetworkConfig>,
    #[serde(default)]
    pub clustering: Option<ClusteringConfig>,
    #[serde(default)]
    pub regression: Option<RegressionConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Parse and validate a config from TOML text. `path` is only used in errors.
pub fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    validate(&config)?;
    Ok(config)
}

/// Load and validate `config/analysis.toml` relative to `base_dir`.
///
/// Does not copy defaults; prefer `load_config()` for that.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    parse_config(&text, &path)
}

/// Seed `config/analysis.toml` from `defaults/analysis.toml` when the user
/// has no config yet. Returns the path written, or `None` if a config was
/// already in place.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.exists() {
        return Ok(None);
    }
    let source = base_dir.join("defaults").join(CONFIG_FILE);
    if !source.exists() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "neither config/{CONFIG_FILE} nor defaults/{CONFIG_FILE} found in {}",
                base_dir.display()
            ),
        });
    }

    let copy = |e: std::io::Error| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {} to {}: {e}", source.display(), target.display()),
    };
    std::fs::create_dir_all(base_dir.join("config")).map_err(copy)?;
    std::fs::copy(&source, &target).map_err(copy)?;
    Ok(Some(target))
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Seeds the config from defaults before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_file(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_features(section: &str, data_path: &str, features: &[String]) -> Result<(), ConfigError> {
    if data_path.trim().is_empty() {
        return Err(invalid(&format!("{section}.data_path"), "must not be empty"));
    }
    if features.is_empty() {
        return Err(invalid(&format!("{section}.features"), "must list at least one column"));
    }
    Ok(())
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if let Some(sim) = &config.similarity {
        validate_features("similarity", &sim.data_path, &sim.features)?;
        if sim.top_k == 0 {
            return Err(invalid("similarity.top_k", "must be > 0"));
        }
    }

    if let Some(net) = &config.network {
        validate_features("network", &net.data_path, &net.features)?;
        if net.threshold.is_nan() || net.threshold <= 0.0 {
            return Err(invalid(
                "network.threshold",
                format!("must be > 0, got {}", net.threshold),
            ));
        }
    }

    if let Some(cl) = &config.clustering {
        validate_features("clustering", &cl.data_path, &cl.features)?;
        let counts: &[(&str, usize)] = &[
            ("clustering.k", cl.k),
            ("clustering.max_k", cl.max_k),
            ("clustering.n_init", cl.n_init),
            ("clustering.max_iter", cl.max_iter),
        ];
        for (name, val) in counts {
            if *val == 0 {
                return Err(invalid(name, "must be > 0"));
            }
        }
        if cl.tolerance.is_nan() || cl.tolerance < 0.0 {
            return Err(invalid(
                "clustering.tolerance",
                format!("must be >= 0, got {}", cl.tolerance),
            ));
        }
    }

    if let Some(reg) = &config.regression {
        validate_features("regression", &reg.data_path, &reg.features)?;
        if reg.features.contains(&reg.target) {
            return Err(invalid(
                "regression.target",
                format!("`{}` is also listed as a feature", reg.target),
            ));
        }
        if reg.test_fraction.is_nan() || reg.test_fraction <= 0.0 || reg.test_fraction >= 1.0 {
            return Err(invalid(
                "regression.test_fraction",
                format!("must be strictly between 0.0 and 1.0, got {}", reg.test_fraction),
            ));
        }
        if reg.n_estimators == 0 {
            return Err(invalid("regression.n_estimators", "must be > 0"));
        }
        if reg.min_samples_split < 2 {
            return Err(invalid(
                "regression.min_samples_split",
                format!("must be >= 2, got {}", reg.min_samples_split),
            ));
        }
        if reg.max_depth == Some(0) {
            return Err(invalid("regression.max_depth", "must be > 0 when set"));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
