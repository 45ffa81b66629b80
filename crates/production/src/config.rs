//! Node configuration loaded from TOML.
//!
//! ```toml
//! [node]
//! key_path = "validator.key"
//! safety_path = "./data/safety.json"
//!
//! [consensus]
//! base_timeout_ms = 1000
//! backoff_rate = 2.0
//! max_timeout_ms = 30000
//! max_commands_per_vertex = 1024
//!
//! [runner]
//! channel_capacity = 10000
//!
//! [logging]
//! filter = "info,chainbft=debug"
//!
//! [[validators]]
//! public_key = "9f0c...32 bytes hex"
//! voting_power = 1
//! ```

use chainbft_bft::BftConfig;
use chainbft_types::{KeyPair, PublicKey, Validator, ValidatorSet, ValidatorSetError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading configuration or key material. All are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("signing key file {0} not found")]
    MissingKey(PathBuf),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("invalid validator public key {key}: {reason}")]
    InvalidPublicKey { key: String, reason: String },

    #[error("invalid validator set: {0}")]
    ValidatorSet(#[from] ValidatorSetError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,

    #[serde(default)]
    pub consensus: ConsensusConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Initial validator set, delivered as the first epoch.
    #[serde(default)]
    pub validators: Vec<ValidatorEntry>,
}

/// Local identity and storage paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Hex-encoded 32-byte ed25519 seed.
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,

    /// Persisted safety state.
    #[serde(default = "default_safety_path")]
    pub safety_path: PathBuf,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            key_path: default_key_path(),
            safety_path: default_safety_path(),
        }
    }
}

fn default_key_path() -> PathBuf {
    PathBuf::from("validator.key")
}

fn default_safety_path() -> PathBuf {
    PathBuf::from("./data/safety.json")
}

/// Pacemaker and proposal parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    #[serde(default = "default_base_timeout_ms")]
    pub base_timeout_ms: u64,

    #[serde(default = "default_backoff_rate")]
    pub backoff_rate: f64,

    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    #[serde(default = "default_max_commands")]
    pub max_commands_per_vertex: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            base_timeout_ms: default_base_timeout_ms(),
            backoff_rate: default_backoff_rate(),
            max_timeout_ms: default_max_timeout_ms(),
            max_commands_per_vertex: default_max_commands(),
        }
    }
}

fn default_base_timeout_ms() -> u64 {
    1_000
}

fn default_backoff_rate() -> f64 {
    2.0
}

fn default_max_timeout_ms() -> u64 {
    30_000
}

fn default_max_commands() -> usize {
    1_024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// One validator in the initial set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorEntry {
    /// Hex-encoded ed25519 public key.
    pub public_key: String,

    #[serde(default = "default_voting_power")]
    pub voting_power: u64,
}

fn default_voting_power() -> u64 {
    1
}

impl NodeConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let consensus = &self.consensus;
        if consensus.base_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "consensus.base_timeout_ms must be positive".into(),
            ));
        }
        if consensus.max_timeout_ms < consensus.base_timeout_ms {
            return Err(ConfigError::Invalid(
                "consensus.max_timeout_ms is below base_timeout_ms".into(),
            ));
        }
        if !consensus.backoff_rate.is_finite() || consensus.backoff_rate < 1.0 {
            return Err(ConfigError::Invalid(
                "consensus.backoff_rate must be at least 1.0".into(),
            ));
        }
        if self.runner.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "runner.channel_capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn bft_config(&self) -> BftConfig {
        BftConfig::default()
            .with_base_timeout(Duration::from_millis(self.consensus.base_timeout_ms))
            .with_backoff_rate(self.consensus.backoff_rate)
            .with_max_timeout(Duration::from_millis(self.consensus.max_timeout_ms))
            .with_max_commands(self.consensus.max_commands_per_vertex)
    }

    /// The configured initial validator set, `None` if none is configured.
    pub fn validator_set(&self) -> Result<Option<ValidatorSet>, ConfigError> {
        if self.validators.is_empty() {
            return Ok(None);
        }
        let validators = self
            .validators
            .iter()
            .map(|entry| {
                Ok(Validator::new(
                    parse_public_key(&entry.public_key)?,
                    entry.voting_power,
                ))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Some(ValidatorSet::new(validators)?))
    }
}

/// Parse a hex-encoded ed25519 public key.
pub fn parse_public_key(hex_key: &str) -> Result<PublicKey, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidPublicKey {
        key: hex_key.to_string(),
        reason,
    };
    let bytes = hex::decode(hex_key.trim()).map_err(|e| invalid(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| invalid(format!("expected 32 bytes, got {}", b.len())))?;
    Ok(PublicKey::from_bytes(bytes))
}

/// Load the signing key from a file holding a hex-encoded 32-byte seed.
///
/// A missing file is an error; keys are never generated implicitly.
pub fn load_signing_key(path: &Path) -> Result<KeyPair, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::MissingKey(path.to_path_buf()))
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let bytes = hex::decode(contents.trim())
        .map_err(|e| ConfigError::InvalidKey(format!("not hex: {e}")))?;
    let seed: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
        ConfigError::InvalidKey(format!("expected 32 bytes, got {}", b.len()))
    })?;
    Ok(KeyPair::from_seed(&seed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainbft_types::test_utils::test_keypair;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_apply_to_empty_file() {
        let config = NodeConfig::from_toml_str("").unwrap();
        assert_eq!(config.runner.channel_capacity, 10_000);
        assert_eq!(config.logging.filter, "info");
        assert!(config.validator_set().unwrap().is_none());

        let bft = config.bft_config();
        assert_eq!(bft.base_timeout, Duration::from_secs(1));
        assert_eq!(bft.max_timeout, Duration::from_secs(30));
        assert_eq!(bft.max_commands_per_vertex, 1_024);
    }

    #[test]
    fn test_parses_sections_and_validators() {
        let a = test_keypair(1).public_key();
        let b = test_keypair(2).public_key();
        let toml = format!(
            r#"
            [node]
            key_path = "/etc/chainbft/validator.key"

            [consensus]
            base_timeout_ms = 250
            max_timeout_ms = 4000

            [[validators]]
            public_key = "{}"

            [[validators]]
            public_key = "{}"
            voting_power = 3
            "#,
            hex::encode(a.as_bytes()),
            hex::encode(b.as_bytes()),
        );

        let config = NodeConfig::from_toml_str(&toml).unwrap();
        assert_eq!(
            config.node.key_path,
            PathBuf::from("/etc/chainbft/validator.key")
        );
        assert_eq!(config.bft_config().base_timeout, Duration::from_millis(250));

        let set = config.validator_set().unwrap().unwrap();
        assert_eq!(set.total_power(), 4);
        assert_eq!(set.power_of(&b), 3);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            NodeConfig::from_toml_str("[consensus]\nbase_timeout_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml_str("[consensus]\nbackoff_rate = 0.5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml_str("[runner]\nchannel_capacity = \"many\""),
            Err(ConfigError::Parse(_))
        ));

        let config =
            NodeConfig::from_toml_str("[[validators]]\npublic_key = \"abcd\"").unwrap();
        assert!(matches!(
            config.validator_set(),
            Err(ConfigError::InvalidPublicKey { .. })
        ));
    }

    #[test]
    fn test_signing_key_round_trips_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("validator.key");
        let seed = [7u8; 32];
        fs::write(&path, format!("{}\n", hex::encode(seed))).unwrap();

        let key = load_signing_key(&path).unwrap();
        assert_eq!(key.public_key(), KeyPair::from_seed(&seed).public_key());
    }

    #[test]
    fn test_missing_or_malformed_key_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("validator.key");
        assert!(matches!(
            load_signing_key(&path),
            Err(ConfigError::MissingKey(_))
        ));

        fs::write(&path, "abcd").unwrap();
        assert!(matches!(
            load_signing_key(&path),
            Err(ConfigError::InvalidKey(_))
        ));
    }
}
