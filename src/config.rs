use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// A combination of values describes an impossible configuration.
    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Runtime configuration for the docshelf server.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores document embeddings.
    pub qdrant_url: String,
    /// Name of the Qdrant collection holding document points.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Base URL of the Ollama runtime used for embeddings.
    pub ollama_url: String,
    /// Embedding model identifier passed to the runtime.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Seconds allowed for one embedding batch before the run is aborted.
    pub embedding_timeout_secs: u64,
    /// Base URL of the layout-analysis extraction service.
    pub extractor_url: String,
    /// Seconds allowed for one extraction round-trip.
    pub extractor_timeout_secs: u64,
    /// Filesystem path of the sqlite database holding document records.
    pub database_path: String,
    /// Filesystem root under which uploaded blobs are stored.
    pub blob_root: String,
    /// Secret key used to sign time-limited blob URLs.
    pub blob_signing_key: String,
    /// Public base URL prefixed onto presigned blob paths.
    pub blob_base_url: String,
    /// Seconds a presigned blob URL stays valid.
    pub presign_expiry_secs: u64,
    /// Window length, in characters, of one text chunk.
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks.
    pub chunk_overlap: usize,
    /// Maximum distinct documents returned by one search.
    pub search_result_limit: usize,
    /// Minimum similarity score accepted from the index.
    pub search_score_threshold: f32,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

const MB: usize = 1024 * 1024;

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            ollama_url: load_env("OLLAMA_URL")?,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: parse_env("EMBEDDING_DIMENSION", load_env("EMBEDDING_DIMENSION")?)?,
            embedding_timeout_secs: parse_env_or("EMBEDDING_TIMEOUT_SECS", 120)?,
            extractor_url: load_env("EXTRACTOR_URL")?,
            extractor_timeout_secs: parse_env_or("EXTRACTOR_TIMEOUT_SECS", 120)?,
            database_path: load_env("DATABASE_PATH")?,
            blob_root: load_env("BLOB_ROOT")?,
            blob_signing_key: load_env("BLOB_SIGNING_KEY")?,
            blob_base_url: load_env_optional("BLOB_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080/blobs".to_string()),
            presign_expiry_secs: parse_env_or("PRESIGN_EXPIRY_SECS", 3600)?,
            chunk_size: parse_env_or("CHUNK_SIZE", 150)?,
            chunk_overlap: parse_env_or("CHUNK_OVERLAP", 50)?,
            search_result_limit: parse_env_or("SEARCH_RESULT_LIMIT", 5)?,
            search_score_threshold: parse_env_or("SEARCH_SCORE_THRESHOLD", 0.4)?,
            max_upload_bytes: parse_env_or("MAX_UPLOAD_BYTES", 40 * MB)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject value combinations the pipeline cannot run with.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Inconsistent(
                "CHUNK_SIZE must be greater than zero".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Inconsistent(
                "CHUNK_OVERLAP must be smaller than CHUNK_SIZE".into(),
            ));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::Inconsistent(
                "EMBEDDING_DIMENSION must be greater than zero".into(),
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Inconsistent(
                "MAX_UPLOAD_BYTES must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: String) -> Result<T, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(raw) => parse_env(key, raw),
        None => Ok(default),
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        extractor_url = %config.extractor_url,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            qdrant_url: "http://127.0.0.1:6333".into(),
            qdrant_collection_name: "documents".into(),
            qdrant_api_key: None,
            ollama_url: "http://127.0.0.1:11434".into(),
            embedding_model: "nomic-embed-text".into(),
            embedding_dimension: 512,
            embedding_timeout_secs: 120,
            extractor_url: "http://127.0.0.1:9090".into(),
            extractor_timeout_secs: 120,
            database_path: ":memory:".into(),
            blob_root: "/tmp/blobs".into(),
            blob_signing_key: "secret".into(),
            blob_base_url: "http://localhost:8080/blobs".into(),
            presign_expiry_secs: 3600,
            chunk_size: 150,
            chunk_overlap: 50,
            search_result_limit: 5,
            search_score_threshold: 0.4,
            max_upload_bytes: 40 * MB,
            server_port: None,
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_chunk_size() {
        let mut config = base_config();
        config.chunk_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Inconsistent(_))
        ));
    }

    #[test]
    fn validate_rejects_overlap_not_smaller_than_chunk() {
        let mut config = base_config();
        config.chunk_overlap = config.chunk_size;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Inconsistent(_))
        ));
    }
}
