//! Server configuration.
//!
//! [`ServerConfig`] is read from TOML; every section and field has a default, so an empty
//! file is a valid configuration:
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! workers = 256
//!
//! [files]
//! root = "./public"
//! prefix = "/static"
//!
//! [compression]
//! encodings = ["gzip", "deflate", "br"]
//!
//! [cors]
//! allow_origin = "*"
//! ```

use crate::encoding::ContentCoding;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {source}")]
    Parse {
        #[from]
        source: toml::de::Error,
    },

    #[error("invalid config value: {reason}")]
    Invalid { reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// maximum number of connections served concurrently
    pub workers: usize,
    /// idle read timeout per socket, `0` disables it
    pub socket_timeout_secs: u64,
    pub files: FilesConfig,
    pub compression: CompressionConfig,
    pub cors: CorsConfig,
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            workers: 256,
            socket_timeout_secs: 10,
            files: FilesConfig::default(),
            compression: CompressionConfig::default(),
            cors: CorsConfig::default(),
            tls: None,
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid { reason: "workers must be at least 1".to_string() });
        }
        self.compression.codings()?;
        if let Some(prefix) = &self.files.prefix
            && !prefix.starts_with('/')
        {
            return Err(ConfigError::Invalid { reason: format!("files.prefix {prefix:?} must start with '/'") });
        }
        Ok(())
    }

    pub fn socket_timeout(&self) -> Option<Duration> {
        (self.socket_timeout_secs > 0).then(|| Duration::from_secs(self.socket_timeout_secs))
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Static file serving.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// directory served; static serving is off when unset
    pub root: Option<PathBuf>,
    /// URL prefix the directory is mounted at, `/` when unset
    pub prefix: Option<String>,
    /// file dispatched for requests ending in `/`
    pub directory_index: Option<String>,
    /// whether directories without an index get a generated listing
    pub allow_generated_index: bool,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self { root: None, prefix: None, directory_index: Some("index.html".to_string()), allow_generated_index: false }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// bodies of known length up to this size are sent uncompressed
    pub min_size: u64,
    /// offered codings, in order of preference
    pub encodings: Vec<String>,
    /// content type patterns worth compressing, see [`crate::encoding::is_compressible`]
    pub compressible_types: Vec<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: 300,
            encodings: vec!["gzip".to_string(), "deflate".to_string()],
            compressible_types: ["text/*", "*/javascript", "*icon", "*+xml", "*/json"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl CompressionConfig {
    /// The offered codings, `identity` excluded.
    pub fn codings(&self) -> Result<Vec<ContentCoding>, ConfigError> {
        let mut codings = Vec::with_capacity(self.encodings.len());
        for name in &self.encodings {
            let coding = name.parse::<ContentCoding>().map_err(|reason| ConfigError::Invalid { reason })?;
            if coding != ContentCoding::Identity && !codings.contains(&coding) {
                codings.push(coding);
            }
        }
        Ok(codings)
    }
}

/// CORS response headers; CORS is off unless `allow_origin` is set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origin: Option<String>,
    pub allow_methods: Option<String>,
    pub allow_headers: Option<String>,
    pub expose_headers: Option<String>,
    pub allow_credentials: bool,
    pub max_age: Option<u64>,
}

impl CorsConfig {
    pub fn is_enabled(&self) -> bool {
        self.allow_origin.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}
