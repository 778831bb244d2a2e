//! Runtime settings shared by the daemon and the CLI.
//!
//! Values come from an optional TOML file, then `FACECHECK_*` environment
//! variables override individual fields.

use crate::detector::LocatorConfig;
use crate::store::{FeatureStore, FileFeatureStore, SqliteFeatureStore, StoreError};
use crate::verifier::VerifierConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

const MODEL_FILE_NAME: &str = "seeta_fd_frontal_v1.0.bin";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Which [`FeatureStore`] implementation backs enrollments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    File,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "file" => Ok(Self::File),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path to the SeetaFace frontal detector model.
    pub model_path: PathBuf,
    pub store: StoreBackend,
    /// SQLite database used when `store = "sqlite"`.
    pub db_path: PathBuf,
    /// Record directory used when `store = "file"`.
    pub encodings_dir: PathBuf,
    /// Register the daemon on the session bus instead of the system bus.
    pub session_bus: bool,
    pub verifier: VerifierConfig,
    pub locator: LocatorConfig,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            model_path: data_dir.join("models").join(MODEL_FILE_NAME),
            store: StoreBackend::Sqlite,
            db_path: data_dir.join("faces.db"),
            encodings_dir: data_dir.join("face_encodings"),
            session_bus: false,
            verifier: VerifierConfig::default(),
            locator: LocatorConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings: `path` (or `$FACECHECK_CONFIG`) if given, then env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os("FACECHECK_CONFIG").map(PathBuf::from);
        let mut settings = match path.map(Path::to_path_buf).or(env_path) {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Override fields from `FACECHECK_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("FACECHECK_MODEL_PATH") {
            self.model_path = PathBuf::from(v);
        }
        if let Some(v) = var("FACECHECK_STORE") {
            match v.parse() {
                Ok(backend) => self.store = backend,
                Err(e) => tracing::warn!(error = %e, "ignoring FACECHECK_STORE"),
            }
        }
        if let Some(v) = var("FACECHECK_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = var("FACECHECK_ENCODINGS_DIR") {
            self.encodings_dir = PathBuf::from(v);
        }
        if let Some(v) = var("FACECHECK_SESSION_BUS") {
            self.session_bus = v != "0";
        }
        override_parsed(&var, "FACECHECK_SIMILARITY_THRESHOLD", &mut self.verifier.threshold);
        override_parsed(&var, "FACECHECK_RESOLUTION", &mut self.verifier.resolution);
        override_parsed(&var, "FACECHECK_SCALE_FACTOR", &mut self.locator.scale_factor);
        override_parsed(&var, "FACECHECK_MIN_NEIGHBORS", &mut self.locator.min_neighbors);
        override_parsed(&var, "FACECHECK_MIN_FACE_SIZE", &mut self.locator.min_face_size);
    }

    /// Open the configured feature store.
    pub fn open_store(&self) -> Result<Arc<dyn FeatureStore>, StoreError> {
        let store: Arc<dyn FeatureStore> = match self.store {
            StoreBackend::Sqlite => Arc::new(SqliteFeatureStore::open(&self.db_path)?),
            StoreBackend::File => Arc::new(FileFeatureStore::open(&self.encodings_dir)?),
        };
        Ok(store)
    }
}

fn override_parsed<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = var(key) {
        match raw.trim().parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable setting"),
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facecheck")
}
