use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, error, info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Provider identifier written when the assistant is pointed at Ollama
pub const OLLAMA_PROVIDER: &str = "ollama";

/// File name of the assistant's config store
const CONFIG_FILE_NAME: &str = "config.json";

/// Type-safe configuration key that associates a key name with its value type
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey<T> {
    name: &'static str,
    _phantom: PhantomData<T>,
}

impl<T> ConfigKey<T> {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            _phantom: PhantomData,
        }
    }

    pub fn key_name(&self) -> &'static str {
        self.name
    }
}

// ===== Provider Configuration =====

impl ConfigKey<String> {
    /// Active model provider (e.g. "ollama")
    pub const PROVIDER: Self = Self::new("GOOSE_PROVIDER");
    /// Model the provider should serve
    pub const MODEL: Self = Self::new("GOOSE_MODEL");
    /// Where the Ollama runtime listens
    pub const OLLAMA_HOST: Self = Self::new("OLLAMA_HOST");
}

/// Provider settings committed at the end of a setup session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub provider: String,
    pub model: String,
    pub host: String,
}

impl ProviderConfig {
    pub fn ollama(model: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            provider: OLLAMA_PROVIDER.to_string(),
            model: model.into(),
            host: host.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Config file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize value for '{key}': {source}")]
    Serialize {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("No config directory available on this platform")]
    NoConfigDir,
    #[error("Config store rejected '{key}': {reason}")]
    Rejected { key: &'static str, reason: String },
}

// ===== Type-Safe Config Store =====

/// Upsert-style key/value store. Writes are last-write-wins per key.
pub trait ConfigStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T>;
    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError>;
    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError>;
}

/// Load the committed provider settings, if all three keys are present
pub fn load_provider_config<S: ConfigStore>(store: &S) -> Option<ProviderConfig> {
    Some(ProviderConfig {
        provider: store.get(&ConfigKey::PROVIDER)?,
        model: store.get(&ConfigKey::MODEL)?,
        host: store.get(&ConfigKey::OLLAMA_HOST)?,
    })
}

/// Write provider, model and host as three independent upserts.
///
/// The store is not transactional, so if any write fails the keys already
/// written by this call are put back to their previous values (or removed
/// when they did not exist) before the error is returned.
pub fn commit_provider_config<S: ConfigStore>(
    store: &S,
    config: &ProviderConfig,
) -> Result<(), ConfigError> {
    let writes = [
        (&ConfigKey::PROVIDER, &config.provider),
        (&ConfigKey::MODEL, &config.model),
        (&ConfigKey::OLLAMA_HOST, &config.host),
    ];

    let mut written: Vec<(&ConfigKey<String>, Option<String>)> = Vec::with_capacity(writes.len());

    for (key, value) in writes {
        let previous = store.get(key);
        if let Err(e) = store.set(key, value.clone()) {
            error!("Failed to write {}: {}", key.key_name(), e);
            rollback(store, written);
            return Err(e);
        }
        written.push((key, previous));
    }

    info!(
        "Committed provider config: {} / {} @ {}",
        config.provider, config.model, config.host
    );
    Ok(())
}

fn rollback<S: ConfigStore>(store: &S, written: Vec<(&ConfigKey<String>, Option<String>)>) {
    for (key, previous) in written.into_iter().rev() {
        let result = match previous {
            Some(value) => store.set(key, value),
            None => store.delete(key),
        };
        match result {
            Ok(()) => debug!("Rolled back {}", key.key_name()),
            Err(e) => warn!("Failed to roll back {}: {}", key.key_name(), e),
        }
    }
}

/// Config store persisted as a flat JSON object on disk.
///
/// Every write rewrites the file through a temp file and a rename, so a
/// crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<HashMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the store in the platform config directory (`<config>/onboard/config.json`).
    pub fn open_default() -> Result<Self, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Self::open(dir.join("onboard").join(CONFIG_FILE_NAME))
    }

    /// Open (or lazily create) a store backed by `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();

        let data = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        debug!("Config store: {:?} ({} keys)", path, data.len());

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &HashMap<String, Value>) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let contents = serde_json::to_string_pretty(data).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, contents).map_err(io_err)?;
        std::fs::rename(&temp_path, &self.path).map_err(io_err)
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<String, Value>)) -> Result<(), ConfigError> {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = data.clone();
        apply(&mut next);
        self.persist(&next)?;
        *data = next;
        Ok(())
    }
}

impl ConfigStore for JsonFileStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key.key_name())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError> {
        let value = serde_json::to_value(value).map_err(|source| ConfigError::Serialize {
            key: key.key_name(),
            source,
        })?;
        self.update(|data| {
            data.insert(key.key_name().to_string(), value);
        })
    }

    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError> {
        self.update(|data| {
            data.remove(key.key_name());
        })
    }
}
