//! Process-wide secret stores

use crate::secrets::SecretValue;
use std::collections::HashMap;
use std::path::Path;

/// Key-value source of secrets, supplied outside the definition
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> Option<SecretValue>;
}

/// Reads secrets from the process environment
#[derive(Debug, Clone, Default)]
pub struct EnvSecretStore {
    /// Looks up `<prefix><NAME>` instead of `<NAME>`
    prefix: Option<String>,
}

impl EnvSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl SecretStore for EnvSecretStore {
    fn get(&self, name: &str) -> Option<SecretValue> {
        let key = match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, name),
            None => name.to_string(),
        };
        std::env::var(key).ok().map(SecretValue::new)
    }
}

/// In-memory secrets, optionally loaded from a dotenv-style file
#[derive(Default)]
pub struct MapSecretStore {
    values: HashMap<String, String>,
}

impl MapSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Load a dotenv file. Quoting, escapes, `export` and comments follow
    /// dotenv rules; a malformed line fails the whole file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, dotenvy::Error> {
        Self::collect(dotenvy::from_path_iter(path)?)
    }

    /// Parse dotenv content already in memory
    pub fn parse(content: &str) -> Result<Self, dotenvy::Error> {
        Self::collect(dotenvy::from_read_iter(content.as_bytes()))
    }

    fn collect<I>(entries: I) -> Result<Self, dotenvy::Error>
    where
        I: IntoIterator<Item = Result<(String, String), dotenvy::Error>>,
    {
        let mut store = Self::new();
        for entry in entries {
            let (name, value) = entry?;
            store.insert(name, value);
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SecretStore for MapSecretStore {
    fn get(&self, name: &str) -> Option<SecretValue> {
        self.values.get(name).cloned().map(SecretValue::new)
    }
}

/// Asks each store in turn; the first hit wins
#[derive(Default)]
pub struct ChainedSecretStore {
    stores: Vec<Box<dyn SecretStore>>,
}

impl ChainedSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, store: impl SecretStore + 'static) -> Self {
        self.stores.push(Box::new(store));
        self
    }
}

impl SecretStore for ChainedSecretStore {
    fn get(&self, name: &str) -> Option<SecretValue> {
        self.stores.iter().find_map(|s| s.get(name))
    }
}
