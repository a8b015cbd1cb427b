//! Secret vault adapter
//!
//! Values come from a process-wide [`SecretStore`]. At run start the vault
//! copies the names a pipeline references into an immutable [`RunSecrets`]
//! owned by that run's context; each job only sees the names it declares,
//! through a [`SecretScope`]. Values never implement `Serialize` and their
//! `Debug` output is masked.

pub mod redact;
pub mod store;

pub use redact::{Redactor, MASK};
pub use store::{ChainedSecretStore, EnvSecretStore, MapSecretStore, SecretStore};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Why a secret could not be resolved for a job
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    #[error("secret '{0}' is not declared for this job")]
    NotDeclared(String),

    #[error("secret '{0}' was not found in the secret store")]
    NotFound(String),
}

/// A resolved secret value
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The plain value. Only the step runner should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue({})", MASK)
    }
}

/// Secret values resolved for one run. Read-only once created.
#[derive(Default)]
pub struct RunSecrets {
    values: BTreeMap<String, SecretValue>,
    redactor: Redactor,
}

impl RunSecrets {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_values(values: BTreeMap<String, SecretValue>) -> Self {
        let redactor = Redactor::new(values.values().map(|v| v.expose().to_string()));
        Self { values, redactor }
    }

    pub fn get(&self, name: &str) -> Option<&SecretValue> {
        self.values.get(name)
    }

    /// Masks every value of this run
    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for RunSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunSecrets")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Opens per-run secret snapshots from a store
#[derive(Clone)]
pub struct SecretVault {
    store: Arc<dyn SecretStore>,
}

impl SecretVault {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Vault over a fixed set of values
    pub fn from_map<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut store = MapSecretStore::new();
        for (k, v) in values {
            store.insert(k, v);
        }
        Self::new(Arc::new(store))
    }

    /// Resolve the named secrets for one run. Names the store does not
    /// know are left out and surface as `NotFound` when a job asks.
    pub fn open_run<I>(&self, names: I) -> Arc<RunSecrets>
    where
        I: IntoIterator<Item = String>,
    {
        let mut values = BTreeMap::new();
        let mut missing = 0;
        for name in names {
            match self.store.get(&name) {
                Some(value) => {
                    values.insert(name, value);
                }
                None => missing += 1,
            }
        }
        debug!(
            "Opened run secrets: {} resolved, {} missing",
            values.len(),
            missing
        );
        Arc::new(RunSecrets::from_values(values))
    }
}

impl fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretVault").finish_non_exhaustive()
    }
}

/// One job's view of the run secrets
#[derive(Debug, Clone)]
pub struct SecretScope {
    declared: BTreeSet<String>,
    secrets: Arc<RunSecrets>,
}

impl SecretScope {
    pub fn new(declared: BTreeSet<String>, secrets: Arc<RunSecrets>) -> Self {
        Self { declared, secrets }
    }

    /// Resolve a declared secret
    pub fn resolve(&self, name: &str) -> Result<&SecretValue, SecretError> {
        if !self.declared.contains(name) {
            return Err(SecretError::NotDeclared(name.to_string()));
        }
        self.secrets
            .get(name)
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }

    pub fn declared(&self) -> &BTreeSet<String> {
        &self.declared
    }

    pub fn redactor(&self) -> &Redactor {
        self.secrets.redactor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_debug_is_masked() {
        let value = SecretValue::new("hunter2");
        assert_eq!(format!("{:?}", value), "SecretValue(***)");

        let vault = SecretVault::from_map([("TOKEN", "hunter2")]);
        let run = vault.open_run(names(&["TOKEN"]));
        assert!(!format!("{:?}", run).contains("hunter2"));
    }

    #[test]
    fn test_open_run_only_copies_referenced_names() {
        let vault = SecretVault::from_map([("A", "1"), ("B", "2")]);
        let run = vault.open_run(names(&["A", "MISSING"]));
        assert_eq!(run.len(), 1);
        assert_eq!(run.get("A").map(SecretValue::expose), Some("1"));
        assert!(run.get("B").is_none());
    }

    #[test]
    fn test_scope_resolution() {
        let vault = SecretVault::from_map([("TOKEN", "abc"), ("OTHER", "xyz")]);
        let run = vault.open_run(names(&["TOKEN", "OTHER", "GONE"]));
        let scope = SecretScope::new(names(&["TOKEN", "GONE"]), run);

        assert_eq!(scope.resolve("TOKEN").unwrap().expose(), "abc");
        assert_eq!(
            scope.resolve("OTHER").unwrap_err(),
            SecretError::NotDeclared("OTHER".to_string())
        );
        assert_eq!(
            scope.resolve("GONE").unwrap_err(),
            SecretError::NotFound("GONE".to_string())
        );
    }
}
