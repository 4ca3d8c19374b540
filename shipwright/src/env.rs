//! Build/boot environment record.
//!
//! Environment variables are modeled as an explicit configuration record,
//! fixed at image build time and replayed into every tool invocation at boot.
//! Keys are unique; later `set` calls replace in place so declared order is
//! preserved.

use serde::{Deserialize, Serialize};

pub const PATH_VAR: &str = "PATH";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    vars: Vec<(String, String)>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing any existing value for the same key
    /// without changing its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.vars.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.vars.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Append a directory to the executable search path.
    ///
    /// Starts a `PATH` entry from the host's value when none has been
    /// declared yet, so tool installs extend rather than replace the path.
    pub fn extend_path(&mut self, dir: impl AsRef<str>) {
        let dir = dir.as_ref();
        let current = match self.get(PATH_VAR) {
            Some(path) => path.to_string(),
            None => std::env::var(PATH_VAR).unwrap_or_default(),
        };
        if current.split(':').any(|p| p == dir) {
            return;
        }
        let merged = if current.is_empty() {
            dir.to_string()
        } else {
            format!("{}:{}", current, dir)
        };
        self.set(PATH_VAR, merged);
    }

    /// Merge another record on top of this one (its values win).
    pub fn merge(&mut self, other: &Environment) {
        for (key, value) in &other.vars {
            self.set(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut env = Environment::new();
        for (k, v) in iter {
            env.set(k, v);
        }
        env
    }
}
