//! Dependency manifest/lock pair validation.
//!
//! The lock file records a content hash of the manifest it was resolved
//! from (poetry-style `content-hash = "<hex>"`). An absent or mismatched
//! hash fails the build deterministically before the dependency tool is
//! ever invoked - a stale lock must never silently re-resolve.

use crate::errors::{ShipwrightError, ShipwrightResult};
use sha2::{Digest, Sha256};
use std::path::Path;

/// A manifest/lock pair whose consistency has been verified.
#[derive(Debug, Clone)]
pub struct LockedManifest {
    /// Hex SHA-256 digest of the manifest contents.
    pub manifest_digest: String,
    /// Hex SHA-256 digest of the lock file contents (feeds the layer cache key).
    pub lock_digest: String,
}

impl LockedManifest {
    /// Load both files and verify the lock's recorded content hash against
    /// the manifest digest.
    pub fn load(manifest_path: &Path, lock_path: &Path) -> ShipwrightResult<Self> {
        let manifest = std::fs::read(manifest_path).map_err(|e| {
            ShipwrightError::Config(format!(
                "cannot read dependency manifest {}: {}",
                manifest_path.display(),
                e
            ))
        })?;

        if !lock_path.exists() {
            return Err(ShipwrightError::LockMismatch(format!(
                "lock file {} not found",
                lock_path.display()
            )));
        }
        let lock = std::fs::read_to_string(lock_path).map_err(|e| {
            ShipwrightError::Config(format!(
                "cannot read lock file {}: {}",
                lock_path.display(),
                e
            ))
        })?;

        let manifest_digest = hex_sha256(&manifest);
        let recorded = extract_content_hash(&lock).ok_or_else(|| {
            ShipwrightError::LockMismatch(format!(
                "lock file {} records no content-hash",
                lock_path.display()
            ))
        })?;

        if !recorded.eq_ignore_ascii_case(&manifest_digest) {
            return Err(ShipwrightError::LockMismatch(format!(
                "lock file {} was resolved from a different manifest (recorded {}, manifest is {})",
                lock_path.display(),
                recorded,
                manifest_digest
            )));
        }

        Ok(Self {
            manifest_digest,
            lock_digest: hex_sha256(lock.as_bytes()),
        })
    }
}

pub fn hex_sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Find the `content-hash` value in a lock file.
///
/// Accepts both the TOML spelling (`content-hash = "<hex>"`) and the JSON
/// spelling (`"content-hash": "<hex>"`) so the check is not bound to one
/// package manager's lock schema.
fn extract_content_hash(lock: &str) -> Option<String> {
    for line in lock.lines() {
        let line = line.trim();
        let Some(rest) = line
            .strip_prefix("content-hash")
            .or_else(|| line.strip_prefix("\"content-hash\""))
        else {
            continue;
        };
        let rest = rest.trim_start();
        let Some(rest) = rest.strip_prefix('=').or_else(|| rest.strip_prefix(':')) else {
            continue;
        };
        let value = rest.trim().trim_end_matches(',').trim_matches('"');
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_pair(
        dir: &TempDir,
        manifest: &str,
        lock: &str,
    ) -> (std::path::PathBuf, std::path::PathBuf) {
        let m = dir.path().join("pyproject.toml");
        let l = dir.path().join("poetry.lock");
        fs::write(&m, manifest).unwrap();
        fs::write(&l, lock).unwrap();
        (m, l)
    }

    #[test]
    fn consistent_pair_loads() {
        let dir = TempDir::new().unwrap();
        let manifest = "[tool.poetry]\nname = \"app\"\n";
        let lock = format!("content-hash = \"{}\"\n", hex_sha256(manifest.as_bytes()));
        let (m, l) = write_pair(&dir, manifest, &lock);

        let locked = LockedManifest::load(&m, &l).unwrap();
        assert_eq!(locked.manifest_digest, hex_sha256(manifest.as_bytes()));
    }

    #[test]
    fn stale_lock_is_rejected() {
        let dir = TempDir::new().unwrap();
        let lock = format!("content-hash = \"{}\"\n", hex_sha256(b"older manifest"));
        let (m, l) = write_pair(&dir, "[tool.poetry]\nname = \"app\"\n", &lock);

        let err = LockedManifest::load(&m, &l).unwrap_err();
        assert!(matches!(err, ShipwrightError::LockMismatch(_)));
    }

    #[test]
    fn missing_lock_is_rejected() {
        let dir = TempDir::new().unwrap();
        let m = dir.path().join("pyproject.toml");
        fs::write(&m, "x").unwrap();

        let err = LockedManifest::load(&m, &dir.path().join("poetry.lock")).unwrap_err();
        assert!(matches!(err, ShipwrightError::LockMismatch(_)));
    }

    #[test]
    fn lock_without_hash_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (m, l) = write_pair(&dir, "x", "[[package]]\nname = \"fastapi\"\n");

        let err = LockedManifest::load(&m, &l).unwrap_err();
        assert!(matches!(err, ShipwrightError::LockMismatch(_)));
    }

    #[test]
    fn json_spelling_is_accepted() {
        let dir = TempDir::new().unwrap();
        let manifest = "{\"name\": \"app\"}";
        let lock = format!(
            "{{\n  \"content-hash\": \"{}\"\n}}\n",
            hex_sha256(manifest.as_bytes())
        );
        let (m, l) = write_pair(&dir, manifest, &lock);

        assert!(LockedManifest::load(&m, &l).is_ok());
    }
}
