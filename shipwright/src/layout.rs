//! Filesystem layout for the shipwright home directory.
//!
//! ```text
//! $SHIPWRIGHT_HOME/            (default ~/.shipwright)
//! ├── images/<name>/
//! │   ├── rootfs/              staged image filesystem
//! │   └── manifest.json        build output
//! ├── db/shipwright.db
//! ├── logs/
//! └── tmp/                     staging scratch (same filesystem as images/)
//! ```

use crate::errors::{ShipwrightError, ShipwrightResult};
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "SHIPWRIGHT_HOME";

/// Home directory layout. Immutable after construction; `prepare()` is
/// idempotent so repeated provisioning is never an error.
#[derive(Debug, Clone)]
pub struct HomeLayout {
    home_dir: PathBuf,
}

impl HomeLayout {
    pub fn new(home_dir: PathBuf) -> Self {
        Self { home_dir }
    }

    /// Resolve the home directory from `SHIPWRIGHT_HOME` or the platform
    /// home directory.
    pub fn resolve(override_dir: Option<PathBuf>) -> ShipwrightResult<Self> {
        if let Some(dir) = override_dir {
            return Ok(Self::new(dir));
        }
        if let Ok(dir) = std::env::var(HOME_ENV)
            && !dir.is_empty()
        {
            return Ok(Self::new(PathBuf::from(dir)));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| ShipwrightError::Config("cannot determine home directory".into()))?;
        Ok(Self::new(home.join(".shipwright")))
    }

    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    pub fn images_dir(&self) -> PathBuf {
        self.home_dir.join("images")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.home_dir.join("db")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home_dir.join("logs")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.home_dir.join("tmp")
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir().join("shipwright.db")
    }

    /// Create the directory tree. Safe to call any number of times.
    pub fn prepare(&self) -> ShipwrightResult<()> {
        for dir in [
            self.home_dir.clone(),
            self.images_dir(),
            self.db_dir(),
            self.logs_dir(),
            self.tmp_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                ShipwrightError::Storage(format!(
                    "failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    pub fn image_layout(&self, name: &str) -> ImageLayout {
        ImageLayout {
            image_dir: self.images_dir().join(name),
        }
    }
}

/// Layout of one staged image under `images/<name>/`.
#[derive(Debug, Clone)]
pub struct ImageLayout {
    image_dir: PathBuf,
}

impl ImageLayout {
    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn rootfs_dir(&self) -> PathBuf {
        self.image_dir.join("rootfs")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.image_dir.join("manifest.json")
    }

    /// Staged path of an absolute in-image directory such as `/usr/app`.
    pub fn staged_path(&self, in_image: &Path) -> PathBuf {
        let relative = in_image.strip_prefix("/").unwrap_or(in_image);
        self.rootfs_dir().join(relative)
    }

    pub fn prepare(&self) -> ShipwrightResult<()> {
        std::fs::create_dir_all(self.rootfs_dir()).map_err(|e| {
            ShipwrightError::Storage(format!(
                "failed to create image directory {}: {}",
                self.image_dir.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Remove the whole staged image. Used by the build cleanup guard.
    pub fn cleanup(&self) -> ShipwrightResult<()> {
        if self.image_dir.exists() {
            std::fs::remove_dir_all(&self.image_dir).map_err(|e| {
                ShipwrightError::Storage(format!(
                    "failed to remove image directory {}: {}",
                    self.image_dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}
