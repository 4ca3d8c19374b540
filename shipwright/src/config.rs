//! Build specification.
//!
//! A `BuildSpec` is the declarative input to the image build: which system
//! packages to provision, how to install the dependency manager, where the
//! manifest/lock pair lives, what to copy, which directories must exist, the
//! network contract, and the migrate/serve commands replayed at boot.
//!
//! Defaults mirror the service this tool grew out of: a poetry-managed
//! FastAPI app under `/usr/app`, migrated with alembic and served by uvicorn
//! on port 8000.

use crate::env::Environment;
use crate::errors::{ShipwrightError, ShipwrightResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One command line, resolved at build time and replayed at boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Which of the two image variants to build.
///
/// `Development` is a strict superset of `Production`: it additionally
/// installs the declared test packages and pre-creates the migration
/// versions directory so new revisions can be generated inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildProfile {
    #[default]
    Production,
    Development,
}

/// System package provisioning for the base runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionSpec {
    /// Package installer invocation prefix (e.g. `apt-get install -y`).
    pub installer: CommandSpec,
    /// Packages required by every profile (compiler toolchain, transfer utility).
    pub packages: Vec<String>,
    /// Additional packages for the development profile.
    #[serde(default)]
    pub dev_packages: Vec<String>,
}

impl Default for ProvisionSpec {
    fn default() -> Self {
        Self {
            installer: CommandSpec::new("apt-get", ["install", "-y", "--no-install-recommends"]),
            packages: vec!["build-essential".into(), "curl".into()],
            dev_packages: Vec::new(),
        }
    }
}

/// Dependency manager installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainSpec {
    /// Remote installer command (fetch-and-run).
    pub installer: CommandSpec,
    /// Directory the tool installs its executable into; appended to `PATH`.
    pub bin_dir: PathBuf,
}

impl Default for ToolchainSpec {
    fn default() -> Self {
        Self {
            installer: CommandSpec::new(
                "sh",
                ["-c", "curl -sSL https://install.python-poetry.org | python3 -"],
            ),
            bin_dir: PathBuf::from("/root/.local/bin"),
        }
    }
}

/// Dependency manifest/lock pair and the dependency-only install command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySpec {
    pub manifest: PathBuf,
    pub lockfile: PathBuf,
    /// Installs all transitive dependencies without installing the project's
    /// own package.
    pub install: CommandSpec,
    /// Extra install command for the development profile's test tooling.
    #[serde(default)]
    pub dev_install: Option<CommandSpec>,
}

impl Default for DependencySpec {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("pyproject.toml"),
            lockfile: PathBuf::from("poetry.lock"),
            install: CommandSpec::new("poetry", ["install", "--no-root", "--no-interaction"]),
            dev_install: None,
        }
    }
}

/// Boot-time contract: migrate, then serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootSpec {
    /// Apply all pending schema migrations up to the latest version.
    pub migrate: CommandSpec,
    /// Launch the service process. The port and bind address are appended
    /// by the builder from the network contract.
    pub serve: CommandSpec,
}

impl Default for BootSpec {
    fn default() -> Self {
        Self {
            migrate: CommandSpec::new("alembic", ["upgrade", "head"]),
            serve: CommandSpec::new("uvicorn", ["app.main:app"]),
        }
    }
}

/// Declarative input for one image build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Image name; keys the staged image directory and the store rows.
    pub name: String,
    #[serde(default)]
    pub profile: BuildProfile,
    /// Project source tree copied into the image.
    pub source_dir: PathBuf,
    /// Working directory inside the image.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    /// TCP port the service will accept connections on. Declared, not bound.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub provision: ProvisionSpec,
    #[serde(default)]
    pub toolchain: ToolchainSpec,
    #[serde(default)]
    pub dependencies: DependencySpec,
    /// Directories that must exist in the image working directory
    /// (migration versioning artifacts and the like).
    #[serde(default = "default_runtime_dirs")]
    pub runtime_dirs: Vec<PathBuf>,
    /// Extra directories created only for the development profile.
    #[serde(default)]
    pub dev_runtime_dirs: Vec<PathBuf>,
    /// Environment overrides layered on top of the defaults.
    #[serde(default)]
    pub env: Environment,
    #[serde(default)]
    pub boot: BootSpec,
}

fn default_workdir() -> PathBuf {
    PathBuf::from("/usr/app")
}

fn default_port() -> u16 {
    8000
}

fn default_runtime_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("migrations")]
}

impl BuildSpec {
    pub fn new(name: impl Into<String>, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            profile: BuildProfile::default(),
            source_dir: source_dir.into(),
            workdir: default_workdir(),
            port: default_port(),
            provision: ProvisionSpec::default(),
            toolchain: ToolchainSpec::default(),
            dependencies: DependencySpec::default(),
            runtime_dirs: default_runtime_dirs(),
            dev_runtime_dirs: vec![PathBuf::from("migrations/versions")],
            env: Environment::new(),
            boot: BootSpec::default(),
        }
    }

    pub fn load(path: &Path) -> ShipwrightResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ShipwrightError::Config(format!("cannot read build spec {}: {}", path.display(), e))
        })?;
        let spec: BuildSpec = serde_json::from_str(&raw).map_err(|e| {
            ShipwrightError::Config(format!("invalid build spec {}: {}", path.display(), e))
        })?;
        spec.sanitize()?;
        Ok(spec)
    }

    /// Validate early, before any expensive work.
    pub fn sanitize(&self) -> ShipwrightResult<()> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ShipwrightError::Config(format!(
                "image name {:?} must be non-empty [a-zA-Z0-9_-]",
                self.name
            )));
        }
        if !self.source_dir.is_dir() {
            return Err(ShipwrightError::Config(format!(
                "source directory {} does not exist",
                self.source_dir.display()
            )));
        }
        if !self.workdir.is_absolute() {
            return Err(ShipwrightError::Config(format!(
                "workdir must be absolute, got {}",
                self.workdir.display()
            )));
        }
        if self.port == 0 {
            return Err(ShipwrightError::Config("port must be non-zero".into()));
        }
        Ok(())
    }

    /// The full environment record baked into the image: fixed interpreter
    /// flags first, then user overrides. `PATH` is extended later by the
    /// toolchain step.
    pub fn build_environment(&self) -> Environment {
        let mut env = Environment::new();
        env.set("PYTHONDONTWRITEBYTECODE", "1");
        env.set("PYTHONUNBUFFERED", "1");
        env.set("PIP_NO_CACHE_DIR", "1");
        env.set("POETRY_VIRTUALENVS_CREATE", "false");
        env.merge(&self.env);
        env
    }

    /// Packages to provision for the selected profile.
    pub fn provision_packages(&self) -> Vec<String> {
        let mut packages = self.provision.packages.clone();
        if self.profile == BuildProfile::Development {
            packages.extend(self.provision.dev_packages.iter().cloned());
        }
        packages
    }

    /// Runtime directories for the selected profile.
    pub fn profile_runtime_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.runtime_dirs.clone();
        if self.profile == BuildProfile::Development {
            dirs.extend(self.dev_runtime_dirs.iter().cloned());
        }
        dirs
    }
}
