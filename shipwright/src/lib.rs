//! Shipwright builds container-style service images and boots them.
//!
//! A build runs a fixed sequence of layer steps (system packages,
//! toolchain, locked dependencies, source tree, runtime directories,
//! network declaration), each producing a content-keyed layer so an
//! unchanged step is skipped on rebuild. A boot takes a built image,
//! applies its schema migrations to completion, and only then launches
//! the service and holds it to its declared port.

pub mod boot;
pub mod build;
pub mod config;
pub mod env;
pub mod errors;
pub mod image;
pub mod layout;
pub mod logging;
pub mod manifest;
pub mod pipeline;
pub mod runner;
pub mod store;
pub mod util;

pub use boot::{BootHandle, BootSequencer, BootState, BootStatus, DEFAULT_STARTUP_WINDOW};
pub use build::ImageBuilder;
pub use config::{BuildProfile, BuildSpec};
pub use env::Environment;
pub use errors::{ShipwrightError, ShipwrightResult};
pub use image::ImageManifest;
pub use layout::{HomeLayout, ImageLayout};
pub use runner::{Invocation, ProcessLauncher, ProcessRunner, ServiceLauncher, ToolRunner};
