//! Command line entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use shipwright::boot::BootSequencer;
use shipwright::build::ImageBuilder;
use shipwright::config::{BuildProfile, BuildSpec};
use shipwright::errors::ShipwrightResult;
use shipwright::image::ImageManifest;
use shipwright::layout::HomeLayout;
use shipwright::runner::{ProcessLauncher, ProcessRunner};
use shipwright::store::{BuildStore, Database};

#[derive(Parser)]
#[command(name = "shipwright", version, about = "Build and boot service images")]
struct Cli {
    /// Override the state directory (default: $SHIPWRIGHT_HOME or ~/.shipwright).
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an image from a build spec.
    Build {
        /// Path to the JSON build spec.
        #[arg(long)]
        spec: PathBuf,
        /// Override the spec's build profile.
        #[arg(long, value_parser = parse_profile)]
        profile: Option<BuildProfile>,
    },
    /// Boot a built image: migrate, then serve until it exits.
    Run {
        /// Image name.
        image: String,
        /// Seconds the service has to accept connections after launch.
        #[arg(long, default_value_t = 30)]
        startup_window: u64,
    },
    /// Print a built image's manifest.
    Inspect {
        /// Image name.
        image: String,
    },
    /// List built images.
    Images,
}

fn parse_profile(raw: &str) -> Result<BuildProfile, String> {
    match raw {
        "production" => Ok(BuildProfile::Production),
        "development" => Ok(BuildProfile::Development),
        other => Err(format!(
            "unknown profile {other:?}, expected production or development"
        )),
    }
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("shipwright: {err}");
            err.exit_code()
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> ShipwrightResult<i32> {
    let home = HomeLayout::resolve(cli.home.clone())?;
    home.prepare()?;
    let _log_guard = shipwright::logging::init(&home.logs_dir());

    let store = BuildStore::new(Database::open(&home.db_path())?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(shipwright::errors::ShipwrightError::Io)?;

    match cli.command {
        Command::Build { spec, profile } => {
            let mut spec = BuildSpec::load(&spec)?;
            if let Some(profile) = profile {
                spec.profile = profile;
            }
            let builder = ImageBuilder::new(home, store, Arc::new(ProcessRunner));
            let manifest = runtime.block_on(builder.build(spec))?;
            println!("built {} ({})", manifest.name, manifest.build_id);
            Ok(0)
        }
        Command::Run {
            image,
            startup_window,
        } => {
            let layout = home.image_layout(&image);
            let manifest = ImageManifest::load(&layout.manifest_path())?;
            let sequencer = BootSequencer::new(
                manifest,
                layout,
                Arc::new(ProcessRunner),
                Arc::new(ProcessLauncher),
                store,
            )
            .startup_window(Duration::from_secs(startup_window));

            runtime.block_on(async {
                let mut handle = sequencer.run(termination_signal()).await?;
                println!("serving {} (boot {}, pid {})", image, handle.boot_id(), handle.pid());
                handle.wait_with_shutdown(termination_signal()).await
            })
        }
        Command::Inspect { image } => {
            let layout = home.image_layout(&image);
            let manifest = ImageManifest::load(&layout.manifest_path())?;
            let rendered = serde_json::to_string_pretty(&manifest)
                .map_err(|e| shipwright::errors::ShipwrightError::Internal(e.to_string()))?;
            println!("{rendered}");
            Ok(0)
        }
        Command::Images => {
            for record in store.list_images()? {
                println!(
                    "{}\t{}\t{}\t{}",
                    record.image, record.profile, record.status, record.created_at
                );
            }
            Ok(0)
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(err) => {
            tracing::warn!(error = %err, "cannot install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}
