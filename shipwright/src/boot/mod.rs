//! Container boot sequencing.
//!
//! Per container start, in strict order:
//!
//! 1. Apply all pending schema migrations ("upgrade to head"). Non-zero
//!    exit halts the boot entirely; the service is never launched.
//! 2. Launch the service process bound to the declared port and wait for
//!    the port to accept connections within a bounded startup window.
//!
//! The two are chained on checked exit status - a blocking, synchronous
//! dependency, never a parallel fork. A termination request during (1)
//! kills the migration child and ends the boot without ever starting (2).

mod state;

pub use state::{BootState, BootStatus};

use crate::errors::{ShipwrightError, ShipwrightResult, ToolExit};
use crate::image::ImageManifest;
use crate::layout::ImageLayout;
use crate::runner::{Invocation, ServiceHandler, ServiceLauncher, ToolRunner};
use crate::store::BuildStore;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use ulid::Ulid;

pub const DEFAULT_STARTUP_WINDOW: Duration = Duration::from_secs(30);

const PORT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Boots one container instance from a built image.
pub struct BootSequencer {
    manifest: ImageManifest,
    image: ImageLayout,
    runner: Arc<dyn ToolRunner>,
    launcher: Arc<dyn ServiceLauncher>,
    store: BuildStore,
    startup_window: Duration,
    boot_id: String,
    state: BootState,
}

impl BootSequencer {
    pub fn new(
        manifest: ImageManifest,
        image: ImageLayout,
        runner: Arc<dyn ToolRunner>,
        launcher: Arc<dyn ServiceLauncher>,
        store: BuildStore,
    ) -> Self {
        Self {
            manifest,
            image,
            runner,
            launcher,
            store,
            startup_window: DEFAULT_STARTUP_WINDOW,
            boot_id: Ulid::new().to_string(),
            state: BootState::new(),
        }
    }

    pub fn startup_window(mut self, window: Duration) -> Self {
        self.startup_window = window;
        self
    }

    pub fn boot_id(&self) -> &str {
        &self.boot_id
    }

    /// Run the boot sequence to the `Serving` state.
    ///
    /// `shutdown` is an external termination request (e.g. SIGTERM). If it
    /// resolves while migrations are running, the migration child is killed
    /// and the service is never launched.
    pub async fn run<F>(mut self, shutdown: F) -> ShipwrightResult<BootHandle>
    where
        F: Future<Output = ()> + Send,
    {
        self.store
            .record_boot_started(&self.boot_id, &self.manifest.name)?;

        let outcome = self.run_inner(shutdown).await;
        if let Err(err) = &outcome {
            let status = self.state.status.as_str();
            let _ = self
                .store
                .update_boot(&self.boot_id, status, self.state.pid, Some(err.exit_code()));
        }
        outcome
    }

    async fn run_inner<F>(&mut self, shutdown: F) -> ShipwrightResult<BootHandle>
    where
        F: Future<Output = ()> + Send,
    {
        // Step (i): schema migration, to completion, before anything serves.
        self.state.transition(BootStatus::Migrating)?;
        self.store
            .update_boot(&self.boot_id, self.state.status.as_str(), None, None)?;

        let migrate = self.migrate_invocation();
        tracing::info!(boot_id = %self.boot_id, tool = %migrate.display_name(), "applying schema migrations");

        let runner = Arc::clone(&self.runner);
        let migrate_run = runner.run(&migrate);
        let code = tokio::select! {
            code = migrate_run => code?,
            _ = shutdown => {
                // Dropping the migration future kills its child. The
                // service must never start after a termination request.
                tracing::warn!(boot_id = %self.boot_id, "termination requested during migration");
                self.state.transition(BootStatus::Interrupted)?;
                return Err(ShipwrightError::Interrupted);
            }
        };

        if code != Some(0) {
            self.state.transition(BootStatus::Failed)?;
            return Err(ShipwrightError::Migration(ToolExit::new(
                migrate.display_name(),
                code,
            )));
        }
        tracing::info!(boot_id = %self.boot_id, "migrations applied");

        // Step (ii): launch the service, then hold it to the port contract.
        let serve = self.serve_invocation();
        let mut handler = self.launcher.launch(&serve)?;
        self.state.pid = Some(handler.pid());

        if let Err(err) = self
            .wait_for_port(&mut handler, &serve.program)
            .await
        {
            let _ = handler.stop().await;
            // Crashed if the process died on its own; launch failure keeps
            // its own class. Either way the boot is terminal.
            let status = match err {
                ShipwrightError::Crashed(_) => BootStatus::Crashed,
                _ => BootStatus::Failed,
            };
            self.state.transition(status)?;
            return Err(err);
        }

        self.state.transition(BootStatus::Serving)?;
        self.store.update_boot(
            &self.boot_id,
            self.state.status.as_str(),
            self.state.pid,
            None,
        )?;
        tracing::info!(
            boot_id = %self.boot_id,
            pid = ?self.state.pid,
            port = self.manifest.exposed_port,
            "service is serving"
        );

        Ok(BootHandle {
            boot_id: self.boot_id.clone(),
            state: self.state.clone(),
            handler,
            store: self.store.clone(),
            service_name: serve.program,
        })
    }

    fn migrate_invocation(&self) -> Invocation {
        Invocation::new(&self.manifest.migrate.program)
            .args(self.manifest.migrate.args.iter().cloned())
            .env(self.manifest.env.clone())
            .cwd(self.image.staged_path(&self.manifest.workdir))
    }

    /// The serve command with the declared network contract appended:
    /// bind all interfaces on the exposed port.
    fn serve_invocation(&self) -> Invocation {
        Invocation::new(&self.manifest.serve.program)
            .args(self.manifest.serve.args.iter().cloned())
            .args([
                "--host".to_string(),
                "0.0.0.0".to_string(),
                "--port".to_string(),
                self.manifest.exposed_port.to_string(),
            ])
            .env(self.manifest.env.clone())
            .cwd(self.image.staged_path(&self.manifest.workdir))
    }

    /// Poll until the service accepts a TCP connection, it exits, or the
    /// startup window elapses.
    async fn wait_for_port(
        &self,
        handler: &mut Box<dyn ServiceHandler>,
        service_name: &str,
    ) -> ShipwrightResult<()> {
        let deadline = Instant::now() + self.startup_window;
        let addr = format!("127.0.0.1:{}", self.manifest.exposed_port);

        loop {
            if let Some(code) = handler.try_wait()? {
                return Err(ShipwrightError::Crashed(ToolExit::new(service_name, code)));
            }
            if TcpStream::connect(&addr).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ShipwrightError::Launch(format!(
                    "{} did not accept connections on port {} within {:?}",
                    service_name, self.manifest.exposed_port, self.startup_window
                )));
            }
            tokio::time::sleep(PORT_POLL_INTERVAL).await;
        }
    }
}

/// Handle over a serving container instance.
pub struct BootHandle {
    boot_id: String,
    state: BootState,
    handler: Box<dyn ServiceHandler>,
    store: BuildStore,
    service_name: String,
}

impl std::fmt::Debug for BootHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootHandle")
            .field("boot_id", &self.boot_id)
            .field("status", &self.state.status)
            .finish_non_exhaustive()
    }
}

impl BootHandle {
    pub fn boot_id(&self) -> &str {
        &self.boot_id
    }

    pub fn pid(&self) -> u32 {
        self.handler.pid()
    }

    pub fn status(&self) -> BootStatus {
        self.state.status
    }

    /// Block until the service process exits.
    ///
    /// A clean exit resolves to `Ok(0)`; any other exit is a crash carrying
    /// the service's exit code.
    pub async fn wait(&mut self) -> ShipwrightResult<i32> {
        let code = loop {
            match self.handler.try_wait()? {
                Some(code) => break code,
                None => tokio::time::sleep(EXIT_POLL_INTERVAL).await,
            }
        };
        self.settle(code)
    }

    /// Wait for the service, shutting it down if `shutdown` resolves first.
    pub async fn wait_with_shutdown<F>(&mut self, shutdown: F) -> ShipwrightResult<i32>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        loop {
            if let Some(code) = self.handler.try_wait()? {
                return self.settle(code);
            }
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(boot_id = %self.boot_id, "termination requested, stopping service");
                    self.shutdown().await?;
                    return Ok(0);
                }
                _ = tokio::time::sleep(EXIT_POLL_INTERVAL) => {}
            }
        }
    }

    fn settle(&mut self, code: Option<i32>) -> ShipwrightResult<i32> {
        if code == Some(0) {
            self.finish(BootStatus::Stopped, Some(0))?;
            Ok(0)
        } else {
            self.finish(BootStatus::Crashed, code)?;
            Err(ShipwrightError::Crashed(ToolExit::new(
                self.service_name.clone(),
                code,
            )))
        }
    }

    /// Terminate the service process.
    pub async fn shutdown(&mut self) -> ShipwrightResult<()> {
        if self.state.status.is_terminal() {
            return Ok(());
        }
        self.handler.stop().await?;
        self.finish(BootStatus::Stopped, None)?;
        Ok(())
    }

    fn finish(&mut self, status: BootStatus, exit_code: Option<i32>) -> ShipwrightResult<()> {
        self.state.transition(status)?;
        self.state.exit_code = exit_code;
        self.store.update_boot(
            &self.boot_id,
            status.as_str(),
            self.state.pid,
            exit_code,
        )?;
        Ok(())
    }
}
