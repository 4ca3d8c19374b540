//! Boot sequence tests: migrate-then-serve ordering, the port contract,
//! and terminal state recording.

mod common;

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{FakeLauncher, ScriptedRunner};
use shipwright::boot::{BootSequencer, BootStatus};
use shipwright::config::CommandSpec;
use shipwright::env::Environment;
use shipwright::errors::ShipwrightError;
use shipwright::image::ImageManifest;
use shipwright::layout::HomeLayout;
use shipwright::store::{BuildStore, Database};
use tempfile::TempDir;

struct Fixture {
    _tmp: TempDir,
    home: HomeLayout,
    store: BuildStore,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let home = HomeLayout::new(tmp.path().join("home"));
    home.prepare().unwrap();
    let store = BuildStore::new(Database::open(&home.db_path()).unwrap());
    Fixture {
        _tmp: tmp,
        home,
        store,
    }
}

fn manifest(port: u16) -> ImageManifest {
    ImageManifest {
        name: "api".into(),
        build_id: "01BUILD".into(),
        created_at: Utc::now(),
        layers: Vec::new(),
        env: Environment::new(),
        workdir: "/usr/app".into(),
        exposed_port: port,
        migrate: CommandSpec::new("alembic", ["upgrade", "head"]),
        serve: CommandSpec::new("uvicorn", ["app.main:app"]),
    }
}

fn sequencer(
    fx: &Fixture,
    port: u16,
    runner: Arc<ScriptedRunner>,
    launcher: Arc<FakeLauncher>,
) -> BootSequencer {
    BootSequencer::new(
        manifest(port),
        fx.home.image_layout("api"),
        runner,
        launcher,
        fx.store.clone(),
    )
}

#[tokio::test]
async fn migrates_then_serves_on_the_declared_port() {
    let fx = fixture();
    let runner = Arc::new(ScriptedRunner::new());
    let launcher = Arc::new(FakeLauncher::serving());
    let port = launcher.port();
    let seq = sequencer(&fx, port, Arc::clone(&runner), Arc::clone(&launcher));
    let boot_id = seq.boot_id().to_string();

    let handle = seq.run(pending()).await.unwrap();
    assert_eq!(handle.status(), BootStatus::Serving);

    // Migration ran, and ran before the service was launched.
    assert_eq!(runner.programs(), ["alembic"]);
    let launches = launcher.launches();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].program, "uvicorn");
    // The network contract is appended to the serve command.
    let tail: Vec<&str> = launches[0].args.iter().rev().take(4).rev().map(String::as_str).collect();
    let port_arg = port.to_string();
    assert_eq!(tail, ["--host", "0.0.0.0", "--port", port_arg.as_str()]);

    let record = fx.store.get_boot(&boot_id).unwrap().unwrap();
    assert_eq!(record.status, "serving");
    assert_eq!(record.pid, Some(4242));
}

#[tokio::test]
async fn migration_failure_never_launches_the_service() {
    let fx = fixture();
    let runner = Arc::new(ScriptedRunner::new().fail("alembic", Some(1)));
    let launcher = Arc::new(FakeLauncher::serving());
    let seq = sequencer(&fx, launcher.port(), runner, Arc::clone(&launcher));
    let boot_id = seq.boot_id().to_string();

    let err = seq.run(pending()).await.unwrap_err();
    assert!(matches!(err, ShipwrightError::Migration(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(launcher.launches().is_empty());

    let record = fx.store.get_boot(&boot_id).unwrap().unwrap();
    assert_eq!(record.status, "failed");
}

#[tokio::test]
async fn termination_during_migration_interrupts_the_boot() {
    let fx = fixture();
    let runner = Arc::new(ScriptedRunner::new().hang("alembic"));
    let launcher = Arc::new(FakeLauncher::serving());
    let seq = sequencer(&fx, launcher.port(), runner, Arc::clone(&launcher));
    let boot_id = seq.boot_id().to_string();

    let err = seq.run(async {}).await.unwrap_err();
    assert!(matches!(err, ShipwrightError::Interrupted));
    assert_eq!(err.exit_code(), 130);
    assert!(launcher.launches().is_empty());

    let record = fx.store.get_boot(&boot_id).unwrap().unwrap();
    assert_eq!(record.status, "interrupted");
}

#[tokio::test]
async fn service_that_never_binds_fails_within_the_window() {
    let fx = fixture();
    let runner = Arc::new(ScriptedRunner::new());
    let launcher = Arc::new(FakeLauncher::never_binding());
    let seq = sequencer(&fx, launcher.port(), runner, Arc::clone(&launcher))
        .startup_window(Duration::from_millis(300));
    let boot_id = seq.boot_id().to_string();

    let err = seq.run(pending()).await.unwrap_err();
    assert!(matches!(err, ShipwrightError::Launch(_)));
    assert_eq!(err.exit_code(), 13);

    let record = fx.store.get_boot(&boot_id).unwrap().unwrap();
    assert_eq!(record.status, "failed");
}

#[tokio::test]
async fn service_death_during_startup_is_a_crash() {
    let fx = fixture();
    let runner = Arc::new(ScriptedRunner::new());
    let launcher = Arc::new(FakeLauncher::crashing(Some(3)));
    let seq = sequencer(&fx, launcher.port(), runner, Arc::clone(&launcher));
    let boot_id = seq.boot_id().to_string();

    let err = seq.run(pending()).await.unwrap_err();
    assert!(matches!(err, ShipwrightError::Crashed(_)));
    assert_eq!(err.exit_code(), 3);

    let record = fx.store.get_boot(&boot_id).unwrap().unwrap();
    assert_eq!(record.status, "crashed");
}

#[tokio::test]
async fn clean_service_exit_resolves_wait() {
    let fx = fixture();
    let runner = Arc::new(ScriptedRunner::new());
    let launcher = Arc::new(FakeLauncher::serving());
    let exit = launcher.exit_slot();
    let seq = sequencer(&fx, launcher.port(), runner, Arc::clone(&launcher));
    let boot_id = seq.boot_id().to_string();

    let mut handle = seq.run(pending()).await.unwrap();
    *exit.lock() = Some(Some(0));
    assert_eq!(handle.wait().await.unwrap(), 0);

    let record = fx.store.get_boot(&boot_id).unwrap().unwrap();
    assert_eq!(record.status, "stopped");
    assert_eq!(record.exit_code, Some(0));
}

#[tokio::test]
async fn crash_while_serving_surfaces_the_exit_code() {
    let fx = fixture();
    let runner = Arc::new(ScriptedRunner::new());
    let launcher = Arc::new(FakeLauncher::serving());
    let exit = launcher.exit_slot();
    let seq = sequencer(&fx, launcher.port(), runner, Arc::clone(&launcher));
    let boot_id = seq.boot_id().to_string();

    let mut handle = seq.run(pending()).await.unwrap();
    *exit.lock() = Some(Some(9));
    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, ShipwrightError::Crashed(_)));
    assert_eq!(err.exit_code(), 9);

    let record = fx.store.get_boot(&boot_id).unwrap().unwrap();
    assert_eq!(record.status, "crashed");
    assert_eq!(record.exit_code, Some(9));
}

#[tokio::test]
async fn termination_while_serving_stops_the_service() {
    let fx = fixture();
    let runner = Arc::new(ScriptedRunner::new());
    let launcher = Arc::new(FakeLauncher::serving());
    let exit = launcher.exit_slot();
    let seq = sequencer(&fx, launcher.port(), runner, Arc::clone(&launcher));
    let boot_id = seq.boot_id().to_string();

    let mut handle = seq.run(pending()).await.unwrap();
    assert_eq!(handle.wait_with_shutdown(async {}).await.unwrap(), 0);
    assert!(exit.lock().is_some());

    let record = fx.store.get_boot(&boot_id).unwrap().unwrap();
    assert_eq!(record.status, "stopped");
}
