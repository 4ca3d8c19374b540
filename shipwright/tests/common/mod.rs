//! Shared test doubles: a scripted tool runner and a fake service launcher.

use std::collections::{HashMap, HashSet};
use std::net::TcpListener;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shipwright::errors::ShipwrightResult;
use shipwright::runner::{Invocation, ServiceHandler, ServiceLauncher, ToolRunner};

/// Records every invocation and returns scripted exit codes instead of
/// spawning anything.
#[derive(Default)]
pub struct ScriptedRunner {
    invocations: Mutex<Vec<Invocation>>,
    exit_codes: Mutex<HashMap<String, Option<i32>>>,
    hanging: Mutex<HashSet<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a non-default exit for every invocation of `program`.
    pub fn fail(self, program: &str, code: Option<i32>) -> Self {
        self.exit_codes.lock().insert(program.to_string(), code);
        self
    }

    /// Make every invocation of `program` block forever.
    pub fn hang(self, program: &str) -> Self {
        self.hanging.lock().insert(program.to_string());
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.invocations
            .lock()
            .iter()
            .map(|i| i.program.clone())
            .collect()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> ShipwrightResult<Option<i32>> {
        self.invocations.lock().push(invocation.clone());
        if self.hanging.lock().contains(&invocation.program) {
            std::future::pending::<()>().await;
        }
        let code = self
            .exit_codes
            .lock()
            .get(&invocation.program)
            .copied()
            .unwrap_or(Some(0));
        Ok(code)
    }
}

/// Exit slot shared between a fake handler and the test driving it.
pub type ExitSlot = Arc<Mutex<Option<Option<i32>>>>;

/// Launcher that hands out a [`FakeHandler`] instead of spawning a process.
///
/// In the serving variant a real listener is bound on a free port so the
/// sequencer's port probe observes genuine accepts.
pub struct FakeLauncher {
    listener: Mutex<Option<TcpListener>>,
    port: u16,
    exit: ExitSlot,
    launches: Mutex<Vec<Invocation>>,
}

impl FakeLauncher {
    /// A service that binds its port and keeps running.
    pub fn serving() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        Self {
            listener: Mutex::new(Some(listener)),
            port,
            exit: Arc::new(Mutex::new(None)),
            launches: Mutex::new(Vec::new()),
        }
    }

    /// A service that never binds anything and stays alive.
    pub fn never_binding() -> Self {
        Self {
            listener: Mutex::new(None),
            port: 1,
            exit: Arc::new(Mutex::new(None)),
            launches: Mutex::new(Vec::new()),
        }
    }

    /// A service that dies immediately with `code` before binding.
    pub fn crashing(code: Option<i32>) -> Self {
        Self {
            listener: Mutex::new(None),
            port: 1,
            exit: Arc::new(Mutex::new(Some(code))),
            launches: Mutex::new(Vec::new()),
        }
    }

    /// Port the serving variant listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Shared exit slot; setting it makes the handler report the exit.
    pub fn exit_slot(&self) -> ExitSlot {
        Arc::clone(&self.exit)
    }

    pub fn launches(&self) -> Vec<Invocation> {
        self.launches.lock().clone()
    }
}

impl ServiceLauncher for FakeLauncher {
    fn launch(&self, invocation: &Invocation) -> ShipwrightResult<Box<dyn ServiceHandler>> {
        self.launches.lock().push(invocation.clone());
        Ok(Box::new(FakeHandler {
            listener: self.listener.lock().take(),
            exit: Arc::clone(&self.exit),
        }))
    }
}

pub struct FakeHandler {
    // Held so the fake service's port stays bound until stop.
    listener: Option<TcpListener>,
    exit: ExitSlot,
}

#[async_trait]
impl ServiceHandler for FakeHandler {
    async fn stop(&mut self) -> ShipwrightResult<()> {
        self.listener.take();
        let mut exit = self.exit.lock();
        if exit.is_none() {
            *exit = Some(Some(0));
        }
        Ok(())
    }

    fn is_running(&mut self) -> bool {
        self.exit.lock().is_none()
    }

    fn pid(&self) -> u32 {
        4242
    }

    fn try_wait(&mut self) -> ShipwrightResult<Option<Option<i32>>> {
        Ok(*self.exit.lock())
    }

    fn wait(&mut self) -> ShipwrightResult<Option<i32>> {
        loop {
            if let Some(code) = *self.exit.lock() {
                return Ok(code);
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }
}
