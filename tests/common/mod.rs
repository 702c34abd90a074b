#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::mpsc;

use rulewarden::config::ConfigFile;
use rulewarden::fs::mock::MockFileSystem;
use rulewarden::ruletest::{StreamEvent, TestRunner};
use rulewarden::supervisor::Supervisor;

pub use rulewarden_test_utils::{
    init_tracing, with_timeout, ChildControl, ChildScript, ConfigBuilder, FakeSpawner,
    PreflightGate,
};

pub fn supervisor(spawner: &FakeSpawner) -> Supervisor {
    supervisor_with(ConfigBuilder::new().build(), spawner)
}

pub fn supervisor_with(cfg: ConfigFile, spawner: &FakeSpawner) -> Supervisor {
    Supervisor::new(cfg.engine, Arc::new(spawner.clone()))
}

pub fn runner(spawner: &FakeSpawner, fs: &MockFileSystem) -> TestRunner {
    runner_with(&ConfigBuilder::new().build(), spawner, fs)
}

pub fn runner_with(cfg: &ConfigFile, spawner: &FakeSpawner, fs: &MockFileSystem) -> TestRunner {
    TestRunner::new(cfg, Arc::new(spawner.clone()), Arc::new(fs.clone()))
}

/// Drain every event still queued on a subscriber channel.
pub fn drain(rx: &mut mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
