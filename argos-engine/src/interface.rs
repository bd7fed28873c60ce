//! Interface state transitions

use argos_capture::InterfaceProbe;
use argos_core::{Error, Result};
use std::sync::Arc;
use tracing::info;

use crate::command::{argv, run_command, CommandRunner};

/// Existence checks and up/down transitions for single interfaces
#[derive(Clone)]
pub struct InterfaceController {
    runner: Arc<dyn CommandRunner>,
    probe: Arc<dyn InterfaceProbe>,
}

impl InterfaceController {
    pub fn new(runner: Arc<dyn CommandRunner>, probe: Arc<dyn InterfaceProbe>) -> Self {
        Self { runner, probe }
    }

    pub(crate) fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn probe(&self) -> Arc<dyn InterfaceProbe> {
        Arc::clone(&self.probe)
    }

    /// Check whether `name` exists; never fails
    pub async fn exists(&self, name: &str) -> bool {
        self.probe.exists(name).await
    }

    async fn ensure_exists(&self, name: &str) -> Result<()> {
        if self.exists(name).await {
            Ok(())
        } else {
            Err(Error::InterfaceNotFound(name.to_string()))
        }
    }

    /// Bring `name` up, optionally enabling promiscuous mode
    pub async fn bring_up(&self, name: &str, promiscuous: bool) -> Result<()> {
        self.ensure_exists(name).await?;

        let mut cmd = argv(&["ip", "link", "set", name, "up"]);
        if promiscuous {
            cmd.extend(argv(&["promisc", "on"]));
        }

        run_command(
            self.runner(),
            &cmd,
            &format!("Failed to bring up interface {}", name),
        )
        .await?;
        info!(interface = %name, promiscuous, "Interface brought up successfully");
        Ok(())
    }

    /// Bring `name` down
    pub async fn bring_down(&self, name: &str) -> Result<()> {
        self.ensure_exists(name).await?;

        run_command(
            self.runner(),
            &argv(&["ip", "link", "set", name, "down"]),
            &format!("Failed to bring down interface {}", name),
        )
        .await?;
        info!(interface = %name, "Interface brought down successfully");
        Ok(())
    }

    /// Check every name, failing on the first one that is missing
    pub async fn validate_all<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        for name in names {
            self.ensure_exists(name.as_ref()).await?;
        }
        Ok(())
    }
}
