//! Bridge lifecycle management
//!
//! A [`BridgeLifecycleManager`] creates a bridge device, attaches the member
//! interfaces and brings the bridge up. Any failure while doing so tears the
//! partially built bridge down again before the error is returned, so a
//! successful `create` is the only way to observe a live bridge.
//!
//! Teardown is always best effort: failures are logged, never returned.
//! [`BridgeSession`] ties the bridge to a scope and guarantees teardown on
//! every exit path, including cancellation.

use argos_core::{ArgosConfig, Error, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::command::{argv, run_command};
use crate::interface::InterfaceController;

/// Bridge device and its ordered member interfaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSpec {
    pub name: String,
    pub members: Vec<String>,
}

impl BridgeSpec {
    pub fn new(name: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    /// Bridge described by the configuration, if a name is configured
    pub fn from_config(config: &ArgosConfig) -> Option<Self> {
        config
            .bridge_name
            .as_ref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| Self::new(name.clone(), config.interfaces.clone()))
    }

    /// A spec with no name describes no bridge at all
    pub fn is_configured(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// Creates and destroys at most one bridge at a time
pub struct BridgeLifecycleManager {
    controller: InterfaceController,
    promiscuous: bool,
    live: Arc<Mutex<Option<String>>>,
}

/// Tears a half-built bridge down if `create` is abandoned mid-way
struct CreateGuard {
    controller: InterfaceController,
    live: Arc<Mutex<Option<String>>>,
    name: String,
    armed: bool,
}

impl CreateGuard {
    fn disarm(mut self) {
        self.armed = false;
    }

    /// Nothing was created; give up the claim on the bridge name
    fn release(mut self) {
        self.armed = false;
        clear_live(&self.live, &self.name);
    }
}

impl Drop for CreateGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let controller = self.controller.clone();
        let live = Arc::clone(&self.live);
        let name = self.name.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(bridge = %name, "Bridge creation abandoned, scheduling teardown");
                handle.spawn(async move {
                    teardown(&controller, &name).await;
                    clear_live(&live, &name);
                });
            }
            Err(_) => {
                warn!(bridge = %name, "Bridge creation abandoned outside a runtime, bridge left in place");
                clear_live(&live, &name);
            }
        }
    }
}

fn clear_live(live: &Mutex<Option<String>>, name: &str) {
    let mut live = live.lock();
    if live.as_deref() == Some(name) {
        *live = None;
    }
}

/// Bring the bridge down and delete it, logging instead of failing
async fn teardown(controller: &InterfaceController, name: &str) {
    if let Err(e) = controller.bring_down(name).await {
        warn!(bridge = %name, error = %e, "Error bringing bridge down");
    }

    match run_command(
        controller.runner(),
        &argv(&["ip", "link", "delete", name, "type", "bridge"]),
        &format!("Failed to delete bridge {}", name),
    )
    .await
    {
        Ok(_) => info!(bridge = %name, "Bridge destroyed"),
        Err(e) => warn!(bridge = %name, error = %e, "Error destroying bridge"),
    }
}

impl BridgeLifecycleManager {
    pub fn new(controller: InterfaceController, promiscuous: bool) -> Self {
        Self {
            controller,
            promiscuous,
            live: Arc::new(Mutex::new(None)),
        }
    }

    /// Name of the bridge currently owned by this manager
    pub fn live_bridge(&self) -> Option<String> {
        self.live.lock().clone()
    }

    /// Create the bridge, attach all members concurrently and bring it up.
    ///
    /// Dropping the returned future part-way schedules teardown of whatever
    /// was already built.
    pub async fn create(&self, spec: &BridgeSpec) -> Result<()> {
        if !spec.is_configured() {
            return Err(Error::bridge("No bridge name configured"));
        }

        {
            let mut live = self.live.lock();
            if let Some(existing) = live.as_ref() {
                return Err(Error::bridge(format!(
                    "Bridge {} is already active",
                    existing
                )));
            }
            *live = Some(spec.name.clone());
        }

        let guard = CreateGuard {
            controller: self.controller.clone(),
            live: Arc::clone(&self.live),
            name: spec.name.clone(),
            armed: true,
        };

        if let Err(e) = run_command(
            self.controller.runner(),
            &argv(&["ip", "link", "add", &spec.name, "type", "bridge"]),
            &format!("Failed to create bridge {}", spec.name),
        )
        .await
        {
            guard.release();
            return Err(e);
        }

        let result = match self.attach_members(spec).await {
            Ok(()) => self.controller.bring_up(&spec.name, self.promiscuous).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                guard.disarm();
                info!(
                    bridge = %spec.name,
                    members = ?spec.members,
                    "Bridge created"
                );
                Ok(())
            }
            Err(e) => {
                warn!(bridge = %spec.name, error = %e, "Bridge creation failed, tearing down");
                self.destroy(spec).await;
                guard.disarm();
                Err(e)
            }
        }
    }

    /// Issue every attach command without waiting on the others
    async fn attach_members(&self, spec: &BridgeSpec) -> Result<()> {
        let mut attaches = JoinSet::new();
        for member in &spec.members {
            let controller = self.controller.clone();
            let cmd = argv(&["ip", "link", "set", member, "master", &spec.name]);
            let context = format!("Failed to add {} to bridge {}", member, spec.name);
            attaches.spawn(async move { run_command(controller.runner(), &cmd, &context).await });
        }

        let mut first_error = None;
        while let Some(joined) = attaches.join_next().await {
            let outcome = joined
                .map_err(|e| Error::ExecutionFailed(format!("Attach task failed: {}", e)))
                .and_then(|r| r);
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Bring the bridge down and delete it. Never fails.
    pub async fn destroy(&self, spec: &BridgeSpec) {
        if !spec.is_configured() {
            return;
        }

        teardown(&self.controller, &spec.name).await;
        clear_live(&self.live, &spec.name);
    }

    /// Create the bridge and return a guard that destroys it
    pub async fn session(self: &Arc<Self>, spec: BridgeSpec) -> Result<BridgeSession> {
        if spec.is_configured() {
            self.create(&spec).await?;
        }
        Ok(BridgeSession {
            manager: Arc::clone(self),
            spec,
            closed: false,
        })
    }

    /// Run `f` inside a bridge session, tearing the bridge down afterwards
    pub async fn scoped<F, Fut, T>(self: &Arc<Self>, spec: BridgeSpec, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session = self.session(spec).await?;
        let result = f().await;
        session.close().await;
        result
    }
}

/// Scoped bridge lifetime.
///
/// Call [`BridgeSession::close`] to tear down in place. If the session is
/// dropped without being closed (early return, panic, cancelled future),
/// teardown is spawned onto the current Tokio runtime.
pub struct BridgeSession {
    manager: Arc<BridgeLifecycleManager>,
    spec: BridgeSpec,
    closed: bool,
}

impl BridgeSession {
    pub fn spec(&self) -> &BridgeSpec {
        &self.spec
    }

    /// Destroy the bridge now
    pub async fn close(mut self) {
        self.closed = true;
        self.manager.destroy(&self.spec).await;
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        if self.closed || !self.spec.is_configured() {
            return;
        }

        let manager = Arc::clone(&self.manager);
        let spec = self.spec.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(bridge = %spec.name, "Bridge session dropped, scheduling teardown");
                handle.spawn(async move { manager.destroy(&spec).await });
            }
            Err(_) => {
                warn!(bridge = %spec.name, "Bridge session dropped outside a runtime, bridge left in place");
            }
        }
    }
}
