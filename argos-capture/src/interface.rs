//! Network interface enumeration and existence probes

use argos_core::{Error, Result};
use async_trait::async_trait;
use pnet_datalink::{self, NetworkInterface};
use std::net::IpAddr;
use std::path::PathBuf;

/// Information about a network interface
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    /// Interface name (e.g., "eth0", "wlan0")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// MAC address if available
    pub mac: Option<String>,
    /// List of IP addresses assigned to this interface
    pub ips: Vec<IpAddr>,
    /// Whether the interface is up
    pub is_up: bool,
    /// Whether the interface is a loopback
    pub is_loopback: bool,
    /// Kernel interface index
    pub index: u32,
}

impl From<&NetworkInterface> for InterfaceInfo {
    fn from(iface: &NetworkInterface) -> Self {
        InterfaceInfo {
            name: iface.name.clone(),
            description: iface.description.clone(),
            mac: iface.mac.map(|mac| mac.to_string()),
            ips: iface.ips.iter().map(|network| network.ip()).collect(),
            is_up: iface.is_up(),
            is_loopback: iface.is_loopback(),
            index: iface.index,
        }
    }
}

impl InterfaceInfo {
    /// Check if the interface is suitable for packet capture
    pub fn is_capture_capable(&self) -> bool {
        self.is_up && !self.is_loopback
    }
}

/// List all available network interfaces
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>> {
    let interfaces = pnet_datalink::interfaces();

    if interfaces.is_empty() {
        return Err(Error::Interface(
            "No network interfaces found. Are you running with sufficient privileges?".to_string(),
        ));
    }

    Ok(interfaces.iter().map(InterfaceInfo::from).collect())
}

/// Get information about a specific interface by name
pub fn get_interface(name: &str) -> Result<InterfaceInfo> {
    pnet_datalink::interfaces()
        .iter()
        .find(|iface| iface.name == name)
        .map(InterfaceInfo::from)
        .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))
}

/// Kernel-side existence check for interfaces.
///
/// Never fails for a missing interface; it answers `false`.
#[async_trait]
pub trait InterfaceProbe: Send + Sync {
    async fn exists(&self, name: &str) -> bool;
}

/// Linux probe that looks for `/sys/class/net/<name>`
#[derive(Debug, Clone)]
pub struct SysfsProbe {
    root: PathBuf,
}

impl SysfsProbe {
    pub fn new() -> Self {
        Self::with_root("/sys/class/net")
    }

    /// Probe a different sysfs root (used by tests)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterfaceProbe for SysfsProbe {
    async fn exists(&self, name: &str) -> bool {
        // Names containing path separators can never be interfaces
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            return false;
        }
        let path = self.root.join(name);
        tokio::task::spawn_blocking(move || path.exists())
            .await
            .unwrap_or(false)
    }
}

/// Portable probe backed by the datalink interface list
#[derive(Debug, Clone, Copy, Default)]
pub struct DatalinkProbe;

#[async_trait]
impl InterfaceProbe for DatalinkProbe {
    async fn exists(&self, name: &str) -> bool {
        let name = name.to_string();
        tokio::task::spawn_blocking(move || {
            pnet_datalink::interfaces()
                .iter()
                .any(|iface| iface.name == name)
        })
        .await
        .unwrap_or(false)
    }
}

/// Probe suited to the host platform
pub fn default_probe() -> Box<dyn InterfaceProbe> {
    if cfg!(target_os = "linux") {
        Box::new(SysfsProbe::new())
    } else {
        Box::new(DatalinkProbe)
    }
}
