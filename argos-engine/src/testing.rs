//! In-process collaborators for engine tests

use argos_capture::{Capturer, InterfaceProbe};
use argos_core::{Error, Extractor, Packet, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::command::CommandRunner;

#[derive(Debug, Default, Clone)]
struct Link {
    up: bool,
    bridge: bool,
    master: Option<String>,
}

/// Stateful stand-in for the kernel link table.
///
/// Interprets the `ip link` commands the engine issues and answers
/// existence probes from the same table.
#[derive(Default)]
pub struct FakeKernel {
    links: Mutex<BTreeMap<String, Link>>,
    commands: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
}

impl FakeKernel {
    pub fn with_links(names: &[&str]) -> Arc<Self> {
        let kernel = Self::default();
        {
            let mut links = kernel.links.lock();
            for name in names {
                links.insert(name.to_string(), Link::default());
            }
        }
        Arc::new(kernel)
    }

    /// Fail every command whose command line contains `pattern`
    pub fn fail_on(&self, pattern: &str) {
        self.failures.lock().push(pattern.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn bridges(&self) -> Vec<String> {
        self.links
            .lock()
            .iter()
            .filter(|(_, link)| link.bridge)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn master_of(&self, name: &str) -> Option<String> {
        self.links.lock().get(name).and_then(|l| l.master.clone())
    }

    pub fn is_up(&self, name: &str) -> bool {
        self.links.lock().get(name).map(|l| l.up).unwrap_or(false)
    }

    fn rejected(command: &str, stderr: &str) -> Error {
        Error::Command {
            context: "Command failed".to_string(),
            command: command.to_string(),
            stderr: stderr.to_string(),
        }
    }

    fn apply(&self, command: &str, args: &[&str]) -> Result<()> {
        let mut links = self.links.lock();
        let missing = || Self::rejected(command, "Cannot find device");

        match args {
            ["ip", "link", "add", name, "type", "bridge"] => {
                if links.contains_key(*name) {
                    return Err(Self::rejected(command, "RTNETLINK answers: File exists"));
                }
                links.insert(
                    name.to_string(),
                    Link {
                        bridge: true,
                        ..Link::default()
                    },
                );
            }
            ["ip", "link", "set", name, "up", ..] => {
                links.get_mut(*name).ok_or_else(missing)?.up = true;
            }
            ["ip", "link", "set", name, "down"] => {
                links.get_mut(*name).ok_or_else(missing)?.up = false;
            }
            ["ip", "link", "set", member, "master", bridge] => {
                if !links.get(*bridge).map(|l| l.bridge).unwrap_or(false) {
                    return Err(missing());
                }
                links.get_mut(*member).ok_or_else(missing)?.master = Some(bridge.to_string());
            }
            ["ip", "link", "delete", name, "type", "bridge"] => {
                if links.remove(*name).is_none() {
                    return Err(missing());
                }
                for link in links.values_mut() {
                    if link.master.as_deref() == Some(*name) {
                        link.master = None;
                    }
                }
            }
            _ => return Err(Error::ExecutionFailed(format!("Unsupported command: {}", command))),
        }
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for FakeKernel {
    async fn execute(&self, argv: &[String]) -> Result<String> {
        let command = argv.join(" ");
        self.commands.lock().push(command.clone());

        if self.failures.lock().iter().any(|p| command.contains(p.as_str())) {
            return Err(Self::rejected(&command, "RTNETLINK answers: Operation not permitted"));
        }

        let args: Vec<&str> = argv.iter().map(String::as_str).collect();
        self.apply(&command, &args)?;
        Ok(String::new())
    }
}

#[async_trait]
impl InterfaceProbe for FakeKernel {
    async fn exists(&self, name: &str) -> bool {
        self.links.lock().contains_key(name)
    }
}

#[derive(Debug, Clone)]
enum Script {
    Packets(usize),
    Fail(String),
}

/// Scripted capture collaborator that records how many captures overlap
#[derive(Default)]
pub struct FakeCapturer {
    script: Mutex<HashMap<String, Script>>,
    delay: Mutex<Duration>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    last_request: Mutex<Option<(String, String, usize, Duration)>>,
}

impl FakeCapturer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every capture on `interface` yields `count` packets
    pub fn with_packets(self: Arc<Self>, interface: &str, count: usize) -> Arc<Self> {
        self.script
            .lock()
            .insert(interface.to_string(), Script::Packets(count));
        self
    }

    /// Every capture on `interface` fails
    pub fn with_failure(self: Arc<Self>, interface: &str, message: &str) -> Arc<Self> {
        self.script
            .lock()
            .insert(interface.to_string(), Script::Fail(message.to_string()));
        self
    }

    /// Block each capture for `delay`
    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock() = delay;
        self
    }

    /// Block captures on `interface` for `delay`, overriding the default
    pub fn with_delay_on(self: Arc<Self>, interface: &str, delay: Duration) -> Arc<Self> {
        self.delays.lock().insert(interface.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<(String, String, usize, Duration)> {
        self.last_request.lock().clone()
    }
}

impl Capturer for FakeCapturer {
    fn capture(
        &self,
        interface: &str,
        filter: &str,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<Packet>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some((
            interface.to_string(),
            filter.to_string(),
            count,
            timeout,
        ));

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let delay = self
            .delays
            .lock()
            .get(interface)
            .copied()
            .unwrap_or_else(|| *self.delay.lock());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let script = self.script.lock().get(interface).cloned();
        match script {
            Some(Script::Packets(n)) => Ok((0..n)
                .map(|i| Packet::new(interface, vec![i as u8; 60]))
                .collect()),
            Some(Script::Fail(message)) => Err(Error::capture(message)),
            None => Ok(Vec::new()),
        }
    }
}

/// Extractor producing one `"<interface>#<len>"` record per packet.
///
/// Can be told to fail its first `n` calls.
#[derive(Default)]
pub struct CountingExtractor {
    calls: AtomicUsize,
    fail_first: usize,
}

impl CountingExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(n: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first: n,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Extractor for CountingExtractor {
    type Record = String;

    fn protocol(&self) -> &'static str {
        "counting"
    }

    fn default_filter(&self) -> String {
        "arp".to_string()
    }

    fn extract(&self, packets: &[Packet]) -> Result<Vec<String>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(Error::PacketParsing(format!("Scripted failure {}", call + 1)));
        }
        Ok(packets
            .iter()
            .map(|p| format!("{}#{}", p.interface, p.len()))
            .collect())
    }
}
