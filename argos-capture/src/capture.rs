//! Bounded, blocking packet capture
//!
//! A [`Capturer`] performs one capture of at most `count` packets within
//! `timeout` and returns them in arrival order. Calls block the current
//! thread; the engine only ever invokes them from its worker pool.

use argos_core::{Error, Packet, Result};
use pcap::{Active, Capture, Device};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Default snapshot length (maximum bytes per packet)
const DEFAULT_SNAPLEN: i32 = 65535;

/// Default pcap read timeout (milliseconds)
///
/// Kept short so the capture deadline is checked often.
const DEFAULT_READ_TIMEOUT_MS: i32 = 100;

/// Blocking capture collaborator
pub trait Capturer: Send + Sync + 'static {
    /// Capture up to `count` packets matching `filter` on `interface`,
    /// giving up after `timeout`. An empty filter captures everything.
    fn capture(
        &self,
        interface: &str,
        filter: &str,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<Packet>>;
}

/// Configuration for packet capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Maximum bytes to capture per packet
    pub snaplen: i32,
    /// pcap read timeout in milliseconds
    pub read_timeout_ms: i32,
    /// Enable promiscuous mode
    pub promiscuous: bool,
    /// Kernel buffer size in bytes (0 = libpcap default)
    pub buffer_size: i32,
    /// Enable immediate mode (deliver packets immediately)
    pub immediate_mode: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snaplen: DEFAULT_SNAPLEN,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            promiscuous: true,
            buffer_size: 0,
            immediate_mode: true,
        }
    }
}

impl CaptureConfig {
    /// Derive capture settings from the engine configuration
    pub fn from_argos(config: &argos_core::ArgosConfig) -> Self {
        Self {
            promiscuous: config.promiscuous_mode,
            buffer_size: i32::try_from(config.capture_buffer_size).unwrap_or(i32::MAX),
            ..Self::default()
        }
    }
}

/// libpcap-backed capturer
#[derive(Debug, Clone, Default)]
pub struct PcapCapturer {
    config: CaptureConfig,
}

impl PcapCapturer {
    /// Create a capturer with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a capturer with custom configuration
    pub fn with_config(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Get the capture configuration
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Open a pcap handle on `interface` and apply `filter`
    fn open(&self, interface: &str, filter: &str) -> Result<Capture<Active>> {
        debug!(interface = %interface, "Opening pcap capture");

        let device = Device::from(interface);
        let mut capture = Capture::from_device(device)
            .map_err(|e| Error::capture(format!("Failed to create capture: {}", e)))?
            .promisc(self.config.promiscuous)
            .snaplen(self.config.snaplen)
            .timeout(self.config.read_timeout_ms)
            .immediate_mode(self.config.immediate_mode);

        if self.config.buffer_size > 0 {
            capture = capture.buffer_size(self.config.buffer_size);
        }

        let mut capture = capture
            .open()
            .map_err(|e| Error::capture(format!("Failed to open capture: {}", e)))?;

        if !filter.is_empty() {
            capture
                .filter(filter, true)
                .map_err(|e| Error::capture(format!("Invalid BPF filter '{}': {}", filter, e)))?;
            debug!(interface = %interface, filter = %filter, "Applied filter");
        }

        Ok(capture)
    }
}

fn header_time(header: &pcap::PacketHeader) -> SystemTime {
    let secs = u64::try_from(header.ts.tv_sec).unwrap_or(0);
    let micros = u32::try_from(header.ts.tv_usec).unwrap_or(0);
    UNIX_EPOCH + Duration::new(secs, micros.saturating_mul(1_000))
}

impl Capturer for PcapCapturer {
    fn capture(
        &self,
        interface: &str,
        filter: &str,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<Packet>> {
        let mut capture = self.open(interface, filter)?;
        let deadline = Instant::now() + timeout;
        let mut packets = Vec::with_capacity(count.min(1024));

        while packets.len() < count && Instant::now() < deadline {
            match capture.next_packet() {
                Ok(packet) => {
                    packets.push(Packet {
                        timestamp: header_time(packet.header),
                        interface: interface.to_string(),
                        data: packet.data.to_vec(),
                        len: packet.header.len as usize,
                    });
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(e) => {
                    return Err(Error::capture(format!("Packet capture error: {}", e)));
                }
            }
        }

        info!(
            interface = %interface,
            packets = packets.len(),
            "pcap capture finished"
        );
        Ok(packets)
    }
}
