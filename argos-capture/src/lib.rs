//! Packet capture collaborators for Argos
//!
//! This crate wraps libpcap behind the blocking [`Capturer`] trait and
//! provides interface enumeration and existence probes.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use argos_capture::{Capturer, PcapCapturer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let capturer = PcapCapturer::new();
//! let packets = capturer.capture("eth0", "arp", 10, Duration::from_secs(5))?;
//! println!("captured {} packets", packets.len());
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod interface;

// Re-export main types
pub use capture::{CaptureConfig, Capturer, PcapCapturer};
pub use interface::{
    default_probe, get_interface, list_interfaces, DatalinkProbe, InterfaceInfo, InterfaceProbe,
    SysfsProbe,
};
