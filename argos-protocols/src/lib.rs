//! Protocol extractors for Argos
//!
//! Each protocol module provides frame parsing and an
//! [`Extractor`](argos_core::Extractor) implementation that turns captured
//! packets into structured records.
//!
//! ## Available Protocols
//!
//! ### ARP (Address Resolution Protocol)
//! Requests and replies, including 802.1Q / QinQ tagged frames.
//! See [`arp`] module for details.

pub mod arp;

pub use arp::{ArpExtractor, ArpRecord};

/// Protocol names accepted in the `protocol` configuration field
pub const SUPPORTED_PROTOCOLS: &[&str] = &["arp"];

/// Whether `name` names a protocol with an extractor
pub fn is_supported(name: &str) -> bool {
    SUPPORTED_PROTOCOLS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(name.trim()))
}
