//! Protocol extractor capability

use crate::{Packet, Result};
use serde::Serialize;

/// Turns raw packet records into protocol-specific structured records.
///
/// One implementation exists per supported protocol. The engine is generic
/// over its extractor, so the protocol is fixed when the engine is built.
/// `extract` is synchronous and may be CPU heavy; the engine always runs it
/// on the blocking worker pool, never on the coordination path.
pub trait Extractor: Send + Sync + 'static {
    /// Structured record produced for each matching packet
    type Record: Serialize + Send + 'static;

    /// Short protocol name (e.g. "arp")
    fn protocol(&self) -> &'static str;

    /// BPF filter that selects this protocol's traffic
    fn default_filter(&self) -> String;

    /// Extract records, preserving input packet order
    fn extract(&self, packets: &[Packet]) -> Result<Vec<Self::Record>>;
}
