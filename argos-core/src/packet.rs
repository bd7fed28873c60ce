//! Raw packet records

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A captured packet as handed back by the capture collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// When the packet was captured
    pub timestamp: SystemTime,
    /// Interface the packet was received on
    pub interface: String,
    /// Packet data (including all headers)
    pub data: Vec<u8>,
    /// Actual length on the wire (may differ from data.len() if truncated)
    pub len: usize,
}

impl Packet {
    /// Create a new packet stamped with the current time
    pub fn new(interface: impl Into<String>, data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            timestamp: SystemTime::now(),
            interface: interface.into(),
            data,
            len,
        }
    }

    /// Override the capture timestamp
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Get packet data as slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get packet length
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if packet is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capture time as fractional seconds since the Unix epoch
    pub fn epoch_seconds(&self) -> f64 {
        self.timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_epoch_seconds() {
        let ts = UNIX_EPOCH + Duration::from_millis(1_500);
        let pkt = Packet::new("eth0", vec![1, 2, 3]).with_timestamp(ts);
        assert_eq!(pkt.len(), 3);
        assert!((pkt.epoch_seconds() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_json_shape() {
        let pkt = Packet::new("eth0", vec![0xde, 0xad]).with_timestamp(UNIX_EPOCH);
        let json = serde_json::to_value(&pkt).unwrap();
        assert_eq!(json["interface"], "eth0");
        assert_eq!(json["data"], serde_json::json!([222, 173]));
        let back: Packet = serde_json::from_value(json).unwrap();
        assert_eq!(back, pkt);
    }
}
