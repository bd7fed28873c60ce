//! ARP record extraction

use argos_core::{Extractor, MacAddr, Packet, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use tracing::trace;

use super::packet::{ArpOpcode, ArpPacket};

/// Structured view of one captured ARP packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArpRecord {
    /// Capture time in seconds since the Unix epoch
    pub timestamp: f64,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    /// "request" for opcode 1, "reply" for anything else
    pub operation: String,
}

impl ArpRecord {
    fn from_packet(packet: &Packet, arp: &ArpPacket) -> Self {
        let operation = match arp.operation {
            ArpOpcode::Request => "request",
            _ => "reply",
        };
        Self {
            timestamp: packet.epoch_seconds(),
            src_ip: arp.sender_proto_addr,
            dst_ip: arp.target_proto_addr,
            src_mac: arp.sender_hw_addr,
            dst_mac: arp.target_hw_addr,
            operation: operation.to_string(),
        }
    }
}

/// Extracts [`ArpRecord`]s; frames without a complete ARP body are skipped
#[derive(Debug, Clone, Copy, Default)]
pub struct ArpExtractor;

impl ArpExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for ArpExtractor {
    type Record = ArpRecord;

    fn protocol(&self) -> &'static str {
        "arp"
    }

    fn default_filter(&self) -> String {
        "arp".to_string()
    }

    fn extract(&self, packets: &[Packet]) -> Result<Vec<ArpRecord>> {
        let records = packets
            .iter()
            .filter_map(|packet| match ArpPacket::from_frame(packet.data()) {
                Ok(arp) => Some(ArpRecord::from_packet(packet, &arp)),
                Err(e) => {
                    trace!(interface = %packet.interface, error = %e, "Skipping frame");
                    None
                }
            })
            .collect();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arp::packet::tests::arp_frame;
    use std::time::{Duration, UNIX_EPOCH};

    fn packet(data: Vec<u8>) -> Packet {
        Packet::new("eth0", data).with_timestamp(UNIX_EPOCH + Duration::from_millis(1_500))
    }

    #[test]
    fn test_extracts_in_order_and_skips_others() {
        let mut truncated = arp_frame(1, None);
        truncated.truncate(20);
        let packets = vec![
            packet(arp_frame(1, None)),
            packet(vec![0u8; 60]),
            packet(truncated),
            packet(arp_frame(2, Some(7))),
            packet(arp_frame(4, None)),
        ];

        let records = ArpExtractor::new().extract(&packets).unwrap();
        let ops: Vec<&str> = records.iter().map(|r| r.operation.as_str()).collect();
        assert_eq!(ops, vec!["request", "reply", "reply"]);

        let first = &records[0];
        assert_eq!(first.timestamp, 1.5);
        assert_eq!(first.src_ip, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(first.dst_ip, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(first.src_mac.to_string(), "00:11:22:33:44:55");
        assert_eq!(first.dst_mac.to_string(), "66:77:88:99:aa:bb");
    }

    #[test]
    fn test_record_json_shape() {
        let records = ArpExtractor::new()
            .extract(&[packet(arp_frame(1, None))])
            .unwrap();
        let value = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(value["src_ip"], "192.168.1.10");
        assert_eq!(value["dst_mac"], "66:77:88:99:aa:bb");
        assert_eq!(value["operation"], "request");
        assert_eq!(value["timestamp"], 1.5);
    }

    #[test]
    fn test_empty_input() {
        assert!(ArpExtractor::new().extract(&[]).unwrap().is_empty());
        assert_eq!(ArpExtractor::new().default_filter(), "arp");
    }
}
