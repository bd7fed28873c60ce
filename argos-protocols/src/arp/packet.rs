//! ARP packet structure and parsing

use argos_core::{ethertypes, Error, MacAddr, Result};
use bytes::Buf;
use std::net::Ipv4Addr;

/// Fixed size of an Ethernet/IPv4 ARP body
pub const ARP_LEN: usize = 28;

/// Hardware types
pub const HTYPE_ETHERNET: u16 = 1;

/// Protocol types
pub const PTYPE_IPV4: u16 = 0x0800;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;

/// ARP Operation Codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOpcode {
    Request,
    Reply,
    /// Any other operation (RARP, InARP, ...)
    Other(u16),
}

impl ArpOpcode {
    pub fn from_u16(val: u16) -> Self {
        match val {
            1 => Self::Request,
            2 => Self::Reply,
            other => Self::Other(other),
        }
    }
}

/// Ethernet/IPv4 ARP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    /// Hardware type (typically 1 for Ethernet)
    pub htype: u16,
    /// Protocol type (typically 0x0800 for IPv4)
    pub ptype: u16,
    pub operation: ArpOpcode,
    pub sender_hw_addr: MacAddr,
    pub sender_proto_addr: Ipv4Addr,
    pub target_hw_addr: MacAddr,
    pub target_proto_addr: Ipv4Addr,
}

fn read_mac(buf: &mut &[u8]) -> MacAddr {
    let mut mac = [0u8; 6];
    buf.copy_to_slice(&mut mac);
    MacAddr::new(mac)
}

fn read_ipv4(buf: &mut &[u8]) -> Ipv4Addr {
    Ipv4Addr::from(buf.get_u32())
}

impl ArpPacket {
    /// Parse an ARP body (no Ethernet header)
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ARP_LEN {
            return Err(Error::PacketParsing(format!(
                "ARP packet too short: {} bytes",
                data.len()
            )));
        }

        let mut buf = data;
        let htype = buf.get_u16();
        let ptype = buf.get_u16();
        let hlen = buf.get_u8();
        let plen = buf.get_u8();
        if hlen != 6 || plen != 4 {
            return Err(Error::PacketParsing(format!(
                "Unsupported ARP address lengths: hlen={} plen={}",
                hlen, plen
            )));
        }
        let operation = ArpOpcode::from_u16(buf.get_u16());

        Ok(Self {
            htype,
            ptype,
            operation,
            sender_hw_addr: read_mac(&mut buf),
            sender_proto_addr: read_ipv4(&mut buf),
            target_hw_addr: read_mac(&mut buf),
            target_proto_addr: read_ipv4(&mut buf),
        })
    }

    /// Parse the ARP body carried by an Ethernet frame
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        let payload = arp_payload(frame)
            .ok_or_else(|| Error::PacketParsing("Frame does not carry ARP".to_string()))?;
        Self::parse(payload)
    }
}

/// ARP payload of an Ethernet frame, skipping any 802.1Q / QinQ tags.
///
/// Returns `None` for frames that do not carry ARP.
pub fn arp_payload(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < ETHERNET_HEADER_LEN {
        return None;
    }

    let mut buf = &frame[12..];
    let mut ethertype = buf.get_u16();
    while ethertype == ethertypes::DOT1Q || ethertype == ethertypes::QINQ {
        if buf.remaining() < VLAN_TAG_LEN {
            return None;
        }
        buf.advance(2);
        ethertype = buf.get_u16();
    }

    (ethertype == ethertypes::ARP).then_some(buf)
}
