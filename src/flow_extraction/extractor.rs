//! Packet-in → [`FlowFeatures`]
//!
//! Pure functions over the raw frame. Parsing is delegated to `etherparse`; the
//! extractor only normalizes what it finds into the flat feature record used by the
//! detection engine.
//!
//! Slicing is lax: packet-ins are often cut to the switch's `miss_send_len`, so the IP
//! length fields may claim more bytes than the frame holds. Only the Ethernet and network
//! headers are required. A missing or short transport header leaves ports and flags at 0.

use etherparse::{Ethernet2HeaderSlice, LaxNetSlice, LaxSlicedPacket, LinkSlice, TransportSlice};
use log::trace;
use std::net::IpAddr;

use super::types::*;
use crate::error_handling::types::PacketError;
use crate::southbound::types::MacAddr;

struct NetworkLayer {
    src_ip: IpAddr,
    dst_ip: IpAddr,
    protocol: u8,
    ttl: u8,
    total_length: u32,
}

#[derive(Default)]
struct TransportLayer {
    src_port: u16,
    dst_port: u16,
    tcp_flags: u8,
}

/// Builds the feature record for `packet`.
///
/// # Errors
///
/// [`PacketError::MalformedPacket`] when the frame does not carry an Ethernet II header
/// followed by a complete IPv4/IPv6 header.
pub fn extract(packet: &PacketIn) -> Result<FlowFeatures, PacketError> {
    let sliced = LaxSlicedPacket::from_ethernet(&packet.data)
        .map_err(|e| PacketError::MalformedPacket(e.to_string()))?;
    if let Some((err, layer)) = &sliced.stop_err {
        trace!("Partial parse, stopped at {:?}: {}", layer, err);
    }

    let (eth_src, eth_dst, eth_type) = match &sliced.link {
        Some(LinkSlice::Ethernet2(eth)) => (
            MacAddr(eth.source()),
            MacAddr(eth.destination()),
            eth.ether_type().0,
        ),
        _ => {
            return Err(PacketError::MalformedPacket(
                "no Ethernet II header".to_string(),
            ))
        }
    };

    let network = parse_network(&sliced).ok_or_else(|| match &sliced.stop_err {
        Some((err, _)) => PacketError::MalformedPacket(err.to_string()),
        None => PacketError::MalformedPacket(format!(
            "no network layer (ethertype {:#06x})",
            eth_type
        )),
    })?;
    let transport = parse_transport(&sliced);

    let features = FlowFeatures {
        switch: packet.switch,
        in_port: packet.in_port,
        eth_src,
        eth_dst,
        eth_type,
        src_ip: network.src_ip,
        dst_ip: network.dst_ip,
        src_port: transport.src_port,
        dst_port: transport.dst_port,
        protocol: network.protocol,
        tcp_flags: transport.tcp_flags,
        total_length: network.total_length,
        ttl: network.ttl,
        observed_at: packet.received_at,
    };
    trace!(
        "Extracted {} {}:{} -> {}:{} flags={:#04x} len={}",
        features.protocol_name(),
        features.src_ip,
        features.src_port,
        features.dst_ip,
        features.dst_port,
        features.tcp_flags,
        features.total_length
    );
    Ok(features)
}

/// Source and destination MAC of an Ethernet II frame, whatever it carries.
pub fn ethernet_addresses(data: &[u8]) -> Option<(MacAddr, MacAddr)> {
    Ethernet2HeaderSlice::from_slice(data)
        .ok()
        .map(|eth| (MacAddr(eth.source()), MacAddr(eth.destination())))
}

fn parse_network(sliced: &LaxSlicedPacket<'_>) -> Option<NetworkLayer> {
    match &sliced.net {
        Some(LaxNetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            Some(NetworkLayer {
                src_ip: IpAddr::from(header.source_addr()),
                dst_ip: IpAddr::from(header.destination_addr()),
                protocol: header.protocol().0,
                ttl: header.ttl(),
                total_length: u32::from(header.total_len()),
            })
        }
        Some(LaxNetSlice::Ipv6(ipv6)) => {
            let header = ipv6.header();
            Some(NetworkLayer {
                src_ip: IpAddr::from(header.source_addr()),
                dst_ip: IpAddr::from(header.destination_addr()),
                protocol: header.next_header().0,
                ttl: header.hop_limit(),
                total_length: u32::from(header.payload_length()) + 40,
            })
        }
        _ => None,
    }
}

fn parse_transport(sliced: &LaxSlicedPacket<'_>) -> TransportLayer {
    match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            let mut flags = 0u8;
            for (set, bit) in [
                (tcp.fin(), TCP_FIN),
                (tcp.syn(), TCP_SYN),
                (tcp.rst(), TCP_RST),
                (tcp.psh(), TCP_PSH),
                (tcp.ack(), TCP_ACK),
                (tcp.urg(), TCP_URG),
                (tcp.ece(), TCP_ECE),
                (tcp.cwr(), TCP_CWR),
            ] {
                if set {
                    flags |= bit;
                }
            }
            TransportLayer {
                src_port: tcp.source_port(),
                dst_port: tcp.destination_port(),
                tcp_flags: flags,
            }
        }
        Some(TransportSlice::Udp(udp)) => TransportLayer {
            src_port: udp.source_port(),
            dst_port: udp.destination_port(),
            tcp_flags: 0,
        },
        _ => TransportLayer::default(),
    }
}


#[cfg(test)]
mod tests {
    use super::test_frames::*;
    use super::*;
    use crate::southbound::types::SwitchId;
    use chrono::Utc;
    use std::net::Ipv4Addr;

    fn packet_in(data: Vec<u8>) -> PacketIn {
        PacketIn {
            switch: SwitchId(1),
            in_port: 3,
            buffer_id: None,
            data,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn test_extract_tcp_syn() {
        let data = tcp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            40000,
            22,
            true,
        );
        let packet = packet_in(data);

        let features = extract(&packet).unwrap();

        assert_eq!(features.switch, SwitchId(1));
        assert_eq!(features.in_port, 3);
        assert_eq!(features.eth_src, MacAddr(MAC_A));
        assert_eq!(features.eth_dst, MacAddr(MAC_B));
        assert_eq!(features.eth_type, 0x0800);
        assert_eq!(features.src_ip, IpAddr::from(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(features.dst_ip, IpAddr::from(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(features.src_port, 40000);
        assert_eq!(features.dst_port, 22);
        assert_eq!(features.protocol, PROTO_TCP);
        assert_eq!(features.tcp_flags, TCP_SYN);
        assert!(features.is_syn());
        assert_eq!(features.ttl, 64);
        assert_eq!(features.total_length, 40);
        assert_eq!(features.observed_at, packet.received_at);
    }

    #[test]
    fn test_extract_tcp_ack_is_not_syn() {
        let data = tcp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            40000,
            80,
            false,
        );

        let features = extract(&packet_in(data)).unwrap();

        assert_eq!(features.tcp_flags, TCP_ACK);
        assert!(!features.is_syn());
    }

    #[test]
    fn test_extract_udp() {
        let data = udp_frame(Ipv4Addr::new(192, 168, 1, 5), Ipv4Addr::new(8, 8, 8, 8), 5353, 53);

        let features = extract(&packet_in(data)).unwrap();

        assert_eq!(features.protocol, PROTO_UDP);
        assert_eq!(features.protocol_name(), "UDP");
        assert_eq!(features.src_port, 5353);
        assert_eq!(features.dst_port, 53);
        assert_eq!(features.tcp_flags, 0);
        assert_eq!(features.source_port(), Some(5353));
        assert_eq!(features.total_length, 20 + 8 + 4);
    }

    #[test]
    fn test_arp_is_malformed_for_analysis() {
        let result = extract(&packet_in(arp_frame()));
        assert!(matches!(result, Err(PacketError::MalformedPacket(_))));
    }

    #[test]
    fn test_frame_cut_inside_transport_header() {
        let mut data = tcp_frame(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            40000,
            22,
            true,
        );
        data.truncate(42);

        let features = extract(&packet_in(data)).unwrap();

        assert_eq!(features.src_ip, IpAddr::from(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(features.dst_ip, IpAddr::from(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(features.protocol, PROTO_TCP);
        assert_eq!(features.src_port, 0);
        assert_eq!(features.dst_port, 0);
        assert_eq!(features.tcp_flags, 0);
        assert_eq!(features.source_port(), None);
        assert_eq!(features.total_length, 40);
    }

    #[test]
    fn test_frame_cut_inside_ip_header_is_malformed() {
        let mut data = udp_frame(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 5000, 53);
        data.truncate(14 + 12);

        let result = extract(&packet_in(data));

        assert!(matches!(result, Err(PacketError::MalformedPacket(_))));
    }

    #[test]
    fn test_truncated_frame_is_malformed() {
        let result = extract(&packet_in(vec![0x02, 0x00, 0x00]));
        assert!(matches!(result, Err(PacketError::MalformedPacket(_))));
    }

    #[test]
    fn test_ethernet_addresses_of_non_ip_frame() {
        let (src, dst) = ethernet_addresses(&arp_frame()).unwrap();
        assert_eq!(src, MacAddr(MAC_A));
        assert_eq!(dst, MacAddr([0xff; 6]));
        assert!(dst.is_multicast());
        assert!(ethernet_addresses(&[1, 2, 3]).is_none());
    }
}
