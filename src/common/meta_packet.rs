use std::net::Ipv4Addr;

use super::enums::{EthernetType, IpProtocol, PacketDirection};
use super::lookup_key::LookupKey;
use super::{
    ETH_HEADER_SIZE, ETH_TYPE_OFFSET, IPV4_DST_OFFSET, IPV4_PROTO_OFFSET, IPV4_SRC_OFFSET,
    TCP_DATA_OFFSET_BYTE,
};
use crate::flow_generator::error::{Error, Result};
use crate::utils::bytes::read_u16_be;

/// One captured frame reduced to what the pipeline needs: the flow it
/// belongs to, which way it travels, and the TCP payload bytes.
#[derive(Debug)]
pub struct MetaPacket<'a> {
    pub lookup_key: LookupKey,
    pub direction: PacketDirection,
    pub payload: &'a [u8],
}

impl<'a> MetaPacket<'a> {
    /// Walks the fixed Ethernet/IPv4/TCP layout of a captured frame.
    /// Direction is derived from which endpoint carries the server port.
    pub fn decode(raw: &'a [u8], server_port: u16) -> Result<MetaPacket<'a>> {
        if raw.len() < ETH_HEADER_SIZE + 20 {
            return Err(Error::ParsePacketFailed("short frame"));
        }
        if EthernetType::try_from(read_u16_be(&raw[ETH_TYPE_OFFSET..])) != Ok(EthernetType::Ipv4) {
            return Err(Error::ParsePacketFailed("not ipv4"));
        }

        let ip = &raw[ETH_HEADER_SIZE..];
        let ihl = ((ip[0] & 0x0f) as usize) * 4;
        if ihl < 20 || ip.len() < ihl + 20 {
            return Err(Error::ParsePacketFailed("short ip header"));
        }
        if IpProtocol::try_from(ip[IPV4_PROTO_OFFSET]) != Ok(IpProtocol::Tcp) {
            return Err(Error::ParsePacketFailed("not tcp"));
        }
        let src_ip = Ipv4Addr::new(
            ip[IPV4_SRC_OFFSET],
            ip[IPV4_SRC_OFFSET + 1],
            ip[IPV4_SRC_OFFSET + 2],
            ip[IPV4_SRC_OFFSET + 3],
        );
        let dst_ip = Ipv4Addr::new(
            ip[IPV4_DST_OFFSET],
            ip[IPV4_DST_OFFSET + 1],
            ip[IPV4_DST_OFFSET + 2],
            ip[IPV4_DST_OFFSET + 3],
        );

        let tcp = &ip[ihl..];
        let src_port = read_u16_be(tcp);
        let dst_port = read_u16_be(&tcp[2..]);
        let data_offset = ((tcp[TCP_DATA_OFFSET_BYTE] >> 4) as usize) * 4;
        if data_offset < 20 || tcp.len() < data_offset {
            return Err(Error::ParsePacketFailed("short tcp header"));
        }
        let payload = &tcp[data_offset..];
        if payload.is_empty() {
            return Err(Error::ZeroPayloadLen);
        }

        let (lookup_key, direction) = if src_port == server_port {
            (
                LookupKey::new(dst_ip, dst_port),
                PacketDirection::ServerToClient,
            )
        } else if dst_port == server_port {
            (
                LookupKey::new(src_ip, src_port),
                PacketDirection::ClientToServer,
            )
        } else {
            return Err(Error::UnexpectedPorts {
                src: src_port,
                dst: dst_port,
            });
        };

        Ok(MetaPacket {
            lookup_key,
            direction,
            payload,
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Builds a minimal Ethernet/IPv4/TCP frame around `payload`.
    pub fn build_frame(
        src_ip: [u8; 4],
        src_port: u16,
        dst_ip: [u8; 4],
        dst_port: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut frame = vec![0u8; ETH_HEADER_SIZE];
        frame[ETH_TYPE_OFFSET..ETH_TYPE_OFFSET + 2].copy_from_slice(&0x0800u16.to_be_bytes());
        // ipv4 header, no options
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[IPV4_PROTO_OFFSET] = 6;
        ip[IPV4_SRC_OFFSET..IPV4_SRC_OFFSET + 4].copy_from_slice(&src_ip);
        ip[IPV4_DST_OFFSET..IPV4_DST_OFFSET + 4].copy_from_slice(&dst_ip);
        frame.extend_from_slice(&ip);
        // tcp header, no options
        let mut tcp = vec![0u8; 20];
        tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
        tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
        tcp[TCP_DATA_OFFSET_BYTE] = 5 << 4;
        frame.extend_from_slice(&tcp);
        frame.extend_from_slice(payload);
        frame
    }

    const SERVER: [u8; 4] = [10, 0, 0, 1];
    const CLIENT: [u8; 4] = [10, 0, 0, 2];

    #[test]
    fn request_direction() {
        let frame = build_frame(CLIENT, 50000, SERVER, 3306, b"x");
        let pkt = MetaPacket::decode(&frame, 3306).unwrap();
        assert_eq!(pkt.direction, PacketDirection::ClientToServer);
        assert_eq!(pkt.lookup_key.to_string(), "10.0.0.2:50000");
        assert_eq!(pkt.payload, b"x");
    }

    #[test]
    fn response_direction() {
        let frame = build_frame(SERVER, 3306, CLIENT, 50000, b"ok");
        let pkt = MetaPacket::decode(&frame, 3306).unwrap();
        assert_eq!(pkt.direction, PacketDirection::ServerToClient);
        // the client endpoint keys the flow regardless of direction
        assert_eq!(pkt.lookup_key.to_string(), "10.0.0.2:50000");
    }

    #[test]
    fn unexpected_ports() {
        let frame = build_frame(CLIENT, 50000, SERVER, 8080, b"x");
        assert!(matches!(
            MetaPacket::decode(&frame, 3306),
            Err(Error::UnexpectedPorts {
                src: 50000,
                dst: 8080
            })
        ));
    }

    #[test]
    fn empty_payload_is_discarded() {
        let frame = build_frame(CLIENT, 50000, SERVER, 3306, b"");
        assert!(matches!(
            MetaPacket::decode(&frame, 3306),
            Err(Error::ZeroPayloadLen)
        ));
    }

    #[test]
    fn truncated_frame() {
        let frame = build_frame(CLIENT, 50000, SERVER, 3306, b"x");
        assert!(matches!(
            MetaPacket::decode(&frame[..30], 3306),
            Err(Error::ParsePacketFailed(_))
        ));
    }

    #[test]
    fn ip_options_shift_tcp_header() {
        // ihl = 6 inserts 4 option bytes before the tcp header
        let mut frame = build_frame(CLIENT, 50000, SERVER, 3306, b"q");
        let mut ip = frame[ETH_HEADER_SIZE..ETH_HEADER_SIZE + 20].to_vec();
        ip[0] = 0x46;
        let tail = frame.split_off(ETH_HEADER_SIZE + 20);
        frame.truncate(ETH_HEADER_SIZE);
        frame.extend_from_slice(&ip);
        frame.extend_from_slice(&[0u8; 4]);
        frame.extend_from_slice(&tail);
        let pkt = MetaPacket::decode(&frame, 3306).unwrap();
        assert_eq!(pkt.payload, b"q");
    }
}
