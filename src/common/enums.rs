use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, PartialEq, Eq, Clone, Copy, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum EthernetType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
    Ipv6 = 0x86DD,
    Dot1Q = 0x8100,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum IpProtocol {
    Icmp = 1,
    Tcp = 6,
    Udp = 17,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PacketDirection {
    /// Client to server, payload carries MySQL commands.
    ClientToServer,
    /// Server to client, payload carries result sets and status.
    ServerToClient,
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::ClientToServer => write!(f, "c2s"),
            PacketDirection::ServerToClient => write!(f, "s2c"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethernet_type_conversion() {
        assert_eq!(EthernetType::try_from(0x0800u16), Ok(EthernetType::Ipv4));
        assert_eq!(u16::from(EthernetType::Ipv6), 0x86DD);
        assert!(EthernetType::try_from(0x1234u16).is_err());
    }
}
