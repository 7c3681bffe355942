use std::io;
use std::time::Duration;

use pnet::datalink::{self, Channel, DataLinkReceiver, NetworkInterface};

use super::{RecvEngine, RecvError};
use crate::common::{
    ETH_HEADER_SIZE, ETH_TYPE_OFFSET, IPV4_FRAG_OFFSET, IPV4_PROTO_OFFSET, TCP_DATA_OFFSET_BYTE,
};
use crate::error::{Error, Result};
use crate::utils::bytes::read_u16_be;

const SNAP_LEN: usize = 65536;

/// Matches the capture expression `tcp port <P>` in userspace: IPv4,
/// unfragmented TCP, with either endpoint on the observed port.
#[derive(Debug, Clone, Copy)]
pub struct PortFilter {
    port: u16,
}

impl PortFilter {
    pub fn new(port: u16) -> Result<Self> {
        if port == 0 {
            return Err(Error::FilterInstall("port must not be zero".into()));
        }
        Ok(Self { port })
    }

    pub fn matches(&self, frame: &[u8]) -> bool {
        if frame.len() < ETH_HEADER_SIZE + 20 {
            return false;
        }
        if read_u16_be(&frame[ETH_TYPE_OFFSET..]) != 0x0800 {
            return false;
        }
        let ip = &frame[ETH_HEADER_SIZE..];
        if ip[IPV4_PROTO_OFFSET] != 6 {
            return false;
        }
        // more-fragments or a nonzero offset: the transport header is
        // unreliable, reject at the filter
        if read_u16_be(&ip[IPV4_FRAG_OFFSET..]) & 0x3fff != 0 {
            return false;
        }
        let ihl = ((ip[0] & 0x0f) as usize) * 4;
        if ihl < 20 || ip.len() < ihl + TCP_DATA_OFFSET_BYTE {
            return false;
        }
        let tcp = &ip[ihl..];
        read_u16_be(tcp) == self.port || read_u16_be(&tcp[2..]) == self.port
    }
}

/// Raw socket capture on one interface. Frames that fail the port filter
/// are consumed here and never reach the pipeline.
pub struct AfPacketEngine {
    rx: Box<dyn DataLinkReceiver>,
    filter: PortFilter,
    buffer: Vec<u8>,
}

impl AfPacketEngine {
    pub fn new(interface_name: &str, port: u16, read_timeout: Duration) -> Result<Self> {
        let filter = PortFilter::new(port)?;
        let interface = datalink::interfaces()
            .into_iter()
            .find(|i: &NetworkInterface| i.name == interface_name)
            .ok_or_else(|| Error::DeviceOpen(format!("no such interface {}", interface_name)))?;
        let config = datalink::Config {
            read_timeout: Some(read_timeout),
            read_buffer_size: SNAP_LEN,
            ..Default::default()
        };
        let rx = match datalink::channel(&interface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => rx,
            Ok(_) => {
                return Err(Error::DeviceOpen(format!(
                    "unsupported channel type on {}",
                    interface_name
                )))
            }
            Err(e) => return Err(Error::DeviceOpen(e.to_string())),
        };
        Ok(Self {
            rx,
            filter,
            buffer: Vec::with_capacity(SNAP_LEN),
        })
    }
}

impl RecvEngine for AfPacketEngine {
    fn recv(&mut self) -> Result<&[u8], RecvError> {
        loop {
            let frame = match self.rx.next() {
                Ok(frame) => frame,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Err(RecvError::Timeout),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RecvError::Io(e)),
            };
            if !self.filter.matches(frame) {
                continue;
            }
            self.buffer.clear();
            self.buffer.extend_from_slice(frame);
            break;
        }
        Ok(&self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::meta_packet::tests::build_frame;

    #[test]
    fn filter_rejects_zero_port() {
        assert!(matches!(
            PortFilter::new(0),
            Err(Error::FilterInstall(_))
        ));
    }

    #[test]
    fn filter_matches_either_endpoint() {
        let filter = PortFilter::new(3306).unwrap();
        let to_server = build_frame([10, 0, 0, 2], 50000, [10, 0, 0, 1], 3306, b"x");
        let from_server = build_frame([10, 0, 0, 1], 3306, [10, 0, 0, 2], 50000, b"x");
        let unrelated = build_frame([10, 0, 0, 2], 50000, [10, 0, 0, 1], 443, b"x");
        assert!(filter.matches(&to_server));
        assert!(filter.matches(&from_server));
        assert!(!filter.matches(&unrelated));
    }

    #[test]
    fn filter_rejects_fragments() {
        let filter = PortFilter::new(3306).unwrap();
        let mut frame = build_frame([10, 0, 0, 2], 50000, [10, 0, 0, 1], 3306, b"x");
        // set the more-fragments bit
        frame[ETH_HEADER_SIZE + IPV4_FRAG_OFFSET] = 0x20;
        assert!(!filter.matches(&frame));
    }

    #[test]
    fn filter_rejects_non_ip_traffic() {
        let filter = PortFilter::new(3306).unwrap();
        let mut frame = build_frame([10, 0, 0, 2], 50000, [10, 0, 0, 1], 3306, b"x");
        frame[ETH_TYPE_OFFSET] = 0x08;
        frame[ETH_TYPE_OFFSET + 1] = 0x06;
        assert!(!filter.matches(&frame));
    }
}
