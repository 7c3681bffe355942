use std::fmt;
use std::net::Ipv4Addr;

/// Identifies one client connection to the observed server. The server
/// endpoint is fixed by configuration, so the client side alone keys a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LookupKey {
    pub client_ip: Ipv4Addr,
    pub client_port: u16,
}

impl LookupKey {
    pub fn new(client_ip: Ipv4Addr, client_port: u16) -> Self {
        Self {
            client_ip,
            client_port,
        }
    }

    pub fn ip_string(&self) -> String {
        self.client_ip.to_string()
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.client_ip, self.client_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_as_addr_label() {
        let key = LookupKey::new(Ipv4Addr::new(10, 1, 2, 3), 49152);
        assert_eq!(key.to_string(), "10.1.2.3:49152");
        assert_eq!(key.ip_string(), "10.1.2.3");
    }
}
