use std::fs;
use std::io;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("observed port must not be zero")]
    PortZero,
    #[error("publisher address invalid: {0}")]
    PublisherAddrInvalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Server port whose traffic is observed.
    pub port: u16,
    /// Interface to capture on.
    pub interface: String,
    /// Publish raw statements instead of fingerprints.
    pub raw_queries: bool,
    /// Echo every published record to the log.
    pub verbose: bool,
    /// Disable canonicalization regardless of verbosity.
    pub no_clean: bool,
    /// Output template; `#s` source, `#i` source ip, `#q` query, `#r` route.
    pub format: String,
    pub publisher_addr: String,
    pub service_id: String,
    pub tenant_id: String,
    /// Publish topic; empty derives `cep.mysql.sniff.<tenant-id>`.
    pub topic: String,
    /// Log file path; empty logs to stderr.
    pub log_file: String,
    #[serde(with = "humantime_serde")]
    pub flow_idle_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub eviction_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub capture_read_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub stats_interval: Duration,
    pub sender_queue_size: usize,
    /// Keep a flow alive after it emits, pairing every query on the
    /// connection instead of only the first.
    pub return_to_idle: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3306,
            interface: "eth0".into(),
            raw_queries: false,
            verbose: true,
            no_clean: false,
            format: "#s:#q".into(),
            publisher_addr: "tcp://172.30.42.1:7388".into(),
            service_id: "default".into(),
            tenant_id: "default".into(),
            topic: String::new(),
            log_file: String::new(),
            flow_idle_timeout: Duration::from_secs(60),
            eviction_interval: Duration::from_secs(10),
            capture_read_timeout: Duration::from_secs(1),
            stats_interval: Duration::from_secs(10),
            sender_queue_size: 1 << 16,
            return_to_idle: false,
        }
    }
}

impl Config {
    pub fn load_from_file<T: AsRef<Path>>(path: T) -> Result<Config, io::Error> {
        let contents = fs::read_to_string(path)?;
        let mut c: Config = serde_yaml::from_str(&contents)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        c.normalize();
        if let Err(e) = c.validate() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, e.to_string()));
        }
        Ok(c)
    }

    pub fn normalize(&mut self) {
        if self.topic.is_empty() {
            self.topic = format!("cep.mysql.sniff.{}", self.tenant_id);
        }
        if self.sender_queue_size < 1 << 12 {
            self.sender_queue_size = 1 << 12;
        }
        if self.flow_idle_timeout < Duration::from_secs(1) {
            self.flow_idle_timeout = Duration::from_secs(60);
        }
        if self.eviction_interval.is_zero() || self.eviction_interval > self.flow_idle_timeout {
            self.eviction_interval = Duration::from_secs(10);
        }
        if self.capture_read_timeout.is_zero()
            || self.capture_read_timeout > self.eviction_interval
        {
            self.capture_read_timeout = Duration::from_secs(1);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::PortZero);
        }
        let addr = publisher_host_port(&self.publisher_addr);
        if addr.to_socket_addrs().map_or(true, |mut a| a.next().is_none()) {
            return Err(ConfigError::PublisherAddrInvalid(
                self.publisher_addr.clone(),
            ));
        }
        Ok(())
    }

    /// Fingerprinting is on unless either opt-out flag disables it.
    pub fn canonicalize(&self) -> bool {
        !(self.raw_queries || self.no_clean)
    }

    /// Capture filter equivalent of what this configuration observes.
    pub fn capture_filter(&self) -> String {
        format!("tcp port {}", self.port)
    }
}

/// Publisher addresses use the bus convention `tcp://host:port`.
pub fn publisher_host_port(addr: &str) -> &str {
    addr.strip_prefix("tcp://").unwrap_or(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topic_derives_from_tenant() {
        let mut config = Config::default();
        config.tenant_id = "acme".into();
        config.normalize();
        assert_eq!(config.topic, "cep.mysql.sniff.acme");

        let mut config = Config::default();
        config.topic = "custom.topic".into();
        config.normalize();
        assert_eq!(config.topic, "custom.topic");
    }

    #[test]
    fn canonicalize_flags() {
        let mut config = Config::default();
        assert!(config.canonicalize());
        config.no_clean = true;
        assert!(!config.canonicalize());
        config.no_clean = false;
        config.raw_queries = true;
        assert!(!config.canonicalize());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.publisher_addr = "tcp://127.0.0.1:7388".into();
        assert!(config.validate().is_ok());
        config.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::PortZero)));

        let mut config = Config::default();
        config.publisher_addr = "not an address".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PublisherAddrInvalid(_))
        ));
    }

    #[test]
    fn capture_filter_expression() {
        let config = Config::default();
        assert_eq!(config.capture_filter(), "tcp port 3306");
    }

    #[test]
    fn yaml_overlay() {
        let yaml = "port: 3307\nno-clean: true\nflow-idle-timeout: 30s\ntenant-id: acme\n";
        let mut config: Config = serde_yaml::from_str(yaml).unwrap();
        config.normalize();
        assert_eq!(config.port, 3307);
        assert!(config.no_clean);
        assert_eq!(config.flow_idle_timeout, Duration::from_secs(30));
        assert_eq!(config.topic, "cep.mysql.sniff.acme");
    }
}
