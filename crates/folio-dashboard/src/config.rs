//! Dashboard settings (`[dashboard]` in the manager config).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Interface to bind; all interfaces unless set.
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Live `/ws` viewers allowed at once.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> usize {
    10
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

impl DashboardConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_override() {
        let config: DashboardConfig = serde_json::from_str(r#"{"host":"127.0.0.1","port":9000}"#).unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:9000");
        assert!(config.enabled);
        assert_eq!(config.max_connections, 10);
    }
}
