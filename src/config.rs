use std::net::{IpAddr, Ipv4Addr};

use crate::session;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the transport layer should bind to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,
    /// Idle seconds before an empty session is torn down
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            max_sessions: session::MAX_SESSIONS,
            session_idle_secs: session::DEFAULT_IDLE_TIMEOUT.as_secs(),
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.port = parsed,
                _ => tracing::warn!("Invalid PORT '{}', using default", port),
            }
        }

        if let Ok(max) = std::env::var("MAX_SESSIONS") {
            match max.parse::<usize>() {
                Ok(parsed) if (1..=10_000).contains(&parsed) => config.max_sessions = parsed,
                _ => tracing::warn!("MAX_SESSIONS must be 1-10000, using default"),
            }
        }

        if let Ok(idle) = std::env::var("SESSION_IDLE_SECS") {
            match idle.parse::<u64>() {
                Ok(parsed) if parsed > 0 => config.session_idle_secs = parsed,
                _ => tracing::warn!("Invalid SESSION_IDLE_SECS '{}', using default", idle),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.max_sessions == 0 {
            return Err("max_sessions must be at least 1".to_string());
        }
        if self.session_idle_secs == 0 {
            return Err("session_idle_secs must be at least 1".to_string());
        }
        Ok(())
    }
}
