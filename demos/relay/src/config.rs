use netctx_core::PropagationConfig;
use thiserror::Error;

pub const ENV_HOST: &str = "NETCTX_HOST";
pub const ENV_HTTP_PORT: &str = "NETCTX_HTTP_PORT";
pub const ENV_GRPC_PORT: &str = "NETCTX_GRPC_PORT";

#[derive(Debug, Error)]
pub enum DemoConfigError {
    #[error("{var}: invalid port {value:?}")]
    InvalidPort { var: &'static str, value: String },
}

/// Where the two demo services listen and how they propagate.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub host: String,
    pub http_port: u16,
    pub grpc_port: u16,
    pub propagation: PropagationConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            http_port: 8080,
            grpc_port: 8081,
            propagation: PropagationConfig::default(),
        }
    }
}

impl DemoConfig {
    pub fn from_env() -> Result<Self, DemoConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, DemoConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(host) = lookup(ENV_HOST) {
            cfg.host = host;
        }
        if let Some(port) = lookup(ENV_HTTP_PORT) {
            cfg.http_port = parse_port(ENV_HTTP_PORT, port)?;
        }
        if let Some(port) = lookup(ENV_GRPC_PORT) {
            cfg.grpc_port = parse_port(ENV_GRPC_PORT, port)?;
        }
        Ok(cfg)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    pub fn grpc_addr(&self) -> String {
        format!("{}:{}", self.host, self.grpc_port)
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.http_addr())
    }

    pub fn grpc_url(&self) -> String {
        format!("http://{}", self.grpc_addr())
    }
}

fn parse_port(var: &'static str, value: String) -> Result<u16, DemoConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| DemoConfigError::InvalidPort { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let cfg = DemoConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.http_url(), "http://127.0.0.1:8080");
        assert_eq!(cfg.grpc_addr(), "127.0.0.1:8081");
    }

    #[test]
    fn env_overrides() {
        let cfg = DemoConfig::from_lookup(|name| match name {
            ENV_HOST => Some("localhost".into()),
            ENV_GRPC_PORT => Some("9001".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.grpc_url(), "http://localhost:9001");
        assert_eq!(cfg.http_port, 8080);
    }

    #[test]
    fn bad_port_is_rejected() {
        let res = DemoConfig::from_lookup(|name| (name == ENV_HTTP_PORT).then(|| "http".into()));
        assert!(matches!(
            res,
            Err(DemoConfigError::InvalidPort { var: ENV_HTTP_PORT, .. })
        ));
    }
}
