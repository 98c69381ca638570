//! Controller configuration from the environment

use crate::error::{Error, Result};
use std::net::{IpAddr, Ipv4Addr};

/// Output format of the log subscriber
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    pub log_format: LogFormat,
    /// Address gateway listeners bind to
    pub listen_host: IpAddr,
    /// Restrict the Service watch to one namespace
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Text,
            listen_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(format) = lookup("FETCHFY_LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "text" | "" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => {
                    return Err(Error::Configuration(format!(
                        "FETCHFY_LOG_FORMAT must be text or json, got {other}"
                    )))
                }
            };
        }

        if let Some(host) = lookup("FETCHFY_LISTEN_HOST") {
            config.listen_host = host.parse().map_err(|_| {
                Error::Configuration(format!("FETCHFY_LISTEN_HOST is not an IP address: {host}"))
            })?;
        }

        config.watch_namespace = lookup("FETCHFY_WATCH_NAMESPACE").filter(|ns| !ns.is_empty());

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ControllerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.listen_host.to_string(), "0.0.0.0");
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("FETCHFY_LOG_FORMAT", "JSON"),
            ("FETCHFY_LISTEN_HOST", "127.0.0.1"),
            ("FETCHFY_WATCH_NAMESPACE", "tools"),
        ])
        .unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.listen_host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.watch_namespace.as_deref(), Some("tools"));
    }

    #[test]
    fn test_empty_namespace_means_all() {
        let config = config(&[("FETCHFY_WATCH_NAMESPACE", "")]).unwrap();
        assert_eq!(config.watch_namespace, None);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("FETCHFY_LOG_FORMAT", "xml")]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            config(&[("FETCHFY_LISTEN_HOST", "localhost")]),
            Err(Error::Configuration(_))
        ));
    }
}
