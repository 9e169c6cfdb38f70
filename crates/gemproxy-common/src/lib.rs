use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, thiserror::Error)]
pub enum GlobalConfigError {
    #[error("invalid global config field {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Final, merged configuration used by the running process.
///
/// Merge order: CLI/ENV > config file > built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub host: String,
    pub port: u16,
    /// Used when a request carries no `Authorization: Bearer` header.
    #[serde(skip_serializing)]
    pub default_api_key: Option<String>,
    pub upstream_base_url: String,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
    pub connect_timeout_secs: u64,
    /// Bounds non-streaming upstream calls and image downloads.
    pub request_timeout_secs: u64,
    /// Longest silence tolerated between two chunks of a streaming reply.
    pub stream_idle_timeout_secs: u64,
    pub max_body_bytes: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            default_api_key: None,
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            proxy: None,
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            stream_idle_timeout_secs: 60,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl GlobalConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Optional layer used for merging global config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub default_api_key: Option<String>,
    pub upstream_base_url: Option<String>,
    pub proxy: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub stream_idle_timeout_secs: Option<u64>,
    pub max_body_bytes: Option<usize>,
}

impl GlobalConfigPatch {
    /// Read a JSON patch from disk.
    pub fn from_file(path: &str) -> Result<Self, GlobalConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| GlobalConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| GlobalConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Fields set in `other` win.
    pub fn overlay(&mut self, other: GlobalConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.default_api_key.is_some() {
            self.default_api_key = other.default_api_key;
        }
        if other.upstream_base_url.is_some() {
            self.upstream_base_url = other.upstream_base_url;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.connect_timeout_secs.is_some() {
            self.connect_timeout_secs = other.connect_timeout_secs;
        }
        if other.request_timeout_secs.is_some() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
        if other.stream_idle_timeout_secs.is_some() {
            self.stream_idle_timeout_secs = other.stream_idle_timeout_secs;
        }
        if other.max_body_bytes.is_some() {
            self.max_body_bytes = other.max_body_bytes;
        }
    }

    pub fn into_config(self) -> Result<GlobalConfig, GlobalConfigError> {
        let defaults = GlobalConfig::default();
        let upstream_base_url = self
            .upstream_base_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.upstream_base_url);
        if upstream_base_url.is_empty() {
            return Err(GlobalConfigError::Invalid {
                field: "upstream_base_url",
                reason: "must not be empty",
            });
        }

        let config = GlobalConfig {
            host: self.host.unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            default_api_key: non_empty(self.default_api_key),
            upstream_base_url,
            proxy: non_empty(self.proxy),
            connect_timeout_secs: self
                .connect_timeout_secs
                .unwrap_or(defaults.connect_timeout_secs),
            request_timeout_secs: self
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
            stream_idle_timeout_secs: self
                .stream_idle_timeout_secs
                .unwrap_or(defaults.stream_idle_timeout_secs),
            max_body_bytes: self.max_body_bytes.unwrap_or(defaults.max_body_bytes),
        };

        for (field, value) in [
            ("connect_timeout_secs", config.connect_timeout_secs),
            ("request_timeout_secs", config.request_timeout_secs),
            ("stream_idle_timeout_secs", config.stream_idle_timeout_secs),
        ] {
            if value == 0 {
                return Err(GlobalConfigError::Invalid {
                    field,
                    reason: "must be greater than zero",
                });
            }
        }

        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_yields_defaults() {
        let config = GlobalConfigPatch::default().into_config().unwrap();
        assert_eq!(config, GlobalConfig::default());
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn later_layer_wins() {
        let mut base = GlobalConfigPatch {
            port: Some(9000),
            default_api_key: Some("file-key".to_string()),
            ..Default::default()
        };
        base.overlay(GlobalConfigPatch {
            default_api_key: Some("env-key".to_string()),
            ..Default::default()
        });
        let config = base.into_config().unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.default_api_key.as_deref(), Some("env-key"));
    }

    #[test]
    fn blank_key_is_absent_and_base_url_is_trimmed() {
        let config = GlobalConfigPatch {
            default_api_key: Some("  ".to_string()),
            upstream_base_url: Some("http://localhost:9999/".to_string()),
            ..Default::default()
        }
        .into_config()
        .unwrap();
        assert_eq!(config.default_api_key, None);
        assert_eq!(config.upstream_base_url, "http://localhost:9999");
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = GlobalConfigPatch {
            request_timeout_secs: Some(0),
            ..Default::default()
        }
        .into_config()
        .unwrap_err();
        assert!(matches!(
            err,
            GlobalConfigError::Invalid {
                field: "request_timeout_secs",
                ..
            }
        ));
    }

    #[test]
    fn patch_parses_from_partial_json() {
        let patch: GlobalConfigPatch = serde_json::from_str(r#"{"port": 3000}"#).unwrap();
        assert_eq!(patch.port, Some(3000));
        assert_eq!(patch.host, None);
    }
}
