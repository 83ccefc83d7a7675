use std::time::Duration;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_ENDPOINT: &str = "https://server.battleverse.cn/index/fight/item.do";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub endpoint: String,
    pub fetch_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            endpoint: DEFAULT_ENDPOINT.into(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank or unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            endpoint: var("BATTLE_ENDPOINT").unwrap_or(defaults.endpoint),
            fetch_timeout: var("FETCH_TIMEOUT_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or(defaults.fetch_timeout),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `RUST_LOG` value with our own directive appended when it is missing.
pub fn resolve_log_filter(env_override: Option<&str>) -> String {
    match env_override.map(str::trim) {
        Some(value) if !value.is_empty() => {
            let has_own_directive = value
                .split(',')
                .map(str::trim)
                .any(|d| d == "battle_score" || d.starts_with("battle_score="));
            if has_own_directive {
                value.to_owned()
            } else {
                format!("{value},battle_score=info")
            }
        }
        _ => "info,battle_score=info".to_owned(),
    }
}
