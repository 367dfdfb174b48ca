use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo";

fn default_max_file_size() -> usize {
    // 25 MB in bytes
    25 * 1024 * 1024
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub max_file_size: usize,
    /// Credential for the completion endpoint. Missing keys are reported when an
    /// analysis is attempted, not at startup.
    pub openai_key: Option<String>,
    pub openai_api_base: String,
    pub model: String,
    pub session_ttl: Duration,
    pub max_sessions: u64,
    pub fallback_on_error: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5001),
            max_file_size: default_max_file_size(),
            openai_key: None,
            openai_api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            session_ttl: Duration::from_secs(3600),
            max_sessions: 1000,
            fallback_on_error: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        let defaults = Config::default();

        let host: IpAddr = env_or("BIND_HOST", defaults.bind_addr.ip())?;
        let port: u16 = env_or("PORT", defaults.bind_addr.port())?;

        let openai_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        if openai_key.is_none() {
            tracing::warn!("OPENAI_API_KEY is not set; analysis requests will fail until it is configured");
        }

        Ok(Config {
            bind_addr: SocketAddr::new(host, port),
            max_file_size: env_or("MAX_FILE_SIZE", defaults.max_file_size)?,
            openai_key,
            openai_api_base: std::env::var("OPENAI_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openai_api_base),
            model: std::env::var("OPENAI_MODEL").unwrap_or(defaults.model),
            session_ttl: Duration::from_secs(env_or("SESSION_TTL_SECS", defaults.session_ttl.as_secs())?),
            max_sessions: env_or("MAX_SESSIONS", defaults.max_sessions)?,
            fallback_on_error: env_or("FALLBACK_ON_ANALYSIS_ERROR", defaults.fallback_on_error)?,
        })
    }
}

pub fn load_config() -> Result<Config> {
    Config::from_env()
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse {}={:?}", name, raw)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.bind_addr.port(), 5001);
        assert_eq!(config.max_file_size, 25 * 1024 * 1024);
        assert_eq!(config.model, "gpt-4-turbo");
        assert!(config.openai_key.is_none());
        assert!(!config.fallback_on_error);
    }

    #[test]
    fn env_or_falls_back_when_unset() {
        let value: u64 = env_or("DASHBOARD_SERVICES_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }
}
