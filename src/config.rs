//! Service configuration from the environment.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    /// Origin of the backend REST API, no trailing slash.
    pub backend_origin: String,
    pub port: u16,
    /// Interval of the background cart refresh.
    pub refresh_period: Duration,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let backend_origin = std::env::var("BACKEND_API_URL")
            .or_else(|_| std::env::var("NEXT_PUBLIC_API_URL"))
            .unwrap_or_else(|_| "http://localhost:5000".to_string())
            .trim_end_matches('/')
            .to_string();
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);
        let refresh_period = std::env::var("CART_REFRESH_SECS")
            .ok()
            .and_then(|p| p.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));
        Self {
            backend_origin,
            port,
            refresh_period,
            http_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        // Env vars are process-global; only assert the fallbacks that are
        // not set in any test environment.
        let config = Config::from_env();
        assert!(!config.backend_origin.ends_with('/'));
        assert_eq!(config.refresh_period, Duration::from_secs(300));
    }
}
