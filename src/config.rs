use std::env;

/// Runtime configuration for the helpdesk API client.
/// Values are sourced from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub api_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - HELPDESK_TOKEN [required]
    /// - HELPDESK_API_URL (default: https://api.helpdesk.example.com)
    /// - HELPDESK_HTTP_TIMEOUT_SECS (default: 30)
    /// - HELPDESK_USER_AGENT (default: helpdesk-export/<version>)
    pub fn from_env() -> Result<Self, String> {
        let token =
            env::var("HELPDESK_TOKEN").map_err(|_| "Missing HELPDESK_TOKEN".to_string())?;

        let api_url = env::var("HELPDESK_API_URL")
            .unwrap_or_else(|_| "https://api.helpdesk.example.com".to_string());
        let timeout_secs = env::var("HELPDESK_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);
        let default_ua = format!(
            "helpdesk-export/{} (+https://github.com/helpdesk-tools/helpdesk-export)",
            env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".into())
        );
        let user_agent = env::var("HELPDESK_USER_AGENT").unwrap_or(default_ua);

        Ok(Self {
            token,
            api_url,
            user_agent,
            timeout_secs,
        })
    }

    /// Absolute URL for an API path relative to the versioned root.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.api_url.trim_end_matches('/'), path)
    }
}
