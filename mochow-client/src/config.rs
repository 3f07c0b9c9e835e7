//! Connection settings and credentials.

use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(300);
const WRITE_TIMEOUT: Duration = Duration::from_secs(300);

/// Endpoint, credentials and socket timeouts for a [`crate::MochowClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, e.g. `http://127.0.0.1:8287`.
    pub endpoint: String,
    pub account: String,
    pub api_key: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl ClientConfig {
    pub fn new(
        endpoint: impl Into<String>,
        account: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            account: account.into(),
            api_key: api_key.into(),
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
        }
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer account={}&api_key={}", self.account, self.api_key)
    }

    /// Full URL for `resource?action`.
    pub fn url(&self, resource: &str, action: &str) -> String {
        format!(
            "{}/v1/{}?{}",
            self.endpoint.trim_end_matches('/'),
            resource,
            action
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_header_carries_account_and_key() {
        let cfg = ClientConfig::new("http://localhost:8287", "root", "secret");
        assert_eq!(cfg.authorization(), "Bearer account=root&api_key=secret");
    }

    #[test]
    fn url_strips_trailing_slash() {
        let cfg = ClientConfig::new("http://localhost:8287/", "root", "secret");
        assert_eq!(
            cfg.url("database", "list"),
            "http://localhost:8287/v1/database?list"
        );
    }
}
