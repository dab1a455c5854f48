use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub host: String,
    pub port: u16,
    /// Administrator created at startup when both are set.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?
            .unwrap_or(10);
        let host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = std::env::var("APP_PORT")
            .ok()
            .map(|v| v.parse::<u16>())
            .transpose()
            .context("APP_PORT must be a port number")?
            .unwrap_or(8080);

        let admin_email = std::env::var("ADMIN_EMAIL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let admin_password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .filter(|v| !v.is_empty());
        if admin_email.is_some() != admin_password.is_some() {
            anyhow::bail!("ADMIN_EMAIL and ADMIN_PASSWORD must be set together");
        }

        Ok(Self {
            database_url,
            max_connections,
            host,
            port,
            admin_email,
            admin_password,
        })
    }

    pub fn admin_credentials(&self) -> Option<(&str, &str)> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_joins_host_and_port() {
        let config = AppConfig {
            database_url: None,
            max_connections: 10,
            host: "127.0.0.1".into(),
            port: 8080,
            admin_email: None,
            admin_password: None,
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert!(config.admin_credentials().is_none());
    }

    #[test]
    fn admin_credentials_need_both_values() {
        let mut config = AppConfig {
            database_url: None,
            max_connections: 10,
            host: "127.0.0.1".into(),
            port: 8080,
            admin_email: Some("admin@example.com".into()),
            admin_password: None,
        };
        assert!(config.admin_credentials().is_none());
        config.admin_password = Some("testing1234".into());
        assert_eq!(
            config.admin_credentials(),
            Some(("admin@example.com", "testing1234"))
        );
    }
}
