//! Validated webhook destination.

use std::time::Duration;

use url::Url;

use crate::config::WebhookConfig;
use crate::webhook::signing::sign;
use crate::webhook::WebhookError;

#[derive(Debug, Clone)]
pub struct WebhookEndpoint {
    uri: Url,
    cluster: String,
    timeout: Duration,
    secret: Option<Vec<u8>>,
}

impl WebhookEndpoint {
    pub fn from_config(config: &WebhookConfig) -> Result<Self, WebhookError> {
        let uri = Url::parse(&config.uri)?;
        // Deliveries go over plain TCP to the cluster members.
        if uri.scheme() != "http" {
            return Err(WebhookError::UnsupportedScheme(uri.scheme().to_string()));
        }
        if uri.host_str().is_none() {
            return Err(WebhookError::MissingHost);
        }
        if config.cluster.trim().is_empty() {
            return Err(WebhookError::EmptyCluster);
        }
        if config.timeout_ms == 0 {
            return Err(WebhookError::ZeroTimeout);
        }

        Ok(Self {
            uri,
            cluster: config.cluster.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            secret: config
                .secret
                .as_ref()
                .filter(|s| !s.is_empty())
                .map(|s| s.as_bytes().to_vec()),
        })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Request target: path plus query, if any.
    pub fn path_and_query(&self) -> String {
        match self.uri.query() {
            Some(query) => format!("{}?{}", self.uri.path(), query),
            None => self.uri.path().to_string(),
        }
    }

    /// Value of the `Host` header: host plus explicit port, if any.
    pub fn authority(&self) -> String {
        let host = self.uri.host_str().unwrap_or_default();
        match self.uri.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Signature of `body`, when a secret is configured.
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        self.secret.as_deref().map(|secret| sign(secret, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(uri: &str) -> WebhookConfig {
        WebhookConfig {
            uri: uri.to_string(),
            cluster: "alerts".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_request_target_parts() {
        let endpoint = WebhookEndpoint::from_config(&config("http://hooks.example.com:8088/v1/events?src=proxy")).unwrap();
        assert_eq!(endpoint.path_and_query(), "/v1/events?src=proxy");
        assert_eq!(endpoint.authority(), "hooks.example.com:8088");
        assert_eq!(endpoint.timeout(), Duration::from_millis(1000));
        assert!(endpoint.sign(b"{}").is_none());
    }

    #[test]
    fn test_secret_enables_signing() {
        let endpoint = WebhookEndpoint::from_config(&WebhookConfig {
            secret: Some("s3cret".to_string()),
            ..config("http://hooks.example.com/")
        })
        .unwrap();
        assert_eq!(endpoint.authority(), "hooks.example.com");
        assert_eq!(
            endpoint.sign(br#"{"ruleId":"1"}"#).as_deref(),
            Some("8495e1bf911dccc08205ff7e91c477e92df58da7629a2effeba2d3a6ff69a59f")
        );
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(matches!(
            WebhookEndpoint::from_config(&config("ftp://hooks.example.com/")),
            Err(WebhookError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            WebhookEndpoint::from_config(&config("https://hooks.example.com/")),
            Err(WebhookError::UnsupportedScheme(scheme)) if scheme == "https"
        ));
        assert!(matches!(
            WebhookEndpoint::from_config(&config("/relative")),
            Err(WebhookError::InvalidUri(_))
        ));
        assert!(matches!(
            WebhookEndpoint::from_config(&WebhookConfig {
                cluster: String::new(),
                ..config("http://hooks.example.com/")
            }),
            Err(WebhookError::EmptyCluster)
        ));
        assert!(matches!(
            WebhookEndpoint::from_config(&WebhookConfig {
                timeout_ms: 0,
                ..config("http://hooks.example.com/")
            }),
            Err(WebhookError::ZeroTimeout)
        ));
    }
}
