//! HTTP Rule Source
//!
//! Fetches `GET {endpoint}/rules/{userId}` over hyper with rustls
//! (memory-safe TLS). The whole fetch is bounded by a timeout so a hung
//! service can never wedge an in-flight refresh.

use crate::source::{FetchError, Rule, RuleSource, decode_rules};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::USER_AGENT;
use hyper::{Method, Request, Uri};
use rustls::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// Rule service client configuration.
#[derive(Debug, Clone)]
pub struct RuleSourceConfig {
    /// Base URL of the rule service
    pub endpoint: String,
    /// Bound on the whole fetch (connect + request + body)
    pub timeout: Duration,
    /// User-Agent string
    pub user_agent: String,
}

impl Default for RuleSourceConfig {
    fn default() -> Self {
        Self {
            // Update this to your rule server address
            endpoint: "https://localhost:443".to_string(),
            timeout: Duration::from_secs(10),
            user_agent: "FocusGate/0.1".to_string(),
        }
    }
}

/// Rule source backed by the HTTP rule service.
pub struct HttpRuleSource {
    config: RuleSourceConfig,
}

impl HttpRuleSource {
    /// Create a client for the given service configuration.
    pub fn new(config: RuleSourceConfig) -> Self {
        Self { config }
    }

    /// Create a client with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RuleSourceConfig::default())
    }

    /// One fetch attempt, without the outer timeout.
    async fn fetch_once(&self, user_id: &str) -> Result<Vec<Rule>, FetchError> {
        let url = format!(
            "{}/rules/{}",
            self.config.endpoint.trim_end_matches('/'),
            user_id
        );
        let uri: Uri = url
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| FetchError::InvalidEndpoint(e.to_string()))?;

        let host = uri
            .host()
            .ok_or_else(|| FetchError::InvalidEndpoint("no host in endpoint".to_string()))?
            .to_string();
        let is_https = uri.scheme_str() == Some("https");
        let port = uri.port_u16().unwrap_or(if is_https { 443 } else { 80 });

        let request = Request::builder()
            .method(Method::GET)
            .uri(&uri)
            .header(USER_AGENT, &self.config.user_agent)
            .header("Host", host.clone())
            .body(Full::new(Bytes::new()))
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let addr = format!("{}:{}", host, port);
        let stream = tokio::net::TcpStream::connect(&addr)
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let response_result = if is_https {
            let mut root_store = rustls::RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let tls_config = ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth();

            let connector = TlsConnector::from(Arc::new(tls_config));
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|_| FetchError::Network("invalid server name".to_string()))?;

            let tls_stream = connector
                .connect(server_name, stream)
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            let io = hyper_util::rt::TokioIo::new(tls_stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    warn!("Connection error: {}", e);
                }
            });

            sender.send_request(request).await
        } else {
            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    warn!("Connection error: {}", e);
                }
            });

            sender.send_request(request).await
        };

        let response = response_result.map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let collected = response
            .into_body()
            .collect()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let body = collected.to_bytes();

        debug!("Fetched {} bytes of rules", body.len());
        decode_rules(&body)
    }
}

#[async_trait]
impl RuleSource for HttpRuleSource {
    async fn fetch_rules(&self, user_id: &str) -> Result<Vec<Rule>, FetchError> {
        match tokio::time::timeout(self.config.timeout, self.fetch_once(user_id)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one canned HTTP response on a local port.
    async fn one_shot_server(status_line: &str, body: &str) -> (String, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let response = format!(
            "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        (endpoint, server)
    }

    fn source_for(endpoint: String) -> HttpRuleSource {
        HttpRuleSource::new(RuleSourceConfig {
            endpoint,
            timeout: Duration::from_secs(5),
            ..RuleSourceConfig::default()
        })
    }

    #[tokio::test]
    async fn test_fetch_rules_ok() {
        let body = r#"[{"id":1,"domain":"example.com"},{"id":2,"domain":"tracker.net"}]"#;
        let (endpoint, server) = one_shot_server("HTTP/1.1 200 OK", body).await;

        let rules = source_for(endpoint).fetch_rules("user-1").await.unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].domain, "example.com");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_non_2xx_is_a_fetch_failure() {
        let (endpoint, server) =
            one_shot_server("HTTP/1.1 500 Internal Server Error", "oops").await;

        let result = source_for(endpoint).fetch_rules("user-1").await;

        assert!(matches!(result, Err(FetchError::Status(500))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let (endpoint, server) = one_shot_server("HTTP/1.1 200 OK", "<html>hi</html>").await;

        let result = source_for(endpoint).fetch_rules("user-1").await;

        assert!(matches!(result, Err(FetchError::MalformedPayload(_))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        // Port 9 (discard) is almost certainly closed.
        let source = source_for("http://127.0.0.1:9".to_string());

        let result = source.fetch_rules("user-1").await;

        assert!(matches!(
            result,
            Err(FetchError::Network(_)) | Err(FetchError::Timeout)
        ));
    }
}
