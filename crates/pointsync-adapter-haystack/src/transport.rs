//! Blocking HTTP transport contract.
//!
//! The adapter depends only on this minimal surface: GET/POST with a
//! header list and a text body, returning status, headers and body.
//! Timeouts and TLS policy live in the implementation; the protocol code
//! above never blocks on anything else.

use std::time::Duration;

/// A received HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lowercased
    pub headers: Vec<(String, String)>,
    /// Response body as text
    pub body: String,
}

impl HttpResponse {
    /// Build a response; header names are lowercased for lookup.
    #[must_use]
    pub fn new(status: u16, headers: Vec<(String, String)>, body: String) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        Self {
            status,
            headers,
            body,
        }
    }

    /// Case-insensitive single-header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let wanted = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(candidate, _)| *candidate == wanted)
            .map(|(_, value)| value.as_str())
    }

    /// Whether the status code is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A blocking HTTP client capable of GET/POST with custom headers.
pub trait HttpTransport {
    /// Issue a GET request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on connection, TLS or timeout failure;
    /// non-2xx statuses are responses, not errors.
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, TransportError>;

    /// Issue a POST request with a text body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on connection, TLS or timeout failure;
    /// non-2xx statuses are responses, not errors.
    fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> Result<HttpResponse, TransportError>;
}

/// Underlying network/HTTP failure, opaque to the protocol layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// `reqwest`-backed blocking transport.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Create a transport with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }

    fn convert(response: reqwest::blocking::Response) -> Result<HttpResponse, TransportError> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text().map_err(|e| TransportError(e.to_string()))?;
        Ok(HttpResponse::new(status, headers, body))
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, TransportError> {
        tracing::debug!(url, "GET");
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().map_err(|e| TransportError(e.to_string()))?;
        Self::convert(response)
    }

    fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> Result<HttpResponse, TransportError> {
        tracing::debug!(url, body_len = body.len(), "POST");
        let mut request = self.client.post(url).body(body.to_string());
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().map_err(|e| TransportError(e.to_string()))?;
        Self::convert(response)
    }
}
