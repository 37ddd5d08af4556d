//! HTTPS backend: read-only fetch of stashes published at a URL.
//!
//! Saving and sharing are refused before any network traffic happens.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use stashconf::StashConfig;
use thiserror::Error;
use tracing::warn;

use crate::address::{Address, AddressShape};
use crate::codec::ArgValue;
use crate::error::{StashError, StashResult};
use crate::stash::{LinkedStash, Stash};

use super::Backend;

pub const HTTPS: &str = "https";

/// Status and body of a completed GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport failure: the request never produced a response.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HttpClientError(pub String);

/// Minimal blocking HTTP client.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, HttpClientError>;
}

/// [`HttpClient`] over `reqwest`'s blocking client.
///
/// Must not be built or dropped inside an async runtime; wrap calls in
/// `spawn_blocking` when used from async code.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> StashResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StashError::remote(HTTPS, format!("failed to build http client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<HttpResponse, HttpClientError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| HttpClientError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| HttpClientError(format!("failed to read body: {}", e)))?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Read-only backend for `https://host/path` addresses.
///
/// Addresses are fetched exactly as written.
#[derive(Clone)]
pub struct HttpBackend {
    client: OnceLock<Arc<dyn HttpClient>>,
    timeout: Duration,
}

impl HttpBackend {
    /// Backend over an existing client.
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client: OnceLock::from(client),
            timeout: Duration::ZERO,
        }
    }

    /// Backend that builds a [`ReqwestClient`] on its first fetch.
    ///
    /// Selection, save and share never construct a client.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: OnceLock::new(),
            timeout,
        }
    }

    fn client(&self) -> StashResult<&Arc<dyn HttpClient>> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let built: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(self.timeout)?);
        Ok(self.client.get_or_init(|| built))
    }
}

impl Backend for HttpBackend {
    fn name(&self) -> &str {
        HTTPS
    }

    fn shape(&self) -> AddressShape {
        AddressShape::Url
    }

    fn accepts(&self, _value: &ArgValue, _config: &StashConfig) -> bool {
        false
    }

    fn make_address(&self, _stash: &Stash) -> StashResult<Address> {
        Err(StashError::unsupported(HTTPS, "save"))
    }

    fn persist(&self, _stash: &LinkedStash) -> StashResult<()> {
        Err(StashError::unsupported(HTTPS, "save"))
    }

    fn fetch(&self, address: &Address) -> StashResult<Vec<u8>> {
        let url = address.to_string();
        let response = self.client()?.get(&url).map_err(|e| {
            warn!(backend = HTTPS, %url, error = %e, "http request failed");
            StashError::remote(HTTPS, format!("GET {}: {}", url, e))
        })?;

        match response.status {
            403 | 404 => Err(StashError::StashNotFound(url)),
            _ if response.is_success() => Ok(response.body),
            status => {
                warn!(backend = HTTPS, %url, status, "unexpected http status");
                Err(StashError::remote(HTTPS, format!("GET {}: status {}", url, status)))
            }
        }
    }

    fn save(
        &self,
        _name: &str,
        _data: ArgValue,
        _namespace: &str,
        _config: &StashConfig,
    ) -> StashResult<LinkedStash> {
        Err(StashError::unsupported(HTTPS, "save"))
    }
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("client_built", &self.client.get().is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Client that answers every request with a canned result.
    struct CannedClient {
        response: Mutex<Option<Result<HttpResponse, HttpClientError>>>,
        calls: AtomicUsize,
        last_url: Mutex<Option<String>>,
    }

    impl CannedClient {
        fn new(response: Result<HttpResponse, HttpClientError>) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(response)),
                calls: AtomicUsize::new(0),
                last_url: Mutex::new(None),
            })
        }

        fn status(status: u16, body: Vec<u8>) -> Arc<Self> {
            Self::new(Ok(HttpResponse { status, body }))
        }
    }

    impl HttpClient for CannedClient {
        fn get(&self, url: &str) -> Result<HttpResponse, HttpClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_url.lock().unwrap() = Some(url.to_string());
            self.response
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(HttpClientError("no more responses".into())))
        }
    }

    #[test]
    fn test_load_success() {
        let body = codec::encode(&ArgValue::from("red-red")).unwrap();
        let client = CannedClient::status(200, body);
        let backend = HttpBackend::new(client.clone());

        let loaded = backend.load("https://example.com/stash/color").unwrap();
        assert_eq!(loaded.data(), &ArgValue::from("red-red"));
        assert_eq!(loaded.backend(), HTTPS);
        assert_eq!(loaded.namespace(), "example.com");
        assert_eq!(loaded.name(), "stash/color");
        assert_eq!(
            client.last_url.lock().unwrap().as_deref(),
            Some("https://example.com/stash/color")
        );
    }

    #[test]
    fn test_fetches_address_verbatim() {
        for url in [
            "https://example.com/x?q=a%20b",
            "https://example.com/x?a=b~c",
            "https://example.com/x?download",
            "https://example.com:443/x",
            "https://Example.COM/x",
        ] {
            let body = codec::encode(&ArgValue::Int(1)).unwrap();
            let client = CannedClient::status(200, body);
            let backend = HttpBackend::new(client.clone());

            let loaded = backend.load(url).unwrap();
            assert_eq!(client.last_url.lock().unwrap().as_deref(), Some(url));
            assert_eq!(loaded.address().to_string(), url);
        }
    }

    #[test]
    fn test_lazy_client_not_built_without_fetch() {
        let backend = HttpBackend::with_timeout(Duration::from_secs(1));
        let config = StashConfig::default();

        assert!(!backend.accepts(&ArgValue::Int(1), &config));
        assert!(backend.save("x", ArgValue::Int(1), "app", &config).is_err());
        assert!(backend.client.get().is_none());
    }

    #[test]
    fn test_not_found_statuses() {
        for status in [403, 404] {
            let backend = HttpBackend::new(CannedClient::status(status, Vec::new()));
            match backend.load("https://example.com/x") {
                Err(StashError::StashNotFound(address)) => {
                    assert_eq!(address, "https://example.com/x")
                }
                other => panic!("status {}: expected StashNotFound, got {:?}", status, other),
            }
        }
    }

    #[test]
    fn test_other_statuses_are_remote_errors() {
        for status in [301, 400, 500, 503] {
            let backend = HttpBackend::new(CannedClient::status(status, Vec::new()));
            assert!(
                matches!(
                    backend.load("https://example.com/x"),
                    Err(StashError::BackendRemote { .. })
                ),
                "status {}",
                status
            );
        }
    }

    #[test]
    fn test_transport_error_is_remote_error() {
        let backend = HttpBackend::new(CannedClient::new(Err(HttpClientError(
            "connection refused".into(),
        ))));
        match backend.load("https://example.com/x") {
            Err(StashError::BackendRemote { backend, message }) => {
                assert_eq!(backend, HTTPS);
                assert!(message.contains("connection refused"));
            }
            other => panic!("expected BackendRemote, got {:?}", other),
        }
    }

    #[test]
    fn test_undecodable_body_is_encoding_error() {
        let backend = HttpBackend::new(CannedClient::status(200, b"<html>".to_vec()));
        assert!(matches!(
            backend.load("https://example.com/x"),
            Err(StashError::Encoding(_))
        ));
    }

    #[test]
    fn test_save_and_share_never_touch_network() {
        let client = CannedClient::status(200, Vec::new());
        let backend = HttpBackend::new(client.clone());
        let config = StashConfig::default();

        assert!(!backend.accepts(&ArgValue::Int(1), &config));
        assert!(matches!(
            backend.save("x", ArgValue::Int(1), "app", &config),
            Err(StashError::UnsupportedOperation { .. })
        ));

        let linked = Stash::new("app", "x", ArgValue::Int(1))
            .unwrap()
            .link(HTTPS, backend.parse_address("https://example.com/x").unwrap());
        assert!(matches!(
            backend.make_share_address(&linked, 60),
            Err(StashError::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            backend.persist(&linked),
            Err(StashError::UnsupportedOperation { .. })
        ));

        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rejects_non_https_addresses() {
        let backend = HttpBackend::new(CannedClient::status(200, Vec::new()));
        for address in [
            "http://example.com/x",
            "https://example.com/",
            "https://user:pw@example.com/x",
            "https://example.com/x#frag",
        ] {
            assert!(
                matches!(
                    backend.load(address),
                    Err(StashError::InvalidAddress { .. })
                ),
                "{}",
                address
            );
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reqwest_client_against_server() {
        let server = MockServer::start().await;
        let body = codec::encode(&ArgValue::Int(42)).unwrap();
        Mock::given(method("GET"))
            .and(path("/stash/answer"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/stash/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let base = server.uri();
        let (found, missing) = tokio::task::spawn_blocking(move || {
            let client = ReqwestClient::new(Duration::from_secs(5)).unwrap();
            let found = client.get(&format!("{}/stash/answer", base)).unwrap();
            let missing = client.get(&format!("{}/stash/missing", base)).unwrap();
            (found, missing)
        })
        .await
        .unwrap();

        assert_eq!(found.status, 200);
        assert_eq!(found.body, body);
        assert_eq!(missing.status, 404);
    }
}
