use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use crate::error::FetchError;

/// Retrieves raw bytes over the network.
///
/// Timeouts are the fetcher's business: they surface as [`FetchError::Unreachable`]
/// and are treated like any other fetch failure.
pub trait RemoteFetcher: Send + Sync {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`RemoteFetcher`] over HTTP(S) using a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lockstep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Unreachable {
                url: String::new(),
                reason: format!("could not build http client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl RemoteFetcher for HttpFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let unreachable = |e: reqwest::Error| FetchError::Unreachable {
            url: url.to_string(),
            reason: e.to_string(),
        };
        debug!(url, "GET");
        let resp = self.client.get(url).send().map_err(unreachable)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().map_err(unreachable)?;
        debug!(url, bytes = body.len(), "fetched");
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_bytes_returns_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/files/a.txt")
            .with_status(200)
            .with_body("hello")
            .create();

        let fetcher = HttpFetcher::new(HttpFetcher::DEFAULT_TIMEOUT).unwrap();
        let body = fetcher.get_bytes(&format!("{}/files/a.txt", server.url())).unwrap();

        assert_eq!(body, b"hello");
        mock.assert();
    }

    #[test]
    fn test_get_bytes_maps_404_to_http_status() {
        let mut server = mockito::Server::new();
        server.mock("GET", "/missing").with_status(404).create();

        let fetcher = HttpFetcher::new(HttpFetcher::DEFAULT_TIMEOUT).unwrap();
        let url = format!("{}/missing", server.url());
        let err = fetcher.get_bytes(&url).unwrap_err();

        assert_eq!(err, FetchError::HttpStatus { url, status: 404 });
    }

    #[test]
    fn test_get_bytes_unreachable_host() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();
        // port 9 (discard) on localhost is not expected to be listening
        let err = fetcher.get_bytes("http://127.0.0.1:9/nothing").unwrap_err();
        assert!(matches!(err, FetchError::Unreachable { .. }));
    }
}
