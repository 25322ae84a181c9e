use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;

use crate::data::ProxyAddress;
use crate::error::TransportError;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Response body of a ranged transfer.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Asynchronous HTTP client abstraction.
///
/// This trait provides the minimal interface the downloader needs: JSON calls against the
/// provider API, plain-text fetches of proxy lists, and streamed content transfers.
///
/// # Implementations
///
/// - [`ReqwestClient`]: Production implementation using `reqwest`
/// - Mock implementations for testing
pub trait HttpClient: Send + Sync + 'static {
    /// POST a JSON body and parse the JSON response.
    ///
    /// `timeout` bounds the whole exchange. A non-success status maps to
    /// [`TransportError::Status`].
    fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> impl Future<Output = Result<serde_json::Value, TransportError>> + Send;

    /// GET a small text resource.
    fn get_text(&self, url: &str) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// Open a streaming GET and return the response body as a stream.
    fn stream(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<ByteStream, TransportError>> + Send;
}

/// Builds clients, either direct or tunnelled through one proxy.
pub trait Connector: Send + Sync + 'static {
    type Client: HttpClient;

    fn direct(&self) -> Result<Self::Client, TransportError>;

    fn via_proxy(&self, proxy: &ProxyAddress) -> Result<Self::Client, TransportError>;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;
    use futures_util::StreamExt;
    use reqwest::header::CONTENT_TYPE;

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    const TEXT_TIMEOUT: Duration = Duration::from_secs(30);

    fn map_err(e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = e.status() {
            TransportError::Status(status.as_u16())
        } else if e.is_connect() || e.is_request() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Body(e.to_string())
        }
    }

    /// Production HTTP client implementation using reqwest.
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        /// Create a client that connects directly.
        pub fn new() -> Result<Self, TransportError> {
            Self::build(None)
        }

        /// Create a client that tunnels every request through `proxy`.
        pub fn with_proxy(proxy: &ProxyAddress) -> Result<Self, TransportError> {
            Self::build(Some(proxy))
        }

        fn build(proxy: Option<&ProxyAddress>) -> Result<Self, TransportError> {
            let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
            builder = match proxy {
                Some(proxy) => builder.proxy(reqwest::Proxy::all(proxy.to_string()).map_err(map_err)?),
                None => builder.no_proxy(),
            };
            let client = builder.build().map_err(map_err)?;
            Ok(Self { client })
        }
    }

    impl HttpClient for ReqwestClient {
        async fn post_json(
            &self,
            url: &str,
            body: &serde_json::Value,
            timeout: Duration,
        ) -> Result<serde_json::Value, TransportError> {
            let payload = serde_json::to_vec(body).map_err(|e| TransportError::Body(e.to_string()))?;
            let response = self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .timeout(timeout)
                .body(payload)
                .send()
                .await
                .map_err(map_err)?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }

            let bytes = response.bytes().await.map_err(map_err)?;
            serde_json::from_slice(&bytes).map_err(|e| TransportError::Body(e.to_string()))
        }

        async fn get_text(&self, url: &str) -> Result<String, TransportError> {
            let response = self.client.get(url).timeout(TEXT_TIMEOUT).send().await.map_err(map_err)?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }
            response.text().await.map_err(map_err)
        }

        async fn stream(&self, url: &str, headers: &[(String, String)]) -> Result<ByteStream, TransportError> {
            let mut request = self.client.get(url);

            for (key, value) in headers {
                request = request.header(key, value);
            }

            let response = request.send().await.map_err(map_err)?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }

            let stream = response.bytes_stream().map(|result| result.map_err(map_err));
            Ok(Box::pin(stream))
        }
    }

    /// Builds a [`ReqwestClient`] per proxy.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ReqwestConnector;

    impl Connector for ReqwestConnector {
        type Client = ReqwestClient;

        fn direct(&self) -> Result<ReqwestClient, TransportError> {
            ReqwestClient::new()
        }

        fn via_proxy(&self, proxy: &ProxyAddress) -> Result<ReqwestClient, TransportError> {
            ReqwestClient::with_proxy(proxy)
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::{ReqwestClient, ReqwestConnector};
