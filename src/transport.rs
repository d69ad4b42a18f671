//! Transport abstraction and its default one-shot hyper/rustls
//! implementation.
//!
//! Grounded on `client.rs`'s `TakoClient`/`TakoTlsClient`: the same
//! connect-handshake-send_request-collect_body shape, but opening a fresh
//! connection per call instead of keeping one alive, since the core's own
//! coalescing and caching make connection reuse an orthogonal concern the
//! design leaves to the transport.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, Method};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::error::Error;

/// A fully-built outbound request, ready to send.
pub struct TransportRequest {
    pub method: Method,
    pub url: url::Url,
    pub headers: HeaderMap,
    pub body: Option<bytes::Bytes>,
    pub timeout: Duration,
}

/// A completed response: status/headers plus the raw body bytes.
pub struct TransportResponse {
    pub parts: http::response::Parts,
    pub body: Vec<u8>,
}

/// What the Network Task needs from an HTTP client. Kept minimal and
/// object-safe so tests can substitute a stub without touching a socket.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error>;
}

/// Default `Transport`: opens one connection per request over rustls (for
/// `https`) or plain TCP (for everything else), in the style of
/// `TakoClient`/`TakoTlsClient`.
#[derive(Default)]
pub struct HyperTransport {
    #[cfg(feature = "tls")]
    tls_config: std::sync::OnceLock<Arc<rustls::ClientConfig>>,
}

impl HyperTransport {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(feature = "tls")]
    fn tls_config(&self) -> Arc<rustls::ClientConfig> {
        self.tls_config
            .get_or_init(|| {
                let mut roots = rustls::RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                Arc::new(
                    rustls::ClientConfig::builder()
                        .with_root_certificates(roots)
                        .with_no_client_auth(),
                )
            })
            .clone()
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
        let host = request
            .url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl("missing host".to_string()))?
            .to_string();
        let is_tls = request.url.scheme() == "https";
        let port = request
            .url
            .port_or_known_default()
            .unwrap_or(if is_tls { 443 } else { 80 });

        let body = Full::new(request.body.unwrap_or_default());
        let mut builder = http::Request::builder()
            .method(request.method)
            .uri(request.url.as_str());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        let http_request = builder.body(body).map_err(Error::transport)?;

        let send = async {
            let tcp = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(Error::transport)?;

            if is_tls {
                #[cfg(feature = "tls")]
                {
                    let connector = tokio_rustls::TlsConnector::from(self.tls_config());
                    let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                        .map_err(|e| Error::InvalidUrl(e.to_string()))?;
                    let tls_stream = connector
                        .connect(server_name, tcp)
                        .await
                        .map_err(Error::transport)?;
                    send_over(TokioIo::new(tls_stream), http_request).await
                }
                #[cfg(not(feature = "tls"))]
                {
                    Err(Error::InvalidUrl("TLS support not compiled in".to_string()))
                }
            } else {
                send_over(TokioIo::new(tcp), http_request).await
            }
        };

        tokio::time::timeout(request.timeout, send)
            .await
            .map_err(|_| Error::NoResponse)?
    }
}

async fn send_over<I>(
    io: I,
    request: http::Request<Full<bytes::Bytes>>,
) -> Result<TransportResponse, Error>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, conn) = http1::handshake(io).await.map_err(Error::transport)?;
    tokio::spawn(async move {
        if let Err(err) = conn.await {
            tracing::debug!(error = %err, "transport connection closed with error");
        }
    });

    let response = sender.send_request(request).await.map_err(Error::transport)?;
    let (parts, body) = response.into_parts();
    let collected = body.collect().await.map_err(Error::transport)?;
    Ok(TransportResponse {
        parts,
        body: collected.to_bytes().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Transport for Echo {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse, Error> {
            let (parts, _) = http::Response::builder()
                .status(200)
                .body(())
                .unwrap()
                .into_parts();
            Ok(TransportResponse {
                parts,
                body: request.url.as_str().as_bytes().to_vec(),
            })
        }
    }

    #[tokio::test]
    async fn stub_transport_round_trips_url_into_body() {
        let transport = Echo;
        let request = TransportRequest {
            method: Method::GET,
            url: url::Url::parse("https://example.com/ping").unwrap(),
            headers: HeaderMap::new(),
            body: None,
            timeout: Duration::from_secs(1),
        };
        let response = transport.send(request).await.unwrap();
        assert_eq!(response.parts.status, 200);
        assert_eq!(response.body, b"https://example.com/ping");
    }
}
