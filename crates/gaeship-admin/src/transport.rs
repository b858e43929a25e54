//! One-shot HTTP/1.1 exchanges over plain TCP or TLS.
//!
//! Each call opens a fresh connection, sends a single request, and reads
//! the full response body. The Admin API is called a handful of times per
//! minute, so no connection pool is kept.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{AdminError, AdminResult};

/// Where requests go: scheme, host, port, and an optional TLS connector.
#[derive(Clone)]
pub struct Endpoint {
    host: String,
    port: u16,
    tls: Option<TlsConnector>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl Endpoint {
    /// Parse a base URL such as `https://appengine.googleapis.com`.
    ///
    /// `https` uses the Mozilla root store; `http` is plain TCP and is meant
    /// for local emulators.
    pub fn parse(base: &str) -> AdminResult<Self> {
        let invalid = |reason: &str| AdminError::InvalidBase {
            url: base.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = base.parse().map_err(|_| invalid("not a url"))?;
        let host = uri.host().ok_or_else(|| invalid("missing host"))?.to_string();
        if uri.path() != "/" && !uri.path().is_empty() {
            return Err(invalid("base url must not have a path"));
        }

        let (tls, default_port) = match uri.scheme_str() {
            Some("https") => (Some(tls_connector()?), 443),
            Some("http") => (None, 80),
            _ => return Err(invalid("scheme must be http or https")),
        };

        Ok(Self {
            host,
            port: uri.port_u16().unwrap_or(default_port),
            tls,
        })
    }

    /// `host[:port]` as sent in the `Host` header.
    pub fn authority(&self) -> String {
        let default_port = if self.tls.is_some() { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Send one request and collect the response.
    pub async fn send(
        &self,
        req: Request<Full<Bytes>>,
        timeout: Duration,
    ) -> AdminResult<(StatusCode, Bytes)> {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let exchange = async {
            let address = (self.host.as_str(), self.port);
            let tcp = TcpStream::connect(address)
                .await
                .map_err(|source| AdminError::Connect {
                    authority: self.authority(),
                    source,
                })?;

            match &self.tls {
                Some(connector) => {
                    let server_name =
                        rustls::pki_types::ServerName::try_from(self.host.clone())
                            .map_err(|e| AdminError::Tls(e.to_string()))?;
                    let stream = connector
                        .connect(server_name, tcp)
                        .await
                        .map_err(|source| AdminError::Connect {
                            authority: self.authority(),
                            source,
                        })?;
                    exchange_over(stream, req).await
                }
                None => exchange_over(tcp, req).await,
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(AdminError::Timeout {
                method,
                path,
                timeout,
            }),
        }
    }
}

async fn exchange_over<T>(io: T, req: Request<Full<Bytes>>) -> AdminResult<(StatusCode, Bytes)>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io)).await?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "admin api connection closed with error");
        }
    });

    let resp = sender.send_request(req).await?;
    let status = resp.status();
    let body = resp.into_body().collect().await?.to_bytes();
    Ok((status, body))
}

/// TLS client configuration backed by the Mozilla root certificate store.
fn tls_connector() -> AdminResult<TlsConnector> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let mut config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|e| AdminError::Tls(format!("tls protocol version error: {e}")))?
    .with_root_certificates(root_store)
    .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsConnector::from(Arc::new(config)))
}
