// ABOUTME: Reachability check for an outbound proxy.
// ABOUTME: Opens a tunnel to a fixed target through HTTP CONNECT or a SOCKS5 handshake.

use bytes::Bytes;
use http_body_util::Empty;
use hyper::{Method, Request, Uri};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{ProxySettings, ProxyType};

/// Where a check tunnels to unless configured otherwise.
pub const DEFAULT_CHECK_TARGET: &str = "registry-1.docker.io:443";

/// Upper bound on one check, connect through tunnel reply.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

const SOCKS_VERSION: u8 = 0x05;
const SOCKS_NO_AUTH: u8 = 0x00;
const SOCKS_CONNECT: u8 = 0x01;
const SOCKS_DOMAIN: u8 = 0x03;

#[derive(Debug, thiserror::Error)]
pub enum ProxyCheckError {
    #[error("invalid proxy address: {0:?}")]
    InvalidAddress(String),

    #[error("invalid check target: {0:?}")]
    InvalidTarget(String),

    #[error("cannot reach proxy {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("proxy check timeout after {0:?}")]
    Timeout(Duration),

    #[error("proxy refused tunnel to {target}: {reason}")]
    Refused { target: String, reason: String },

    #[error("proxy protocol error: {0}")]
    Protocol(String),
}

/// A proxy that answered a tunnel request.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyCheck {
    pub proxy_type: ProxyType,
    pub address: String,
    pub target: String,
    /// Time from connecting to the proxy until the tunnel was granted.
    pub elapsed_ms: u64,
}

/// Checks proxies by asking them for a tunnel to one target.
#[derive(Debug, Clone)]
pub struct ProxyChecker {
    target: String,
    timeout: Duration,
}

impl Default for ProxyChecker {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_TARGET, DEFAULT_CHECK_TIMEOUT)
    }
}

impl ProxyChecker {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Open and immediately drop a tunnel through `settings`.
    ///
    /// Nothing is sent through the tunnel; a granted tunnel is enough.
    pub async fn check(&self, settings: &ProxySettings) -> Result<ProxyCheck, ProxyCheckError> {
        let (host, port) = proxy_endpoint(settings)?;
        let (target_host, target_port) = split_host_port(&self.target)
            .ok_or_else(|| ProxyCheckError::InvalidTarget(self.target.clone()))?;

        tracing::info!(
            proxy_type = %settings.proxy_type,
            address = %settings.address,
            target = %self.target,
            "Checking proxy"
        );

        let started = Instant::now();
        let attempt = async {
            let stream = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|source| ProxyCheckError::Connect {
                    address: settings.address.clone(),
                    source,
                })?;

            match settings.proxy_type {
                ProxyType::Http | ProxyType::Https => http_connect(stream, &self.target).await,
                ProxyType::Socks5 => socks5_connect(stream, target_host, target_port).await,
            }
        };

        tokio::time::timeout(self.timeout, attempt)
            .await
            .map_err(|_| ProxyCheckError::Timeout(self.timeout))??;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(address = %settings.address, elapsed_ms, "proxy reachable");

        Ok(ProxyCheck {
            proxy_type: settings.proxy_type,
            address: settings.address.clone(),
            target: self.target.clone(),
            elapsed_ms,
        })
    }
}

/// Host and port of the proxy itself; the scheme is optional.
fn proxy_endpoint(settings: &ProxySettings) -> Result<(String, u16), ProxyCheckError> {
    let invalid = || ProxyCheckError::InvalidAddress(settings.address.clone());

    let uri: Uri = settings.address.parse().map_err(|_| invalid())?;
    let host = uri.host().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
    let port = uri.port_u16().unwrap_or(match settings.proxy_type {
        ProxyType::Socks5 => 1080,
        ProxyType::Http | ProxyType::Https => 80,
    });

    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok((host.to_string(), port))
}

fn split_host_port(target: &str) -> Option<(&str, u16)> {
    let (host, port) = target.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    Some((host, port.parse().ok()?))
}

async fn http_connect(stream: TcpStream, target: &str) -> Result<(), ProxyCheckError> {
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| ProxyCheckError::Protocol(format!("HTTP handshake failed: {}", e)))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "proxy connection closed");
        }
    });

    let request = Request::builder()
        .method(Method::CONNECT)
        .uri(target)
        .header(hyper::header::HOST, target)
        .body(Empty::<Bytes>::new())
        .map_err(|e| ProxyCheckError::Protocol(format!("failed to build request: {}", e)))?;

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| ProxyCheckError::Protocol(format!("request failed: {}", e)))?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ProxyCheckError::Refused {
            target: target.to_string(),
            reason: format!("status {}", status),
        })
    }
}

async fn socks5_connect(mut stream: TcpStream, host: &str, port: u16) -> Result<(), ProxyCheckError> {
    let target = format!("{}:{}", host, port);
    let io = |e: std::io::Error| ProxyCheckError::Protocol(format!("SOCKS5 exchange failed: {}", e));

    stream
        .write_all(&[SOCKS_VERSION, 1, SOCKS_NO_AUTH])
        .await
        .map_err(io)?;
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await.map_err(io)?;
    if choice != [SOCKS_VERSION, SOCKS_NO_AUTH] {
        return Err(ProxyCheckError::Refused {
            target,
            reason: "proxy requires authentication".to_string(),
        });
    }

    let host_len =
        u8::try_from(host.len()).map_err(|_| ProxyCheckError::InvalidTarget(target.clone()))?;
    let mut request = vec![SOCKS_VERSION, SOCKS_CONNECT, 0x00, SOCKS_DOMAIN, host_len];
    request.extend_from_slice(host.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await.map_err(io)?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await.map_err(io)?;
    if head[0] != SOCKS_VERSION {
        return Err(ProxyCheckError::Protocol(format!(
            "unexpected SOCKS version {}",
            head[0]
        )));
    }

    match head[1] {
        0x00 => Ok(()),
        code => Err(ProxyCheckError::Refused {
            target,
            reason: socks_reply(code).to_string(),
        }),
    }
}

fn socks_reply(code: u8) -> &'static str {
    match code {
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown SOCKS reply",
    }
}
