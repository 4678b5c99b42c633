//! TCP connector with proxy tunnelling.
//!
//! Produces a plain TCP stream to the origin, or to the proxy for plain-http
//! requests through an HTTP proxy. HTTPS targets behind an HTTP proxy get a
//! `CONNECT` tunnel; SOCKS proxies always tunnel. TLS is layered on top by
//! `hyper-rustls`.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::Uri;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::{ProxyKind, ProxySetting};
use crate::error::TransportCode;

const MAX_CONNECT_RESPONSE: usize = 16 * 1024;

/// Connection failure with the transport code it maps to.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub(super) struct ConnectError {
    pub(super) code: TransportCode,
    message: String,
}

impl ConnectError {
    fn new(code: TransportCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// `Proxy-Authorization` value for proxies configured with credentials.
pub(super) fn basic_auth(proxy: &ProxySetting) -> Option<String> {
    let user = proxy.username.as_deref()?;
    let pass = proxy.password.as_ref().map_or("", |p| p.expose());
    Some(format!("Basic {}", STANDARD.encode(format!("{user}:{pass}"))))
}

#[derive(Debug, Clone)]
pub(super) struct ProxyConnector {
    proxy: Option<ProxySetting>,
}

impl ProxyConnector {
    pub(super) fn new(proxy: Option<ProxySetting>) -> Self {
        Self { proxy }
    }

    async fn connect(self, dst: Uri) -> Result<TokioIo<TcpStream>, ConnectError> {
        let host = dst
            .host()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_owned())
            .ok_or_else(|| ConnectError::new(TransportCode::UrlMalformed, "URL has no host"))?;
        let is_https = dst.scheme_str() == Some("https");
        let port = dst.port_u16().unwrap_or(if is_https { 443 } else { 80 });

        let stream = match &self.proxy {
            None => tcp_connect(&host, port, TransportCode::CouldNotResolveHost).await?,
            Some(proxy) => {
                let stream =
                    tcp_connect(&proxy.hostname, proxy.port, TransportCode::CouldNotResolveProxy)
                        .await?;
                match proxy.kind {
                    ProxyKind::Http | ProxyKind::Https if is_https => {
                        http_tunnel(stream, &host, port, basic_auth(proxy)).await?
                    }
                    ProxyKind::Http | ProxyKind::Https => stream,
                    ProxyKind::Socks4 => socks4(stream, &host, port, proxy, false).await?,
                    ProxyKind::Socks4a => socks4(stream, &host, port, proxy, true).await?,
                    ProxyKind::Socks5 => socks5(stream, &host, port, proxy).await?,
                }
            }
        };
        Ok(TokioIo::new(stream))
    }
}

impl tower::Service<Uri> for ProxyConnector {
    type Response = TokioIo<TcpStream>;
    type Error = ConnectError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        Box::pin(self.clone().connect(dst))
    }
}

async fn resolve(host: &str, port: u16, code: TransportCode) -> Result<Vec<SocketAddr>, ConnectError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ConnectError::new(code, format!("failed to resolve '{host}': {e}")))?
        .collect();
    if addrs.is_empty() {
        return Err(ConnectError::new(code, format!("'{host}' has no addresses")));
    }
    Ok(addrs)
}

async fn tcp_connect(host: &str, port: u16, resolve_code: TransportCode) -> Result<TcpStream, ConnectError> {
    let mut last_err = None;
    for addr in resolve(host, port, resolve_code).await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(error = %e, "failed to set TCP_NODELAY");
                }
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect attempt failed");
                last_err = Some(e);
            }
        }
    }
    let detail = last_err.map_or_else(|| "no address".to_owned(), |e| e.to_string());
    Err(ConnectError::new(
        TransportCode::CouldNotConnect,
        format!("failed to connect to {host}:{port}: {detail}"),
    ))
}

fn handshake_failed(what: &str, err: &std::io::Error) -> ConnectError {
    ConnectError::new(
        TransportCode::CouldNotConnect,
        format!("{what} handshake failed: {err}"),
    )
}

async fn http_tunnel(
    mut stream: TcpStream,
    host: &str,
    port: u16,
    auth: Option<String>,
) -> Result<TcpStream, ConnectError> {
    let authority = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };
    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(auth) = auth {
        request.push_str("Proxy-Authorization: ");
        request.push_str(&auth);
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| ConnectError::new(TransportCode::SendError, format!("CONNECT failed: {e}")))?;

    let mut buf = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| ConnectError::new(TransportCode::RecvError, format!("CONNECT failed: {e}")))?;
        if n == 0 {
            return Err(ConnectError::new(
                TransportCode::RecvError,
                "proxy closed the connection during CONNECT",
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_CONNECT_RESPONSE {
            return Err(ConnectError::new(
                TransportCode::RecvError,
                "proxy CONNECT response too large",
            ));
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .unwrap_or(0);
    if (200..300).contains(&status) {
        Ok(stream)
    } else {
        Err(ConnectError::new(
            TransportCode::RecvError,
            format!("proxy refused CONNECT to {authority} with status {status}"),
        ))
    }
}

async fn socks4(
    mut stream: TcpStream,
    host: &str,
    port: u16,
    proxy: &ProxySetting,
    remote_dns: bool,
) -> Result<TcpStream, ConnectError> {
    let mut request = vec![0x04, 0x01];
    request.extend_from_slice(&port.to_be_bytes());

    let ipv4 = match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => Some(ip),
        Ok(IpAddr::V6(_)) => {
            return Err(ConnectError::new(
                TransportCode::CouldNotConnect,
                "SOCKS4 does not support IPv6 targets",
            ));
        }
        Err(_) if remote_dns => None,
        Err(_) => resolve(host, port, TransportCode::CouldNotResolveHost)
            .await?
            .into_iter()
            .find_map(|addr| match addr.ip() {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .map(Some)
            .ok_or_else(|| {
                ConnectError::new(
                    TransportCode::CouldNotResolveHost,
                    format!("'{host}' has no IPv4 address"),
                )
            })?,
    };

    // SOCKS4a: 0.0.0.x tells the proxy to resolve the host name itself.
    request.extend_from_slice(&ipv4.map_or([0, 0, 0, 1], |ip| ip.octets()));
    request.extend_from_slice(proxy.username.as_deref().unwrap_or_default().as_bytes());
    request.push(0);
    if ipv4.is_none() {
        request.extend_from_slice(host.as_bytes());
        request.push(0);
    }

    stream
        .write_all(&request)
        .await
        .map_err(|e| handshake_failed("SOCKS4", &e))?;
    let mut reply = [0u8; 8];
    stream
        .read_exact(&mut reply)
        .await
        .map_err(|e| handshake_failed("SOCKS4", &e))?;
    if reply[1] == 0x5a {
        Ok(stream)
    } else {
        Err(ConnectError::new(
            TransportCode::CouldNotConnect,
            format!("SOCKS4 request rejected (code {:#04x})", reply[1]),
        ))
    }
}

async fn socks5(
    mut stream: TcpStream,
    host: &str,
    port: u16,
    proxy: &ProxySetting,
) -> Result<TcpStream, ConnectError> {
    let credentials = proxy.username.as_deref().map(|user| {
        (
            user.to_owned(),
            proxy
                .password
                .as_ref()
                .map_or_else(String::new, |p| p.expose().to_owned()),
        )
    });
    let greeting: &[u8] = if credentials.is_some() {
        &[0x05, 0x02, 0x00, 0x02]
    } else {
        &[0x05, 0x01, 0x00]
    };
    stream
        .write_all(greeting)
        .await
        .map_err(|e| handshake_failed("SOCKS5", &e))?;
    let mut choice = [0u8; 2];
    stream
        .read_exact(&mut choice)
        .await
        .map_err(|e| handshake_failed("SOCKS5", &e))?;

    match (choice[1], credentials) {
        (0x00, _) => {}
        (0x02, Some((user, pass))) => {
            let user_len = u8::try_from(user.len()).map_err(|_| {
                ConnectError::new(TransportCode::CouldNotConnect, "SOCKS5 user name too long")
            })?;
            let pass_len = u8::try_from(pass.len()).map_err(|_| {
                ConnectError::new(TransportCode::CouldNotConnect, "SOCKS5 password too long")
            })?;
            let mut auth = vec![0x01, user_len];
            auth.extend_from_slice(user.as_bytes());
            auth.push(pass_len);
            auth.extend_from_slice(pass.as_bytes());
            stream
                .write_all(&auth)
                .await
                .map_err(|e| handshake_failed("SOCKS5", &e))?;
            let mut status = [0u8; 2];
            stream
                .read_exact(&mut status)
                .await
                .map_err(|e| handshake_failed("SOCKS5", &e))?;
            if status[1] != 0x00 {
                return Err(ConnectError::new(
                    TransportCode::CouldNotConnect,
                    "SOCKS5 authentication rejected",
                ));
            }
        }
        (method, _) => {
            return Err(ConnectError::new(
                TransportCode::CouldNotConnect,
                format!("SOCKS5 proxy offered no acceptable auth method ({method:#04x})"),
            ));
        }
    }

    let mut request = vec![0x05, 0x01, 0x00];
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            request.push(0x01);
            request.extend_from_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            request.push(0x04);
            request.extend_from_slice(&ip.octets());
        }
        Err(_) => {
            let len = u8::try_from(host.len()).map_err(|_| {
                ConnectError::new(TransportCode::UrlMalformed, "host name too long for SOCKS5")
            })?;
            request.push(0x03);
            request.push(len);
            request.extend_from_slice(host.as_bytes());
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    stream
        .write_all(&request)
        .await
        .map_err(|e| handshake_failed("SOCKS5", &e))?;

    let mut head = [0u8; 4];
    stream
        .read_exact(&mut head)
        .await
        .map_err(|e| handshake_failed("SOCKS5", &e))?;
    if head[1] != 0x00 {
        return Err(ConnectError::new(
            TransportCode::CouldNotConnect,
            format!("SOCKS5 connect rejected (code {:#04x})", head[1]),
        ));
    }
    let addr_len = match head[3] {
        0x01 => 4,
        0x04 => 16,
        0x03 => {
            let mut len = [0u8; 1];
            stream
                .read_exact(&mut len)
                .await
                .map_err(|e| handshake_failed("SOCKS5", &e))?;
            usize::from(len[0])
        }
        other => {
            return Err(ConnectError::new(
                TransportCode::CouldNotConnect,
                format!("SOCKS5 reply has unknown address type {other:#04x}"),
            ));
        }
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream
        .read_exact(&mut bound)
        .await
        .map_err(|e| handshake_failed("SOCKS5", &e))?;
    Ok(stream)
}
