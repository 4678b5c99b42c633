//! Default [`Transport`]: hyper HTTP/1.1 driven on a private runtime.

use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, LOCATION, PROXY_AUTHORIZATION, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Version};
use http_body_util::BodyExt;
use hyper_rustls::{HttpsConnectorBuilder, MaybeHttpsStream};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::time::MissedTickBehavior;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::{DecompressionBody, DecompressionLayer};
use url::{Position, Url};

use super::body::{TransferCounters, UploadBody, as_u64, throttle_delay};
use super::connector::{ConnectError, ProxyConnector, basic_auth};
use super::tls;
use super::{ExchangeResult, Transport, TransportOptions};
use crate::config::{ProxyKind, ProxySetting};
use crate::content::RequestBody;
use crate::cookie::CookieJar;
use crate::error::TransportCode;
use crate::progress::{Cancelled, Progress};

/// How often a waiting exchange looks at the stop flag.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

type Stream = MaybeHttpsStream<TokioIo<TcpStream>>;

/// Transport backed by `hyper` on a current-thread `tokio` runtime.
///
/// Every `execute` opens a fresh connection. The runtime is private, so
/// the transport must not be used from inside another `tokio` runtime.
#[derive(Debug)]
pub struct HyperTransport {
    runtime: Runtime,
    options: Option<TransportOptions>,
    target: Option<Url>,
    tls: Option<Arc<rustls::ClientConfig>>,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: RequestBody,
}

impl HyperTransport {
    /// Build the transport and its runtime.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while creating the runtime.
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            options: None,
            target: None,
            tls: None,
            headers: Vec::new(),
            body: RequestBody::None,
        })
    }
}

impl Transport for HyperTransport {
    fn reset(&mut self) {
        self.options = None;
        self.target = None;
        self.tls = None;
        self.headers.clear();
        self.body = RequestBody::None;
    }

    fn configure(&mut self, options: &TransportOptions) -> Result<(), TransportCode> {
        let url = Url::parse(&options.url).map_err(|e| {
            tracing::warn!(url = %options.url, error = %e, "malformed URL");
            TransportCode::UrlMalformed
        })?;
        if url.host_str().is_none() {
            tracing::warn!(url = %options.url, "URL has no host");
            return Err(TransportCode::UrlMalformed);
        }
        let tls = match url.scheme() {
            "http" => None,
            "https" => Some(Arc::new(tls::client_config(&options.tls)?)),
            scheme => {
                tracing::warn!(scheme, "unsupported URL scheme");
                return Err(TransportCode::UnsupportedProtocol);
            }
        };
        if let Some(proxy) = &options.proxy
            && proxy.kind == ProxyKind::Https
        {
            tracing::warn!(proxy = %proxy.hostname, "HTTPS proxies are not supported");
            return Err(TransportCode::UnsupportedProtocol);
        }

        self.options = Some(options.clone());
        self.target = Some(url);
        self.tls = tls;
        Ok(())
    }

    fn attach_headers(&mut self, lines: &[String]) -> Result<(), TransportCode> {
        self.headers = lines
            .iter()
            .map(|line| parse_header_line(line).ok_or(TransportCode::BadFunctionArgument))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    fn attach_body(&mut self, body: RequestBody) -> Result<(), TransportCode> {
        self.body = body;
        Ok(())
    }

    fn execute(&mut self) -> ExchangeResult {
        let (Some(options), Some(url)) = (self.options.as_ref(), self.target.as_ref()) else {
            tracing::warn!("execute called on an unconfigured transport");
            return ExchangeResult::failed(TransportCode::FailedInit);
        };

        let mut jar = CookieJar::parse(&options.cookies);
        let counters = Arc::new(TransferCounters::default());
        let request = match build_request(options, url, &self.headers, &self.body, &jar, &counters) {
            Ok(request) => request,
            Err(code) => return ExchangeResult::failed(code),
        };

        let exchange = Exchange {
            url,
            options,
            tls: self.tls.clone(),
            counters: Arc::clone(&counters),
        };
        let started = Instant::now();
        let outcome = self.runtime.block_on(supervise(
            exchange.run(request),
            &options.progress,
            options.transfer_timeout,
        ));
        options.progress.finish();

        let mut result = ExchangeResult {
            elapsed: started.elapsed(),
            upload_bytes: counters.uploaded(),
            download_bytes: counters.downloaded(),
            ..ExchangeResult::default()
        };
        match outcome {
            Ok(received) => {
                for value in &received.set_cookies {
                    jar.store_set_cookie(value, url);
                }
                if received.status == StatusCode::MOVED_PERMANENTLY {
                    result.redirect_url = received
                        .location
                        .and_then(|location| url.join(&location).ok())
                        .map(String::from);
                }
                result.http_status = Some(received.status.as_u16());
                result.header = received.header;
                result.body = received.body;
            }
            Err(code) => {
                tracing::debug!(url = %url, code = %code.strerror(), "exchange failed");
                result.code = code;
            }
        }
        result.cookie_list = jar.to_string();
        result
    }
}

/// Split a `Name: value` line; `None` for a malformed line.
fn parse_header_line(line: &str) -> Option<(HeaderName, HeaderValue)> {
    let parsed = line.split_once(':').and_then(|(name, value)| {
        let name = HeaderName::from_bytes(name.trim().as_bytes()).ok()?;
        let value = HeaderValue::from_str(value.trim()).ok()?;
        Some((name, value))
    });
    if parsed.is_none() {
        tracing::warn!(line, "malformed header line");
    }
    parsed
}

/// HTTP proxy that a plain-http request is forwarded through.
fn forwarding_proxy<'a>(options: &'a TransportOptions, url: &Url) -> Option<&'a ProxySetting> {
    options
        .proxy
        .as_ref()
        .filter(|p| url.scheme() == "http" && matches!(p.kind, ProxyKind::Http | ProxyKind::Https))
}

/// Request-target: the override, absolute-form through an HTTP proxy,
/// origin-form otherwise.
fn request_target(options: &TransportOptions, url: &Url) -> String {
    if let Some(target) = options.request_target.as_deref().filter(|t| !t.is_empty()) {
        return target.to_owned();
    }
    if forwarding_proxy(options, url).is_some() {
        url[..Position::AfterQuery].to_owned()
    } else {
        url[Position::BeforePath..Position::AfterQuery].to_owned()
    }
}

fn build_request(
    options: &TransportOptions,
    url: &Url,
    lines: &[(HeaderName, HeaderValue)],
    body: &RequestBody,
    jar: &CookieJar,
    counters: &Arc<TransferCounters>,
) -> Result<http::Request<UploadBody>, TransportCode> {
    let mut headers = HeaderMap::with_capacity(lines.len() + 4);
    for (name, value) in lines {
        headers.append(name.clone(), value.clone());
    }

    if !headers.contains_key(HOST) {
        let host = url.host_str().unwrap_or_default();
        let host = url.port().map_or_else(|| host.to_owned(), |port| format!("{host}:{port}"));
        headers.insert(HOST, to_header_value(&host)?);
    }
    let data = match body {
        RequestBody::None => None,
        RequestBody::Empty => Some(Bytes::new()),
        RequestBody::Data(content) => {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, to_header_value(&content.content_type())?);
            }
            Some(content.to_bytes())
        }
    };
    if let Some(data) = &data {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(data.len()));
    }
    if !headers.contains_key(COOKIE)
        && let Some(cookie) = jar.header_for(url)
    {
        headers.insert(COOKIE, to_header_value(&cookie)?);
    }
    if let Some(auth) = forwarding_proxy(options, url).and_then(basic_auth) {
        headers.insert(PROXY_AUTHORIZATION, to_header_value(&auth)?);
    }

    let target = request_target(options, url);
    if options.verbose {
        tracing::debug!(method = %options.method.as_http(), %target, "> request");
        for (name, value) in &headers {
            tracing::debug!(header = %name, value = %String::from_utf8_lossy(value.as_bytes()), "> header");
        }
    }

    let body = UploadBody::new(
        data.unwrap_or_default(),
        options.max_upload_speed,
        Arc::clone(&options.progress),
        Arc::clone(counters),
    );
    let mut request = http::Request::builder()
        .method(options.method.as_http())
        .uri(target.as_str())
        .body(body)
        .map_err(|e| {
            tracing::warn!(%target, error = %e, "invalid request target");
            TransportCode::UrlMalformed
        })?;
    *request.headers_mut() = headers;
    Ok(request)
}

fn to_header_value(value: &str) -> Result<HeaderValue, TransportCode> {
    HeaderValue::from_str(value).map_err(|e| {
        tracing::warn!(value, error = %e, "invalid header value");
        TransportCode::UrlMalformed
    })
}

/// What a successful exchange brings back.
struct Received {
    status: StatusCode,
    header: Bytes,
    body: Bytes,
    set_cookies: Vec<String>,
    location: Option<String>,
}

struct Exchange<'a> {
    url: &'a Url,
    options: &'a TransportOptions,
    tls: Option<Arc<rustls::ClientConfig>>,
    counters: Arc<TransferCounters>,
}

impl Exchange<'_> {
    async fn run(self, request: http::Request<UploadBody>) -> Result<Received, TransportCode> {
        let stream = tokio::time::timeout(self.options.connect_timeout, self.connect())
            .await
            .map_err(|_| {
                tracing::debug!(url = %self.url, "connect timed out");
                TransportCode::OperationTimedOut
            })??;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(stream)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "HTTP/1.1 handshake failed");
                TransportCode::CouldNotConnect
            })?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "connection closed with error");
            }
        });
        sender
            .ready()
            .await
            .map_err(|e| self.classify_exchange_error(&e))?;

        let service = ServiceBuilder::new()
            .layer(DecompressionLayer::new())
            .service_fn(move |req: http::Request<UploadBody>| sender.send_request(req));
        let response = service
            .oneshot(request)
            .await
            .map_err(|e| self.classify_exchange_error(&e))?;

        let (parts, body) = response.into_parts();
        if self.options.verbose {
            tracing::debug!(status = %parts.status, "< response");
            for (name, value) in &parts.headers {
                tracing::debug!(header = %name, value = %String::from_utf8_lossy(value.as_bytes()), "< header");
            }
        }
        let total = http_body::Body::size_hint(&body).exact().unwrap_or(0);
        let body = self.download(body, total).await?;

        Ok(Received {
            status: parts.status,
            header: header_block(parts.version, parts.status, &parts.headers),
            body,
            set_cookies: parts
                .headers
                .get_all(SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .map(str::to_owned)
                .collect(),
            location: parts
                .headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
        })
    }

    async fn connect(&self) -> Result<Stream, TransportCode> {
        let uri: http::Uri = self.url.as_str().parse().map_err(|e| {
            tracing::warn!(url = %self.url, error = %e, "URL is not a valid request URI");
            TransportCode::UrlMalformed
        })?;
        let connector = ProxyConnector::new(self.options.proxy.clone());
        match &self.tls {
            None => connector.oneshot(uri).await.map(MaybeHttpsStream::Http).map_err(|e| {
                tracing::debug!(error = %e, "connect failed");
                e.code
            }),
            Some(config) => {
                let https = HttpsConnectorBuilder::new()
                    .with_tls_config(config.as_ref().clone())
                    .https_or_http()
                    .enable_http1()
                    .wrap_connector(connector);
                https
                    .oneshot(uri)
                    .await
                    .map_err(|e| classify_connect_error(e.as_ref()))
            }
        }
    }

    async fn download(
        &self,
        mut body: DecompressionBody<hyper::body::Incoming>,
        total: u64,
    ) -> Result<Bytes, TransportCode> {
        let max_speed = self.options.max_download_speed;
        let started = Instant::now();
        let mut buf = BytesMut::new();
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| self.classify_body_error(e.as_ref()))?;
            let Ok(data) = frame.into_data() else {
                continue;
            };
            buf.extend_from_slice(&data);
            let received = as_u64(buf.len());
            self.counters.downloaded.store(received, Ordering::SeqCst);
            self.options
                .progress
                .download(received, total)
                .map_err(|_| TransportCode::AbortedByCallback)?;
            if max_speed > 0
                && let Some(wait) = throttle_delay(received, max_speed, started.elapsed())
            {
                tokio::time::sleep(wait).await;
            }
        }
        Ok(buf.freeze())
    }

    fn classify_exchange_error(&self, err: &(dyn StdError + 'static)) -> TransportCode {
        if self.options.progress.is_stopped() || find_in_chain::<Cancelled>(err).is_some() {
            return TransportCode::AbortedByCallback;
        }
        if let Some(code) = tls::classify_tls_error(err) {
            return code;
        }
        tracing::debug!(error = %err, "exchange failed");
        if !self.counters.upload_done() {
            TransportCode::SendError
        } else if find_in_chain::<hyper::Error>(err).is_some_and(hyper::Error::is_incomplete_message)
        {
            TransportCode::GotNothing
        } else {
            TransportCode::RecvError
        }
    }

    fn classify_body_error(&self, err: &(dyn StdError + 'static)) -> TransportCode {
        if self.options.progress.is_stopped() {
            return TransportCode::AbortedByCallback;
        }
        tracing::debug!(error = %err, "response body failed");
        if find_in_chain::<hyper::Error>(err).is_none()
            && find_in_chain::<std::io::Error>(err)
                .is_some_and(|io| io.kind() == std::io::ErrorKind::InvalidData)
        {
            TransportCode::BadContentEncoding
        } else {
            TransportCode::RecvError
        }
    }
}

fn classify_connect_error(err: &(dyn StdError + 'static)) -> TransportCode {
    if let Some(connect) = find_in_chain::<ConnectError>(err) {
        tracing::debug!(error = %connect, "connect failed");
        return connect.code;
    }
    tracing::debug!(error = %err, "TLS connect failed");
    tls::classify_tls_error(err).unwrap_or(TransportCode::SslConnectError)
}

fn find_in_chain<'a, E: StdError + 'static>(err: &'a (dyn StdError + 'static)) -> Option<&'a E> {
    std::iter::successors(Some(err), |&e| e.source()).find_map(|e| e.downcast_ref::<E>())
}

/// Status line, header lines and the blank separator line.
fn header_block(version: Version, status: StatusCode, headers: &HeaderMap) -> Bytes {
    let version = if version == Version::HTTP_10 { "HTTP/1.0" } else { "HTTP/1.1" };
    let mut block = BytesMut::new();
    block.extend_from_slice(
        format!("{version} {} {}\r\n", status.as_u16(), status.canonical_reason().unwrap_or_default())
            .as_bytes(),
    );
    for (name, value) in headers {
        block.extend_from_slice(name.as_str().as_bytes());
        block.extend_from_slice(b": ");
        block.extend_from_slice(value.as_bytes());
        block.extend_from_slice(b"\r\n");
    }
    block.extend_from_slice(b"\r\n");
    block.freeze()
}

/// Race the exchange against the stop flag and the transfer deadline.
async fn supervise<F>(
    work: F,
    progress: &Progress,
    deadline: Option<Duration>,
) -> Result<Received, TransportCode>
where
    F: Future<Output = Result<Received, TransportCode>>,
{
    let deadline = async move {
        match deadline {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        result = work => result,
        () = watch_stop(progress) => Err(TransportCode::AbortedByCallback),
        () = deadline => Err(TransportCode::OperationTimedOut),
    }
}

async fn watch_stop(progress: &Progress) {
    let mut ticker = tokio::time::interval(STOP_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if progress.is_stopped() {
            return;
        }
    }
}
