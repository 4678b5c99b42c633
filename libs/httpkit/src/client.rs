use std::sync::Arc;

use crate::config::{ClientOption, HttpkitConfig, ProxyKind, ProxySetting, TlsSetting};
use crate::content::RequestBody;
use crate::cookie::{Cookie, CookieError, CookieJar};
use crate::error::{ErrorCode, TransportCode, translate};
use crate::metrics::TransferMetrics;
use crate::progress::Progress;
use crate::request::{HttpMethod, Request};
use crate::response::Response;
use crate::retry::calculate_backoff;
use crate::transport::{ExchangeResult, HyperTransport, Transport, TransportOptions};
use crate::uri::Uri;

/// HTTP 301, the only status that triggers redirect handling.
const MOVED_PERMANENTLY: u16 = 301;

fn to_error(code: TransportCode) -> ErrorCode {
    translate(code).err().unwrap_or(ErrorCode::UnknownFailure)
}

/// Blocking HTTP client.
///
/// One call runs one or more passes. Every pass resets and reconfigures the
/// transport, attaches the request, executes it (retrying timeouts and
/// refused connections up to [`ClientOption::retry_count`] times) and
/// stores the outcome in the client-owned [`Response`]. A `301` starts a new
/// pass against its `Location` when [`ClientOption::auto_redirect`] is set,
/// at most [`ClientOption::max_redirects`] times.
///
/// # Thread Safety
///
/// Calls take `&mut self`; use one client per thread. Only the
/// [`Progress`] handle from [`progress`](Self::progress) is meant to be
/// shared, so another thread can cancel the running transfer.
///
/// # Example
///
/// ```ignore
/// use httpkit::{HttpClient, Uri};
///
/// let mut client = HttpClient::new()?;
/// let uri = Uri::new("https://example.com/api").with_query_param("page", &2);
/// let response = client.get(&uri, None)?;
/// println!("{} {}", response.status_code(), response.content_text());
/// ```
#[derive(Debug)]
pub struct HttpClient<T: Transport = HyperTransport> {
    transport: T,
    option: ClientOption,
    proxy: ProxySetting,
    tls: TlsSetting,
    cookies: String,
    response: Response,
    progress: Arc<Progress>,
    metrics: TransferMetrics,
}

impl HttpClient<HyperTransport> {
    /// Create a client backed by [`HyperTransport`].
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ClientInitFailed`] if the transport runtime
    /// cannot be created.
    pub fn new() -> Result<Self, ErrorCode> {
        HyperTransport::new().map(Self::with_transport).map_err(|e| {
            tracing::error!(error = %e, "failed to initialize the HTTP transport");
            ErrorCode::ClientInitFailed
        })
    }

    /// Create a client and apply the client, proxy and TLS sections of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::ClientInitFailed`] if the transport runtime
    /// cannot be created.
    pub fn from_config(config: &HttpkitConfig) -> Result<Self, ErrorCode> {
        let mut client = Self::new()?;
        client.configure(config.client.clone());
        client.set_proxy(config.proxy.clone());
        client.set_tls(config.tls.clone());
        Ok(client)
    }
}

impl<T: Transport> HttpClient<T> {
    /// Create a client on top of any transport.
    #[must_use]
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            option: ClientOption::default(),
            proxy: ProxySetting::default(),
            tls: TlsSetting::default(),
            cookies: String::new(),
            response: Response::new(),
            progress: Arc::new(Progress::new()),
            metrics: TransferMetrics::default(),
        }
    }

    /// Replace the general options used by the following calls.
    pub fn configure(&mut self, option: ClientOption) {
        self.option = option;
    }

    #[must_use]
    pub fn option(&self) -> &ClientOption {
        &self.option
    }

    /// Route the following calls through `proxy`; an empty hostname disables it.
    pub fn set_proxy(&mut self, proxy: ProxySetting) {
        self.proxy = proxy;
    }

    pub fn set_tls(&mut self, tls: TlsSetting) {
        self.tls = tls;
    }

    /// Add one cookie, given as a Netscape cookie-file line or a
    /// `Set-Cookie:` header line with a `Domain` attribute.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError`] if the line cannot be parsed.
    pub fn add_cookie(&mut self, line: &str) -> Result<(), CookieError> {
        let cookie = Cookie::parse_line(line)?;
        let mut jar = CookieJar::parse(&self.cookies);
        jar.insert(cookie);
        self.cookies = jar.to_string();
        Ok(())
    }

    /// Cookie list in Netscape format, as captured after the last exchange.
    #[must_use]
    pub fn cookies(&self) -> &str {
        &self.cookies
    }

    pub fn clear_cookies(&mut self) {
        self.cookies.clear();
    }

    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Shared progress counters; call [`Progress::stop`] to cancel a call.
    #[must_use]
    pub fn progress(&self) -> Arc<Progress> {
        Arc::clone(&self.progress)
    }

    /// Counters of the last call.
    #[must_use]
    pub fn metrics(&self) -> &TransferMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `GET uri`, with optional headers and body.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub fn get(&mut self, uri: &Uri, request: Option<&mut Request>) -> Result<&Response, ErrorCode> {
        self.request(HttpMethod::Get, uri, request)
    }

    /// `POST uri`; without content an empty body is sent.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub fn post(&mut self, uri: &Uri, request: Option<&mut Request>) -> Result<&Response, ErrorCode> {
        self.request(HttpMethod::Post, uri, request)
    }

    /// Run one call and return the response of its last pass.
    ///
    /// Any HTTP status, `4xx` and `5xx` included, is a successful call.
    ///
    /// # Errors
    ///
    /// - [`ErrorCode::RequestDataCreationFailed`] if the request body cannot
    ///   be built; nothing is sent in that case.
    /// - [`ErrorCode::UserCancelled`] if [`Progress::stop`] was called.
    /// - Any other [`ErrorCode`] translated from the transport result.
    pub fn request(
        &mut self,
        method: HttpMethod,
        uri: &Uri,
        mut request: Option<&mut Request>,
    ) -> Result<&Response, ErrorCode> {
        self.metrics = TransferMetrics::default();
        self.progress.reset();

        let mut target = uri.url();
        loop {
            let redirect = self.send(method, &target, request.as_deref_mut())?;
            let Some(location) = redirect else {
                break;
            };
            if !self.option.auto_redirect {
                break;
            }
            if self.metrics.redirects >= self.option.max_redirects {
                tracing::warn!(
                    max_redirects = self.option.max_redirects,
                    location = %location,
                    "redirect limit reached, returning the 301 response"
                );
                break;
            }
            self.metrics.redirects += 1;
            tracing::debug!(from = %target, to = %location, "following redirect");
            target = Uri::new(location).url();
        }

        if self.option.verbose {
            tracing::info!(url = %target, metrics = %self.metrics.summary(), "request completed");
        }
        Ok(&self.response)
    }

    /// One pass. Returns the redirect target of a `301` response.
    fn send(
        &mut self,
        method: HttpMethod,
        url: &str,
        request: Option<&mut Request>,
    ) -> Result<Option<String>, ErrorCode> {
        self.response.clear();
        self.transport.reset();
        let options = self.transport_options(method, url, request.as_deref());
        self.transport.configure(&options).map_err(|code| {
            tracing::warn!(url, code = %code.strerror(), "failed to configure transport");
            to_error(code)
        })?;

        let body = match request {
            Some(request) => {
                let content = request.create_content_data().map_err(|e| {
                    tracing::warn!(url, error = %e, "failed to create request data");
                    ErrorCode::RequestDataCreationFailed
                })?;
                self.transport
                    .attach_headers(&request.create_header_data())
                    .map_err(|code| {
                        tracing::warn!(
                            url,
                            code = %code.strerror(),
                            "failed to attach request headers"
                        );
                        ErrorCode::RequestDataCreationFailed
                    })?;
                content.map(RequestBody::Data)
            }
            None => None,
        };
        let body = body.unwrap_or(match method {
            HttpMethod::Get => RequestBody::None,
            HttpMethod::Post => RequestBody::Empty,
        });
        self.transport.attach_body(body).map_err(to_error)?;

        tracing::debug!(method = %method.as_http(), url, "sending request");
        let result = self.execute_with_retry();
        self.complete(url, result)
    }

    fn execute_with_retry(&mut self) -> ExchangeResult {
        let mut retries = 0;
        loop {
            let result = self.transport.execute();
            self.metrics
                .record(result.elapsed, result.upload_bytes, result.download_bytes);

            let transient = translate(result.code).is_err_and(ErrorCode::is_transient);
            if !transient || retries >= self.option.retry_count {
                return result;
            }
            retries += 1;
            self.metrics.retries += 1;
            tracing::warn!(
                attempt = retries,
                retry_count = self.option.retry_count,
                code = %result.code.strerror(),
                "transient failure, retrying"
            );
            if let Some(backoff) = &self.option.retry_backoff {
                std::thread::sleep(calculate_backoff(backoff, retries - 1));
            }
        }
    }

    fn complete(&mut self, url: &str, result: ExchangeResult) -> Result<Option<String>, ErrorCode> {
        if result.http_status.is_some() {
            self.cookies = result.cookie_list;
        }
        if let Err(e) = translate(result.code) {
            tracing::warn!(url, code = %result.code.strerror(), error = %e, "request failed");
            return Err(e);
        }

        let status = result.http_status.and_then(|s| http::StatusCode::from_u16(s).ok());
        self.response.status = status;
        self.response.header = result.header;
        self.response.body = result.body;

        if result.http_status != Some(MOVED_PERMANENTLY) {
            return Ok(None);
        }
        let Some(location) = result.redirect_url.filter(|l| !l.is_empty()) else {
            tracing::warn!(url, "301 response without a usable Location");
            return Ok(None);
        };
        self.response.redirect_url.clone_from(&location);
        Ok(Some(location))
    }

    fn transport_options(
        &self,
        method: HttpMethod,
        url: &str,
        request: Option<&Request>,
    ) -> TransportOptions {
        let proxy = self.proxy.is_enabled().then(|| {
            let mut proxy = self.proxy.clone();
            if proxy.kind == ProxyKind::Https && !self.transport.supports_https_proxy() {
                tracing::warn!(
                    proxy = %proxy.hostname,
                    "transport cannot use HTTPS proxies, falling back to HTTP"
                );
                proxy.kind = ProxyKind::Http;
            }
            proxy
        });
        TransportOptions {
            url: url.to_owned(),
            method,
            request_target: request
                .map(Request::request_param)
                .filter(|p| !p.is_empty())
                .map(str::to_owned),
            connect_timeout: self.option.effective_connect_timeout(),
            transfer_timeout: Some(self.option.transfer_timeout).filter(|t| !t.is_zero()),
            max_upload_speed: self.option.max_upload_speed,
            max_download_speed: self.option.max_download_speed,
            verbose: self.option.verbose,
            tls: self.tls.clone(),
            proxy,
            cookies: self.cookies.clone(),
            progress: Arc::clone(&self.progress),
        }
    }
}
