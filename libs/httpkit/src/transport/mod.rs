//! The engine that performs one HTTP exchange.
//!
//! [`HttpClient`](crate::HttpClient) drives a [`Transport`] through a fixed
//! sequence per pass: `reset`, `configure`, `attach_headers`, `attach_body`,
//! then one or more `execute` calls. Dropping the transport releases it.

mod body;
mod connector;
mod engine;
mod tls;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::config::{ProxySetting, TlsSetting};
use crate::content::RequestBody;
use crate::error::TransportCode;
use crate::progress::Progress;
use crate::request::HttpMethod;

pub use engine::HyperTransport;

/// Everything a transport needs to know before executing.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub url: String,
    pub method: HttpMethod,
    /// Sent as the request-target instead of the URL path when set.
    pub request_target: Option<String>,
    pub connect_timeout: Duration,
    /// Deadline for one whole exchange.
    pub transfer_timeout: Option<Duration>,
    /// Bytes per second, zero for unlimited.
    pub max_upload_speed: u64,
    /// Bytes per second, zero for unlimited.
    pub max_download_speed: u64,
    pub verbose: bool,
    pub tls: TlsSetting,
    pub proxy: Option<ProxySetting>,
    /// Cookie list in Netscape format, one cookie per line.
    pub cookies: String,
    pub progress: Arc<Progress>,
}

/// Outcome of one `execute` call.
#[derive(Debug, Clone, Default)]
pub struct ExchangeResult {
    pub code: TransportCode,
    pub http_status: Option<u16>,
    /// Raw header block, status line first.
    pub header: Bytes,
    pub body: Bytes,
    pub elapsed: Duration,
    pub upload_bytes: u64,
    pub download_bytes: u64,
    /// Absolute `Location` of a 301 response.
    pub redirect_url: Option<String>,
    /// Cookie list after the exchange, with any `Set-Cookie` merged in.
    pub cookie_list: String,
}

impl ExchangeResult {
    /// A result that carries only a failure code.
    #[must_use]
    pub fn failed(code: TransportCode) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }
}

/// A blocking HTTP exchange engine.
pub trait Transport {
    /// Drop all per-request state so the handle can be configured again.
    fn reset(&mut self);

    /// Apply URL, verb, limits, TLS and proxy settings.
    ///
    /// # Errors
    ///
    /// Returns the transport code describing the rejected option.
    fn configure(&mut self, options: &TransportOptions) -> Result<(), TransportCode>;

    /// Replace the request header lines.
    ///
    /// # Errors
    ///
    /// Returns the transport code if the lines cannot be stored.
    fn attach_headers(&mut self, lines: &[String]) -> Result<(), TransportCode>;

    /// Replace the request body.
    ///
    /// # Errors
    ///
    /// Returns the transport code if the body cannot be stored.
    fn attach_body(&mut self, body: RequestBody) -> Result<(), TransportCode>;

    /// Run the exchange with the current configuration.
    fn execute(&mut self) -> ExchangeResult;

    /// Whether TLS connections to the proxy itself are possible.
    fn supports_https_proxy(&self) -> bool {
        false
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn reset(&mut self) {
        (**self).reset();
    }

    fn configure(&mut self, options: &TransportOptions) -> Result<(), TransportCode> {
        (**self).configure(options)
    }

    fn attach_headers(&mut self, lines: &[String]) -> Result<(), TransportCode> {
        (**self).attach_headers(lines)
    }

    fn attach_body(&mut self, body: RequestBody) -> Result<(), TransportCode> {
        (**self).attach_body(body)
    }

    fn execute(&mut self) -> ExchangeResult {
        (**self).execute()
    }

    fn supports_https_proxy(&self) -> bool {
        (**self).supports_https_proxy()
    }
}
