#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Blocking HTTP client facade.
//!
//! This crate provides:
//! - Query strings built from typed key/value lists ([`Uri`], [`KeyValueList`])
//! - Raw, url-encoded and multipart request bodies behind one [`Content`] trait
//! - Deterministic header assembly ([`Request::create_header_data`])
//! - A client state machine with transient-failure retries, bounded `301`
//!   handling, cookie capture and per-call [`TransferMetrics`]
//! - A stable outcome taxonomy ([`ErrorCode`]) independent of the transport
//! - A pluggable [`Transport`], with a default [`HyperTransport`] on hyper,
//!   rustls and tokio (proxies, TLS verification switches, rate caps,
//!   transparent decompression, cooperative cancellation)
//!
//! # Example
//!
//! ```ignore
//! use httpkit::{HttpClient, MultipartContent, Part, Request, Uri};
//!
//! let mut client = HttpClient::new()?;
//! let mut request = Request::new().with_content(
//!     MultipartContent::new()
//!         .part(Part::value("title", "report"))
//!         .part(Part::file_from_path("file", "report.pdf")),
//! );
//! let response = client.post(&Uri::new("https://example.com/upload"), Some(&mut request))?;
//! assert_eq!(response.status_code(), 200);
//! ```
//!
//! # Cancellation
//!
//! [`HttpClient::progress`] hands out a shared [`Progress`]. Calling
//! [`Progress::stop`] from any thread makes the running call return
//! [`ErrorCode::UserCancelled`] at the next progress tick.

mod client;
mod config;
mod content;
mod cookie;
mod error;
pub mod fsio;
mod logging;
mod metrics;
mod params;
mod progress;
mod request;
mod response;
mod retry;
mod transport;
mod uri;

pub use client::HttpClient;
pub use config::{
    ClientOption, ConfigError, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_REDIRECTS, ENV_PREFIX,
    ExponentialBackoff, HttpkitConfig, ProxyKind, ProxySetting, SecretString, TlsSetting,
};
pub use content::{
    Content, ContentData, ContentKind, MimeForm, MimePart, MultipartContent, Part, RawContent,
    RawKind, RequestBody, URL_ENCODED_MIME, UrlEncodedContent,
};
pub use cookie::{Cookie, CookieError, CookieJar};
pub use error::{ContentError, ERROR_CODE_BASE, ErrorCode, OK_CODE, TransportCode, translate};
pub use logging::{LogConfig, LoggingError, init_logging};
pub use metrics::TransferMetrics;
pub use params::{
    BoolStyle, DEFAULT_FLOAT_PRECISION, KeyValueList, KeyValueParam, ParamValue, format_float,
};
pub use progress::{Cancelled, Progress, ProgressAction, ProgressSnapshot};
pub use request::{
    ContentType, DEFAULT_ACCEPT_ENCODING, DEFAULT_USER_AGENT, HeaderData, HttpMethod, Request,
};
pub use response::{NODEFINE, Response};
pub use retry::calculate_backoff;
pub use transport::{ExchangeResult, HyperTransport, Transport, TransportOptions};
pub use uri::Uri;
