#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use httpkit::{ExchangeResult, RequestBody, Transport, TransportCode, TransportOptions};

/// One call made on a [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Reset,
    Configure { url: String },
    AttachHeaders(Vec<String>),
    AttachBody(RequestBody),
    Execute,
}

/// Spy transport that replays scripted results and records every call.
///
/// Once the script runs out, every further `execute` repeats the fallback.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    calls: Arc<Mutex<Vec<Call>>>,
    script: Arc<Mutex<VecDeque<ExchangeResult>>>,
    fallback: ExchangeResult,
    rejected_url: Option<String>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<ExchangeResult>) -> Self {
        Self {
            calls: Arc::default(),
            script: Arc::new(Mutex::new(script.into())),
            fallback: ok(200),
            rejected_url: None,
        }
    }

    /// Fail `configure` with [`TransportCode::UrlMalformed`] for `url`.
    pub fn rejecting_url(mut self, url: &str) -> Self {
        self.rejected_url = Some(url.to_owned());
        self
    }

    pub fn repeating(result: ExchangeResult) -> Self {
        Self {
            fallback: result,
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn executions(&self) -> usize {
        self.count(|c| matches!(c, Call::Execute))
    }

    pub fn configured_urls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Configure { url } => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|&c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Transport for ScriptedTransport {
    fn reset(&mut self) {
        self.record(Call::Reset);
    }

    fn configure(&mut self, options: &TransportOptions) -> Result<(), TransportCode> {
        self.record(Call::Configure {
            url: options.url.clone(),
        });
        if self.rejected_url.as_deref() == Some(options.url.as_str()) {
            return Err(TransportCode::UrlMalformed);
        }
        Ok(())
    }

    fn attach_headers(&mut self, lines: &[String]) -> Result<(), TransportCode> {
        self.record(Call::AttachHeaders(lines.to_vec()));
        let malformed = lines.iter().any(|line| {
            line.split_once(':')
                .is_none_or(|(name, _)| name.is_empty() || name.contains(char::is_whitespace))
        });
        if malformed {
            return Err(TransportCode::BadFunctionArgument);
        }
        Ok(())
    }

    fn attach_body(&mut self, body: RequestBody) -> Result<(), TransportCode> {
        self.record(Call::AttachBody(body));
        Ok(())
    }

    fn execute(&mut self) -> ExchangeResult {
        self.record(Call::Execute);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn ok(status: u16) -> ExchangeResult {
    ExchangeResult {
        http_status: Some(status),
        header: Bytes::from(format!("HTTP/1.1 {status} X\r\n\r\n")),
        body: Bytes::from_static(b"body"),
        elapsed: Duration::from_millis(10),
        download_bytes: 4,
        ..ExchangeResult::default()
    }
}

pub fn failed(code: TransportCode) -> ExchangeResult {
    ExchangeResult {
        elapsed: Duration::from_millis(5),
        ..ExchangeResult::failed(code)
    }
}

pub fn moved(location: &str) -> ExchangeResult {
    ExchangeResult {
        redirect_url: Some(location.to_owned()),
        ..ok(301)
    }
}
