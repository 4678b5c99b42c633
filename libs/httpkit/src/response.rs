use std::path::Path;
use std::time::SystemTime;

use bytes::Bytes;
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::fsio;

/// Status reported when no exchange has completed.
pub const NODEFINE: i32 = -1;

/// Result of the last call made by a client.
///
/// Owned by the client, cleared before every send and read-only to callers
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub(crate) status: Option<StatusCode>,
    pub(crate) header: Bytes,
    pub(crate) body: Bytes,
    pub(crate) redirect_url: String,
}

impl Response {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the "no exchange" state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Numeric status, or [`NODEFINE`].
    #[must_use]
    pub fn status_code(&self) -> i32 {
        self.status.map_or(NODEFINE, |s| i32::from(s.as_u16()))
    }

    /// Header block: status line followed by `name: value` lines.
    ///
    /// The block is rebuilt from the parsed headers rather than copied from
    /// the wire. Names are lowercase and repeated headers appear grouped
    /// under their name, so the original order and casing are not kept.
    #[must_use]
    pub fn header(&self) -> &Bytes {
        &self.header
    }

    /// Body bytes, decompressed when the server used a content encoding.
    #[must_use]
    pub fn content(&self) -> &Bytes {
        &self.body
    }

    #[must_use]
    pub fn content_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Absolute target of a 301 response; empty otherwise.
    #[must_use]
    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    /// Value of the first header named `name` (case-insensitive).
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<String> {
        let text = String::from_utf8_lossy(&self.header);
        text.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_owned())
        })
    }

    /// Server clock, from the `Date` response header.
    #[must_use]
    pub fn server_time(&self) -> Option<SystemTime> {
        httpdate::parse_http_date(&self.header_value("date")?).ok()
    }

    /// Export the body to `path`.
    ///
    /// With `include_status_prefix` a `"<status>\n"` line is written before
    /// the body. `truncate` replaces an existing file instead of appending.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the file helpers.
    pub fn save_to_file(
        &self,
        path: impl AsRef<Path>,
        include_status_prefix: bool,
        truncate: bool,
    ) -> std::io::Result<()> {
        let path = path.as_ref();
        let mut append = !truncate;
        if include_status_prefix {
            fsio::write_bytes(path, format!("{}\n", self.status_code()).as_bytes(), append)?;
            append = true;
        }
        fsio::write_bytes(path, &self.body, append)
    }
}
