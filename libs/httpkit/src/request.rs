use crate::content::{Content, ContentData, ContentKind};
use crate::error::ContentError;

/// Client identification sent as the last header line of every request.
pub const DEFAULT_USER_AGENT: &str = concat!("httpkit/", env!("CARGO_PKG_VERSION"));

/// `Accept-Encoding` used when none is set explicitly.
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br";

/// Verb of a client call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    #[must_use]
    pub fn as_http(self) -> http::Method {
        match self {
            Self::Get => http::Method::GET,
            Self::Post => http::Method::POST,
        }
    }
}

/// Explicit `Content-Type` header for a request.
///
/// [`ContentType::Auto`] writes no header line; the transport then derives
/// the type from the attached body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    #[default]
    Auto,
    ApplicationFormUrlEncoded,
    ApplicationOctetStream,
    ApplicationXml,
    ApplicationJson,
    TextHtml,
    TextJavascript,
    TextJson,
    TextPlain,
    TextXml,
    MultipartMixed,
    MultipartAlternative,
    MultipartRelated,
    MultipartFormData,
}

impl ContentType {
    /// MIME string, or `None` for [`ContentType::Auto`].
    #[must_use]
    pub const fn mime(self) -> Option<&'static str> {
        Some(match self {
            Self::Auto => return None,
            Self::ApplicationFormUrlEncoded => "application/x-www-form-urlencoded",
            Self::ApplicationOctetStream => "application/octet-stream",
            Self::ApplicationXml => "application/xml",
            Self::ApplicationJson => "application/json",
            Self::TextHtml => "text/html",
            Self::TextJavascript => "text/javascript",
            Self::TextJson => "text/json",
            Self::TextPlain => "text/plain",
            Self::TextXml => "text/xml",
            Self::MultipartMixed => "multipart/mixed",
            Self::MultipartAlternative => "multipart/alternative",
            Self::MultipartRelated => "multipart/related",
            Self::MultipartFormData => "multipart/form-data",
        })
    }
}

/// Header fields of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderData {
    /// Request-target override; sent instead of the URL path when non-empty.
    pub request_param: String,
    pub host: String,
    pub content_type: ContentType,
    pub accept: String,
    pub accept_encoding: String,
    /// Raw `Name: value` lines, in insertion order.
    pub extension: Vec<String>,
}

/// Headers plus an optional body, handed to the client per call.
#[derive(Debug, Default)]
pub struct Request {
    header: HeaderData,
    content: Option<Box<dyn Content>>,
}

impl Request {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.header.host = host.into();
    }

    pub fn set_accept(&mut self, accept: impl Into<String>) {
        self.header.accept = accept.into();
    }

    pub fn set_accept_encoding(&mut self, accept_encoding: impl Into<String>) {
        self.header.accept_encoding = accept_encoding.into();
    }

    pub fn set_content_type(&mut self, content_type: ContentType) {
        self.header.content_type = content_type;
    }

    pub fn set_request_param(&mut self, request_param: impl Into<String>) {
        self.header.request_param = request_param.into();
    }

    /// Attach a body, replacing any previous one.
    pub fn set_content(&mut self, content: impl Content + 'static) {
        self.content = Some(Box::new(content));
    }

    pub fn clear_content(&mut self) {
        self.content = None;
    }

    /// Append a raw header line such as `"X-Trace: 1"`.
    pub fn add_header_line(&mut self, line: impl Into<String>) {
        self.header.extension.push(line.into());
    }

    /// Builder-style [`set_content`](Self::set_content).
    #[must_use]
    pub fn with_content(mut self, content: impl Content + 'static) -> Self {
        self.set_content(content);
        self
    }

    /// Builder-style [`add_header_line`](Self::add_header_line).
    #[must_use]
    pub fn with_header_line(mut self, line: impl Into<String>) -> Self {
        self.add_header_line(line);
        self
    }

    #[must_use]
    pub fn header_data(&self) -> &HeaderData {
        &self.header
    }

    #[must_use]
    pub fn request_param(&self) -> &str {
        &self.header.request_param
    }

    #[must_use]
    pub fn content_kind(&self) -> ContentKind {
        self.content
            .as_ref()
            .map_or(ContentKind::None, |content| content.kind())
    }

    /// Wire header lines, rebuilt from scratch on every call.
    ///
    /// Order: `Content-Type` (unless auto), `Host`, `Accept`,
    /// `Accept-Encoding`, extension lines, `Connection`, `User-Agent`.
    #[must_use]
    pub fn create_header_data(&self) -> Vec<String> {
        let h = &self.header;
        let mut lines = Vec::with_capacity(h.extension.len() + 6);

        if let Some(mime) = h.content_type.mime() {
            lines.push(format!("Content-Type: {mime}"));
        }
        if !h.host.is_empty() {
            lines.push(format!("Host: {}", h.host));
        }
        if !h.accept.is_empty() {
            lines.push(format!("Accept: {}", h.accept));
        }
        let encoding = if h.accept_encoding.is_empty() {
            DEFAULT_ACCEPT_ENCODING
        } else {
            &h.accept_encoding
        };
        lines.push(format!("Accept-Encoding: {encoding}"));
        lines.extend(h.extension.iter().cloned());
        lines.push("Connection: Keep-Alive".to_owned());
        lines.push(format!("User-Agent: {DEFAULT_USER_AGENT}"));
        lines
    }

    /// Materialize the attached body, if any.
    ///
    /// # Errors
    ///
    /// Propagates the body's [`ContentError`].
    pub fn create_content_data(&mut self) -> Result<Option<ContentData>, ContentError> {
        self.content
            .as_mut()
            .map(|content| content.init_content())
            .transpose()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::content::{MultipartContent, Part, RawContent};

    #[test]
    fn test_header_order_with_all_fields() {
        let mut req = Request::new();
        req.add_header_line("X-First: 1");
        req.set_accept_encoding("identity");
        req.set_accept("application/json");
        req.set_host("api.example.com");
        req.set_content_type(ContentType::ApplicationJson);
        req.add_header_line("X-Second: 2");

        assert_eq!(
            req.create_header_data(),
            vec![
                "Content-Type: application/json".to_owned(),
                "Host: api.example.com".to_owned(),
                "Accept: application/json".to_owned(),
                "Accept-Encoding: identity".to_owned(),
                "X-First: 1".to_owned(),
                "X-Second: 2".to_owned(),
                "Connection: Keep-Alive".to_owned(),
                format!("User-Agent: {DEFAULT_USER_AGENT}"),
            ]
        );
    }

    #[test]
    fn test_minimal_headers_use_defaults() {
        let req = Request::new();
        assert_eq!(
            req.create_header_data(),
            vec![
                "Accept-Encoding: gzip, deflate, br".to_owned(),
                "Connection: Keep-Alive".to_owned(),
                format!("User-Agent: {DEFAULT_USER_AGENT}"),
            ]
        );
    }

    #[test]
    fn test_header_data_is_rebuilt_each_call() {
        let mut req = Request::new();
        let first = req.create_header_data();
        assert_eq!(first, req.create_header_data());
        req.set_host("h");
        assert_eq!(req.create_header_data().len(), first.len() + 1);
    }

    #[test]
    fn test_no_content_yields_none() {
        let mut req = Request::new();
        assert_eq!(req.content_kind(), ContentKind::None);
        assert!(req.create_content_data().unwrap().is_none());
    }

    #[test]
    fn test_content_is_delegated() {
        let mut req = Request::new().with_content(RawContent::text("hi"));
        assert_eq!(req.content_kind(), ContentKind::Raw);
        let data = req.create_content_data().unwrap().unwrap();
        assert_eq!(data.to_bytes().as_ref(), b"hi");

        req.set_content(MultipartContent::new().part(Part::value("", "x")));
        assert_eq!(req.content_kind(), ContentKind::Multipart);
        assert!(req.create_content_data().is_err());
    }

    #[test]
    fn test_content_type_mime() {
        assert_eq!(ContentType::Auto.mime(), None);
        assert_eq!(
            ContentType::MultipartFormData.mime(),
            Some("multipart/form-data")
        );
        assert_eq!(ContentType::TextJavascript.mime(), Some("text/javascript"));
    }
}
