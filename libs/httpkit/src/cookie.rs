//! Cookie list in the Netscape cookie-file format.
//!
//! Each cookie is one line of seven tab-separated fields:
//! `domain  include_subdomains  path  secure  expires  name  value`.
//! `expires` is a Unix timestamp in seconds, `0` for session cookies.
//! The client keeps the list as text between calls; the transport parses it,
//! picks the cookies that match the request URL and merges `Set-Cookie`
//! responses back in.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use url::Url;

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";
const SET_COOKIE_PREFIX: &str = "set-cookie:";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CookieError {
    #[error("malformed cookie line: {0}")]
    Malformed(String),

    #[error("Set-Cookie line without a Domain attribute: {0}")]
    MissingDomain(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Host name, without a leading dot.
    pub domain: String,
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// Unix seconds; `0` for a session cookie.
    pub expires: u64,
    pub name: String,
    pub value: String,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn flag(value: &str) -> Option<bool> {
    match value {
        "TRUE" => Some(true),
        "FALSE" => Some(false),
        _ => None,
    }
}

fn flag_text(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}

/// Default cookie path: the request path up to, not including, its last `/`.
fn default_path(url_path: &str) -> String {
    match url_path.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(idx) => url_path[..idx].to_owned(),
    }
}

impl Cookie {
    /// Parse one Netscape cookie-file line.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::Malformed`] unless the line has seven valid fields.
    pub fn parse_netscape(line: &str) -> Result<Self, CookieError> {
        let malformed = || CookieError::Malformed(line.to_owned());
        let (http_only, rest) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let fields: Vec<&str> = rest.split('\t').collect();
        let [domain, subdomains, path, secure, expires, name, value] = fields.as_slice() else {
            return Err(malformed());
        };
        if name.is_empty() {
            return Err(malformed());
        }
        Ok(Self {
            domain: domain.trim_start_matches('.').to_ascii_lowercase(),
            include_subdomains: flag(subdomains).ok_or_else(malformed)?,
            path: (*path).to_owned(),
            secure: flag(secure).ok_or_else(malformed)?,
            http_only,
            expires: expires.parse().map_err(|_| malformed())?,
            name: (*name).to_owned(),
            value: (*value).to_owned(),
        })
    }

    /// Parse a `Set-Cookie` header value received for `request_url`.
    ///
    /// Without a `Domain` attribute the cookie is bound to the request host.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::Malformed`] when the `name=value` pair is missing.
    pub fn parse_set_cookie(header: &str, request_url: &Url) -> Result<Self, CookieError> {
        let mut cookie = Self::parse_set_cookie_attrs(header)?;
        if cookie.domain.is_empty() {
            cookie.domain = request_url
                .host_str()
                .unwrap_or_default()
                .to_ascii_lowercase();
            cookie.include_subdomains = false;
        }
        if cookie.path.is_empty() {
            cookie.path = default_path(request_url.path());
        }
        Ok(cookie)
    }

    fn parse_set_cookie_attrs(header: &str) -> Result<Self, CookieError> {
        let mut parts = header.split(';');
        let (name, value) = parts
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(n, v)| (n.trim(), v.trim()))
            .filter(|(n, _)| !n.is_empty())
            .ok_or_else(|| CookieError::Malformed(header.to_owned()))?;

        let mut cookie = Self {
            domain: String::new(),
            include_subdomains: false,
            path: String::new(),
            secure: false,
            http_only: false,
            expires: 0,
            name: name.to_owned(),
            value: value.trim_matches('"').to_owned(),
        };
        let mut max_age = None;
        for attr in parts {
            let (key, val) = attr
                .split_once('=')
                .map_or((attr.trim(), ""), |(k, v)| (k.trim(), v.trim()));
            match key.to_ascii_lowercase().as_str() {
                "domain" if !val.is_empty() => {
                    cookie.domain = val.trim_start_matches('.').to_ascii_lowercase();
                    cookie.include_subdomains = true;
                }
                "path" if val.starts_with('/') => cookie.path = val.to_owned(),
                "secure" => cookie.secure = true,
                "httponly" => cookie.http_only = true,
                "expires" => {
                    if let Ok(at) = httpdate::parse_http_date(val) {
                        cookie.expires = at
                            .duration_since(UNIX_EPOCH)
                            .map_or(1, |d| d.as_secs().max(1));
                    }
                }
                "max-age" => max_age = val.parse::<i64>().ok(),
                _ => {}
            }
        }
        if let Some(secs) = max_age {
            // Max-Age wins over Expires; non-positive means "delete now".
            cookie.expires = u64::try_from(secs)
                .ok()
                .filter(|s| *s > 0)
                .map_or(1, |s| unix_now().saturating_add(s));
        }
        Ok(cookie)
    }

    /// Parse either a Netscape line or a `Set-Cookie:` header line.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError`] when the line is malformed, or when a
    /// `Set-Cookie:` line has no `Domain` attribute to bind it to.
    pub fn parse_line(line: &str) -> Result<Self, CookieError> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        let is_set_cookie = trimmed
            .get(..SET_COOKIE_PREFIX.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(SET_COOKIE_PREFIX));
        if !is_set_cookie {
            return Self::parse_netscape(trimmed);
        }
        let mut cookie = Self::parse_set_cookie_attrs(trimmed[SET_COOKIE_PREFIX.len()..].trim())?;
        if cookie.domain.is_empty() {
            return Err(CookieError::MissingDomain(line.to_owned()));
        }
        if cookie.path.is_empty() {
            cookie.path = "/".to_owned();
        }
        Ok(cookie)
    }

    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires != 0 && self.expires <= now
    }

    /// Whether this cookie is sent with a request to `url` at `now`.
    #[must_use]
    pub fn matches(&self, url: &Url, now: u64) -> bool {
        if self.is_expired_at(now) || (self.secure && url.scheme() != "https") {
            return false;
        }
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return false;
        };
        let domain_ok = host == self.domain
            || (self.include_subdomains
                && host
                    .strip_suffix(self.domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')));
        domain_ok && path_matches(url.path(), &self.path)
    }

    fn same_slot(&self, other: &Self) -> bool {
        self.domain == other.domain && self.path == other.path && self.name == other.name
    }
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path[cookie_path.len()..].starts_with('/')))
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.http_only { HTTP_ONLY_PREFIX } else { "" };
        let dot = if self.include_subdomains { "." } else { "" };
        write!(
            f,
            "{prefix}{dot}{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.domain,
            flag_text(self.include_subdomains),
            self.path,
            flag_text(self.secure),
            self.expires,
            self.name,
            self.value
        )
    }
}

/// Ordered set of cookies, unique per domain, path and name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a cookie list; comments, blank and malformed lines are skipped.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        let mut jar = Self::new();
        for line in list.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() || (line.starts_with('#') && !line.starts_with(HTTP_ONLY_PREFIX)) {
                continue;
            }
            match Cookie::parse_netscape(line) {
                Ok(cookie) => jar.insert(cookie),
                Err(e) => tracing::debug!(error = %e, "skipping cookie line"),
            }
        }
        jar
    }

    /// Insert or replace a cookie. An already expired cookie deletes its slot.
    pub fn insert(&mut self, cookie: Cookie) {
        let expired = cookie.is_expired_at(unix_now());
        if let Some(pos) = self.cookies.iter().position(|c| c.same_slot(&cookie)) {
            if expired {
                self.cookies.remove(pos);
            } else {
                self.cookies[pos] = cookie;
            }
        } else if !expired {
            self.cookies.push(cookie);
        }
    }

    /// Merge one `Set-Cookie` header value received for `request_url`.
    pub fn store_set_cookie(&mut self, header: &str, request_url: &Url) {
        match Cookie::parse_set_cookie(header, request_url) {
            Ok(cookie) => self.insert(cookie),
            Err(e) => tracing::warn!(error = %e, "ignoring Set-Cookie header"),
        }
    }

    /// `Cookie` header value for `url`, if any cookie matches.
    #[must_use]
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let now = unix_now();
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| c.matches(url, now))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

impl fmt::Display for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cookie in &self.cookies {
            writeln!(f, "{cookie}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_netscape_line_round_trip() {
        let line = ".example.com\tTRUE\t/\tFALSE\t0\tsid\tabc";
        let cookie = Cookie::parse_netscape(line).unwrap();
        assert_eq!(cookie.domain, "example.com");
        assert!(cookie.include_subdomains);
        assert_eq!(cookie.to_string(), line);

        let http_only = "#HttpOnly_api.test\tFALSE\t/v1\tTRUE\t42\tk\tv";
        let cookie = Cookie::parse_netscape(http_only).unwrap();
        assert!(cookie.http_only && cookie.secure);
        assert_eq!(cookie.to_string(), http_only);
    }

    #[test]
    fn test_malformed_netscape_lines() {
        assert!(Cookie::parse_netscape("a\tb").is_err());
        assert!(Cookie::parse_netscape("d\tMAYBE\t/\tFALSE\t0\tn\tv").is_err());
        assert!(Cookie::parse_netscape("d\tTRUE\t/\tFALSE\tsoon\tn\tv").is_err());
    }

    #[test]
    fn test_set_cookie_defaults_to_request_host_and_path() {
        let cookie =
            Cookie::parse_set_cookie("id=7; HttpOnly", &url("http://Shop.Test/cart/items")).unwrap();
        assert_eq!(cookie.domain, "shop.test");
        assert!(!cookie.include_subdomains);
        assert_eq!(cookie.path, "/cart");
        assert!(cookie.http_only);
        assert_eq!(cookie.expires, 0);
    }

    #[test]
    fn test_set_cookie_attributes() {
        let cookie = Cookie::parse_set_cookie(
            "token=\"xyz\"; Domain=.example.com; Path=/api; Secure; Expires=Wed, 21 Oct 2037 07:28:00 GMT",
            &url("https://www.example.com/"),
        )
        .unwrap();
        assert_eq!(cookie.value, "xyz");
        assert_eq!(cookie.domain, "example.com");
        assert!(cookie.include_subdomains && cookie.secure);
        assert_eq!(cookie.path, "/api");
        assert_eq!(cookie.expires, 2_139_722_880);
    }

    #[test]
    fn test_max_age_overrides_expires() {
        let cookie = Cookie::parse_set_cookie(
            "a=1; Max-Age=0; Expires=Wed, 21 Oct 2037 07:28:00 GMT",
            &url("http://h.test/"),
        )
        .unwrap();
        assert!(cookie.is_expired_at(unix_now()));
    }

    #[test]
    fn test_matching_rules() {
        let now = unix_now();
        let cookie = Cookie::parse_netscape(".example.com\tTRUE\t/api\tTRUE\t0\tk\tv").unwrap();
        assert!(cookie.matches(&url("https://example.com/api"), now));
        assert!(cookie.matches(&url("https://a.b.example.com/api/x"), now));
        assert!(!cookie.matches(&url("http://example.com/api"), now));
        assert!(!cookie.matches(&url("https://badexample.com/api"), now));
        assert!(!cookie.matches(&url("https://example.com/apix"), now));

        let host_only = Cookie::parse_netscape("example.com\tFALSE\t/\tFALSE\t0\tk\tv").unwrap();
        assert!(!host_only.matches(&url("http://www.example.com/"), now));

        let expired = Cookie::parse_netscape("example.com\tFALSE\t/\tFALSE\t1\tk\tv").unwrap();
        assert!(!expired.matches(&url("http://example.com/"), now));
    }

    #[test]
    fn test_jar_upsert_delete_and_header() {
        let mut jar = CookieJar::parse("# comment\n\nh.test\tFALSE\t/\tFALSE\t0\ta\t1\n");
        let base = url("http://h.test/p");
        jar.store_set_cookie("b=2", &base);
        jar.store_set_cookie("a=3", &base);
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.header_for(&base).as_deref(), Some("a=3; b=2"));

        jar.store_set_cookie("a=gone; Max-Age=-1", &base);
        assert_eq!(jar.header_for(&base).as_deref(), Some("b=2"));
        assert_eq!(jar.to_string(), "h.test\tFALSE\t/\tFALSE\t0\tb\t2\n");
        assert_eq!(jar.header_for(&url("http://other.test/")), None);
    }

    #[test]
    fn test_parse_line_accepts_both_forms() {
        let netscape = Cookie::parse_line("h.test\tFALSE\t/\tFALSE\t0\ta\t1\n").unwrap();
        assert_eq!(netscape.name, "a");

        let header = Cookie::parse_line("Set-Cookie: s=v; Domain=h.test").unwrap();
        assert_eq!(header.domain, "h.test");
        assert_eq!(header.path, "/");

        assert_eq!(
            Cookie::parse_line("set-cookie: s=v"),
            Err(CookieError::MissingDomain("set-cookie: s=v".to_owned()))
        );
    }
}
