use super::{Content, ContentData, ContentKind};
use crate::error::ContentError;
use crate::params::{BoolStyle, KeyValueList, ParamValue};

pub const URL_ENCODED_MIME: &str = "application/x-www-form-urlencoded";

/// A form body: `k1=v1&k2=v2` followed by an optional raw tail.
///
/// Booleans default to `1` / `0`, the form most form handlers expect.
/// Keys and values are written verbatim unless [`escape_values`] is enabled.
///
/// [`escape_values`]: UrlEncodedContent::escape_values
#[derive(Debug, Clone)]
pub struct UrlEncodedContent {
    params: KeyValueList,
    raw_tail: String,
    bool_style: BoolStyle,
    escape: bool,
}

impl Default for UrlEncodedContent {
    fn default() -> Self {
        Self {
            params: KeyValueList::new(),
            raw_tail: String::new(),
            bool_style: BoolStyle::Digit,
            escape: false,
        }
    }
}

impl UrlEncodedContent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_bool_style(mut self, style: BoolStyle) -> Self {
        self.bool_style = style;
        self
    }

    /// Percent-encode keys and values when building the body.
    #[must_use]
    pub fn escape_values(mut self, escape: bool) -> Self {
        self.escape = escape;
        self
    }

    pub fn add_key_value<V: ParamValue + ?Sized>(&mut self, key: impl Into<String>, value: &V) {
        self.params.add_key_value(key, value);
    }

    pub fn add_bool(&mut self, key: impl Into<String>, value: bool) {
        self.params.add_bool_as(key, value, self.bool_style);
    }

    pub fn add_float(&mut self, key: impl Into<String>, value: f64, precision: usize) {
        self.params.add_float(key, value, precision);
    }

    /// Text appended verbatim after the encoded pairs.
    pub fn set_raw_data(&mut self, tail: impl Into<String>) {
        self.raw_tail = tail.into();
    }

    #[must_use]
    pub fn params(&self) -> &KeyValueList {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut KeyValueList {
        &mut self.params
    }

    /// The encoded body.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = if self.escape {
            self.params
                .join_with(|s| urlencoding::encode(s).into_owned())
        } else {
            self.params.join()
        };
        out.push_str(&self.raw_tail);
        out
    }
}

impl Content for UrlEncodedContent {
    fn kind(&self) -> ContentKind {
        ContentKind::UrlEncoded
    }

    fn init_content(&mut self) -> Result<ContentData, ContentError> {
        Ok(ContentData::UrlEncoded(self.encode()))
    }
}
