use bytes::Bytes;
use serde::Serialize;

use super::{Content, ContentData, ContentKind};
use crate::error::ContentError;

/// Subtype of a raw body; decides the MIME type sent with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RawKind {
    #[default]
    Text,
    Json,
    Xml,
    Javascript,
    Html,
}

impl RawKind {
    #[must_use]
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Json => "application/json",
            Self::Xml => "application/xml",
            Self::Javascript => "application/javascript",
            Self::Html => "text/html",
        }
    }
}

/// A byte buffer sent as-is.
#[derive(Debug, Clone, Default)]
pub struct RawContent {
    kind: RawKind,
    data: Bytes,
}

impl RawContent {
    #[must_use]
    pub fn new(kind: RawKind, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    #[must_use]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(RawKind::Text, data)
    }

    #[must_use]
    pub fn json(data: impl Into<Bytes>) -> Self {
        Self::new(RawKind::Json, data)
    }

    #[must_use]
    pub fn xml(data: impl Into<Bytes>) -> Self {
        Self::new(RawKind::Xml, data)
    }

    #[must_use]
    pub fn javascript(data: impl Into<Bytes>) -> Self {
        Self::new(RawKind::Javascript, data)
    }

    #[must_use]
    pub fn html(data: impl Into<Bytes>) -> Self {
        Self::new(RawKind::Html, data)
    }

    /// Serialize `value` as a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Json`] if serialization fails.
    pub fn from_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ContentError> {
        let data = serde_json::to_vec(value)?;
        Ok(Self::json(data))
    }

    #[must_use]
    pub fn raw_kind(&self) -> RawKind {
        self.kind
    }

    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl Content for RawContent {
    fn kind(&self) -> ContentKind {
        ContentKind::Raw
    }

    fn init_content(&mut self) -> Result<ContentData, ContentError> {
        Ok(ContentData::Raw {
            mime: self.kind.mime(),
            data: self.data.clone(),
        })
    }
}
