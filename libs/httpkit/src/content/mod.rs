//! Request body strategies.
//!
//! A [`Content`] knows how to turn itself into a [`ContentData`], the
//! transport-ready representation of a body. New body kinds plug in by
//! implementing the trait; neither [`Request`](crate::Request) nor the client
//! need to change.

mod multipart;
mod raw;
mod urlencoded;

use std::fmt;

use bytes::Bytes;

use crate::error::ContentError;

pub use multipart::{MimeForm, MimePart, MultipartContent, Part};
pub use raw::{RawContent, RawKind};
pub use urlencoded::{URL_ENCODED_MIME, UrlEncodedContent};

/// Classification of a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentKind {
    #[default]
    None,
    Raw,
    UrlEncoded,
    Multipart,
}

/// A request body that can be materialized for the transport.
pub trait Content: fmt::Debug + Send {
    /// Kind of body this content produces. Must be side-effect free.
    fn kind(&self) -> ContentKind;

    /// Build the transport representation of the body.
    ///
    /// Called once per send. Implementations rebuild from scratch on every
    /// call, so calling it again after a failure is safe.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError`] when the body cannot be built. Nothing is
    /// handed to the transport in that case.
    fn init_content(&mut self) -> Result<ContentData, ContentError>;
}

/// Materialized request body, ready to be written by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentData {
    /// Opaque bytes with an explicit MIME type.
    Raw { mime: &'static str, data: Bytes },
    /// An `application/x-www-form-urlencoded` string.
    UrlEncoded(String),
    /// An ordered multipart form.
    Multipart(MimeForm),
}

impl ContentData {
    #[must_use]
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Raw { .. } => ContentKind::Raw,
            Self::UrlEncoded(_) => ContentKind::UrlEncoded,
            Self::Multipart(_) => ContentKind::Multipart,
        }
    }

    /// Value for the `Content-Type` request header.
    #[must_use]
    pub fn content_type(&self) -> String {
        match self {
            Self::Raw { mime, .. } => (*mime).to_owned(),
            Self::UrlEncoded(_) => URL_ENCODED_MIME.to_owned(),
            Self::Multipart(form) => form.content_type(),
        }
    }

    /// Wire bytes of the body.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Raw { data, .. } => data.clone(),
            Self::UrlEncoded(text) => Bytes::from(text.clone()),
            Self::Multipart(form) => form.encode(),
        }
    }
}

/// Body handed to [`Transport::attach_body`](crate::Transport::attach_body).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestBody {
    /// No body at all (GET without content).
    #[default]
    None,
    /// An explicit zero-length body (POST without content).
    Empty,
    /// A materialized body.
    Data(ContentData),
}

impl RequestBody {
    #[must_use]
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::None | Self::Empty => ContentKind::None,
            Self::Data(data) => data.kind(),
        }
    }
}
