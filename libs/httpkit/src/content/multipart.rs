use std::path::PathBuf;

use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;

use super::{Content, ContentData, ContentKind};
use crate::error::ContentError;
use crate::fsio;

const DEFAULT_FILE_MIME: &str = "application/octet-stream";
const DEFAULT_VALUE_MIME: &str = "text/plain";

#[derive(Debug, Clone)]
enum PartBody {
    Value(String),
    File { filename: String, data: Bytes },
    Path { filename: String, path: PathBuf },
}

/// One field of a multipart form.
///
/// A part is either a value part (a scalar string) or a file part (file name
/// plus bytes). The extra header line, when set, is written into this part
/// only, never into the request headers.
#[derive(Debug, Clone)]
pub struct Part {
    name: String,
    body: PartBody,
    content_type: Option<String>,
    content_type_parameter: Option<String>,
    header_line: Option<String>,
}

impl Part {
    #[must_use]
    pub fn value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_body(name.into(), PartBody::Value(value.into()))
    }

    #[must_use]
    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self::with_body(
            name.into(),
            PartBody::File {
                filename: filename.into(),
                data: data.into(),
            },
        )
    }

    /// File part whose bytes are read from disk when the form is built.
    ///
    /// The file name sent to the server is the last component of `path`.
    #[must_use]
    pub fn file_from_path(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::with_body(name.into(), PartBody::Path { filename, path })
    }

    fn with_body(name: String, body: PartBody) -> Self {
        Self {
            name,
            body,
            content_type: None,
            content_type_parameter: None,
            header_line: None,
        }
    }

    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Appended to the part's content type as `; <parameter>`.
    #[must_use]
    pub fn content_type_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.content_type_parameter = Some(parameter.into());
        self
    }

    /// A raw `Name: value` header line for this part.
    #[must_use]
    pub fn header_line(mut self, line: impl Into<String>) -> Self {
        self.header_line = Some(line.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        !matches!(self.body, PartBody::Value(_))
    }

    fn build(&self, index: usize) -> Result<MimePart, ContentError> {
        let invalid = |reason: &str| ContentError::InvalidPart {
            index,
            reason: reason.to_owned(),
        };

        if self.name.is_empty() {
            return Err(invalid("empty name"));
        }
        if has_line_break(&self.name) || self.name.contains('"') {
            return Err(invalid("name contains a quote or line break"));
        }

        let (data, filename) = match &self.body {
            PartBody::Value(value) => (Bytes::from(value.clone()), None),
            PartBody::File { filename, data } => {
                check_filename(filename).map_err(invalid)?;
                (data.clone(), Some(filename))
            }
            PartBody::Path { filename, path } => {
                check_filename(filename).map_err(invalid)?;
                let data = fsio::read_bytes(path).map_err(|source| ContentError::File {
                    path: path.display().to_string(),
                    source,
                })?;
                (data, Some(filename))
            }
        };

        let mut headers = vec![match filename {
            Some(filename) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{filename}\"",
                self.name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"", self.name),
        }];

        let default_mime = filename.map(|_| DEFAULT_FILE_MIME);
        let mime = match (&self.content_type, &self.content_type_parameter) {
            (Some(ct), _) => Some(ct.as_str()),
            (None, Some(_)) => Some(default_mime.unwrap_or(DEFAULT_VALUE_MIME)),
            (None, None) => default_mime,
        };
        if let Some(mime) = mime {
            if has_line_break(mime) {
                return Err(invalid("content type contains a line break"));
            }
            headers.push(match &self.content_type_parameter {
                Some(param) if has_line_break(param) => {
                    return Err(invalid("content type parameter contains a line break"));
                }
                Some(param) => format!("Content-Type: {mime}; {param}"),
                None => format!("Content-Type: {mime}"),
            });
        }

        if let Some(line) = &self.header_line {
            if has_line_break(line) || !line.contains(':') {
                return Err(invalid("custom header line is malformed"));
            }
            headers.push(line.clone());
        }

        Ok(MimePart { headers, data })
    }
}

fn has_line_break(s: &str) -> bool {
    s.contains(['\r', '\n'])
}

fn check_filename(filename: &str) -> Result<(), &'static str> {
    if has_line_break(filename) || filename.contains('"') {
        Err("file name contains a quote or line break")
    } else {
        Ok(())
    }
}

/// A built part: its header lines and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    pub headers: Vec<String>,
    pub data: Bytes,
}

/// A fully built multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeForm {
    boundary: String,
    parts: Vec<MimePart>,
}

impl MimeForm {
    #[must_use]
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    #[must_use]
    pub fn parts(&self) -> &[MimePart] {
        &self.parts
    }

    #[must_use]
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Serialize the form as a `multipart/form-data` body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for part in &self.parts {
            buf.put_slice(b"--");
            buf.put_slice(self.boundary.as_bytes());
            buf.put_slice(b"\r\n");
            for header in &part.headers {
                buf.put_slice(header.as_bytes());
                buf.put_slice(b"\r\n");
            }
            buf.put_slice(b"\r\n");
            buf.put_slice(&part.data);
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"--");
        buf.put_slice(self.boundary.as_bytes());
        buf.put_slice(b"--\r\n");
        buf.freeze()
    }
}

fn random_boundary() -> String {
    let bits: u128 = rand::rng().random();
    format!("------------------------{:024x}", bits >> 32)
}

/// Ordered multipart form body.
///
/// Building is all-or-nothing: if any part is malformed the whole form is
/// discarded and no body is produced.
#[derive(Debug, Clone, Default)]
pub struct MultipartContent {
    parts: Vec<Part>,
}

impl MultipartContent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_part(&mut self, part: Part) {
        self.parts.push(part);
    }

    #[must_use]
    pub fn part(mut self, part: Part) -> Self {
        self.add_part(part);
        self
    }

    pub fn add_part_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.add_part(Part::value(name, value));
    }

    pub fn add_part_file(
        &mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        data: impl Into<Bytes>,
    ) {
        self.add_part(Part::file(name, filename, data));
    }

    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn clear(&mut self) {
        self.parts.clear();
    }

    /// Build every part in order.
    ///
    /// # Errors
    ///
    /// Returns the first part failure; parts built before it are dropped.
    pub fn build(&self) -> Result<MimeForm, ContentError> {
        let parts = self
            .parts
            .iter()
            .enumerate()
            .map(|(index, part)| part.build(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MimeForm {
            boundary: random_boundary(),
            parts,
        })
    }
}

impl Content for MultipartContent {
    fn kind(&self) -> ContentKind {
        ContentKind::Multipart
    }

    fn init_content(&mut self) -> Result<ContentData, ContentError> {
        self.build().map(ContentData::Multipart)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn body_text(form: &MimeForm) -> String {
        String::from_utf8(form.encode().to_vec()).unwrap()
    }

    #[test]
    fn test_value_and_file_parts_in_order() {
        let form = MultipartContent::new()
            .part(Part::value("title", "hello"))
            .part(Part::file("upload", "a.txt", "file body"))
            .build()
            .unwrap();

        let b = form.boundary().to_owned();
        let expected = format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"title\"\r\n\r\n\
             hello\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"upload\"; filename=\"a.txt\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             file body\r\n\
             --{b}--\r\n"
        );
        assert_eq!(body_text(&form), expected);
        assert_eq!(
            form.content_type(),
            format!("multipart/form-data; boundary={b}")
        );
    }

    #[test]
    fn test_per_part_header_and_content_type() {
        let form = MultipartContent::new()
            .part(
                Part::value("meta", "{}")
                    .content_type("application/json")
                    .content_type_parameter("charset=utf-8")
                    .header_line("X-Part: 1"),
            )
            .build()
            .unwrap();
        assert_eq!(
            form.parts()[0].headers,
            vec![
                "Content-Disposition: form-data; name=\"meta\"".to_owned(),
                "Content-Type: application/json; charset=utf-8".to_owned(),
                "X-Part: 1".to_owned(),
            ]
        );
    }

    #[test]
    fn test_parameter_without_type_uses_default_mime() {
        let form = MultipartContent::new()
            .part(Part::value("v", "x").content_type_parameter("charset=utf-8"))
            .build()
            .unwrap();
        assert_eq!(
            form.parts()[0].headers[1],
            "Content-Type: text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_malformed_part_aborts_whole_build() {
        let content = MultipartContent::new()
            .part(Part::value("ok", "1"))
            .part(Part::value("bad", "2").header_line("no colon here"))
            .part(Part::value("ok2", "3"));
        let err = content.build().unwrap_err();
        assert!(matches!(err, ContentError::InvalidPart { index: 1, .. }));
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        for part in [
            Part::value("", "x"),
            Part::value("a\r\nb", "x"),
            Part::value("q\"", "x"),
            Part::file("f", "evil\n.txt", "x"),
            Part::value("v", "x").content_type("text/plain\r\nX: y"),
        ] {
            let content = MultipartContent::new().part(part);
            assert!(content.build().is_err());
        }
    }

    #[test]
    fn test_missing_file_is_reported() {
        let mut content = MultipartContent::new().part(Part::file_from_path(
            "doc",
            "/definitely/not/here/file.bin",
        ));
        let err = content.init_content().unwrap_err();
        assert!(matches!(err, ContentError::File { .. }));
    }

    #[test]
    fn test_file_from_path_reads_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let form = MultipartContent::new()
            .part(Part::file_from_path("report", &path).content_type("text/csv"))
            .build()
            .unwrap();
        let part = &form.parts()[0];
        assert_eq!(
            part.headers[0],
            "Content-Disposition: form-data; name=\"report\"; filename=\"report.csv\""
        );
        assert_eq!(part.headers[1], "Content-Type: text/csv");
        assert_eq!(part.data.as_ref(), b"a,b\n1,2\n");
    }

    #[test]
    fn test_boundaries_are_random() {
        let content = MultipartContent::new().part(Part::value("a", "b"));
        let first = content.build().unwrap();
        let second = content.build().unwrap();
        assert_ne!(first.boundary(), second.boundary());
        assert_eq!(first.boundary().len(), 48);
    }
}
