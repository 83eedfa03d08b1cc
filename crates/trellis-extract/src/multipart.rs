//! `multipart/form-data` parsing.
//!
//! The body is already buffered by the server, so the whole form is parsed
//! in one pass: text parts become `(name, value)` pairs for typed decoding,
//! file parts become [`UploadedFile`]s.

use std::io;

use bytes::Bytes;
use http::{header, HeaderMap};

use crate::DecodeError;

/// Default cap on a multipart body (32 MiB).
pub const DEFAULT_MAX_MULTIPART_SIZE: usize = 32 * 1024 * 1024;

/// Limits applied while parsing a multipart body.
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// Maximum total body size in bytes.
    pub max_body_size: usize,
    /// Maximum number of parts.
    pub max_fields: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_MULTIPART_SIZE,
            max_fields: 100,
        }
    }
}

impl MultipartConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum body size.
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Sets the maximum number of parts.
    #[must_use]
    pub fn max_fields(mut self, count: usize) -> Self {
        self.max_fields = count;
        self
    }
}

/// A file part of a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Form field name.
    pub field_name: String,
    /// Client-supplied file name.
    pub file_name: Option<String>,
    /// Declared content type.
    pub content_type: Option<String>,
    /// File contents.
    pub data: Bytes,
}

impl UploadedFile {
    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Lowercased extension of the file name, without the dot.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

/// A fully parsed multipart form.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    /// Text parts in order.
    pub fields: Vec<(String, String)>,
    /// File parts in order.
    pub files: Vec<UploadedFile>,
}

impl MultipartForm {
    /// Parses `body` using the boundary from `headers`.
    pub async fn parse(
        headers: &HeaderMap,
        body: Bytes,
        config: &MultipartConfig,
    ) -> Result<Self, DecodeError> {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .ok_or_else(|| DecodeError::ContentType("missing multipart content type".into()))?
            .to_str()
            .map_err(|_| DecodeError::ContentType("invalid UTF-8 in Content-Type header".into()))?;

        let boundary = multer::parse_boundary(content_type).map_err(|_| {
            DecodeError::ContentType("missing or invalid boundary in multipart Content-Type".into())
        })?;

        if body.len() > config.max_body_size {
            return Err(DecodeError::PayloadTooLarge {
                limit: config.max_body_size,
                actual: body.len(),
            });
        }

        let stream = futures_util::stream::once(async move { Ok::<_, io::Error>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut form = Self::default();
        let mut count = 0;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| DecodeError::Multipart(e.to_string()))?
        {
            count += 1;
            if count > config.max_fields {
                return Err(DecodeError::Multipart(format!(
                    "too many fields (max {})",
                    config.max_fields
                )));
            }

            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(ToString::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| {
                    DecodeError::Multipart(format!("failed to read field `{name}`: {e}"))
                })?;

            if file_name.is_some() {
                form.files.push(UploadedFile {
                    field_name: name,
                    file_name,
                    content_type,
                    data,
                });
            } else {
                let text = String::from_utf8(data.to_vec()).map_err(|_| {
                    DecodeError::Multipart(format!("field `{name}` is not valid UTF-8"))
                })?;
                form.fields.push((name, text));
            }
        }

        Ok(form)
    }

    /// Finds a file part by field name.
    #[must_use]
    pub fn file(&self, field_name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field_name == field_name)
    }

    /// Moves a file part out by field name.
    #[must_use]
    pub fn take_file(&mut self, field_name: &str) -> Option<UploadedFile> {
        let pos = self.files.iter().position(|f| f.field_name == field_name)?;
        Some(self.files.remove(pos))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use http::HeaderValue;

    pub(crate) const BOUNDARY: &str = "X-TRELLIS-BOUNDARY";

    pub(crate) fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &str)]) -> Bytes {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        for (name, file_name, content) in files {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: text/csv\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Bytes::from(body)
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&format!("multipart/form-data; boundary={BOUNDARY}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn test_parse_fields_and_files() {
        let body = multipart_body(&[("name", "ada")], &[("upload", "rows.csv", "a,b\n1,2")]);
        let mut form = MultipartForm::parse(&headers(), body, &MultipartConfig::default())
            .await
            .unwrap();

        assert_eq!(form.fields, vec![("name".to_string(), "ada".to_string())]);
        let file = form.take_file("upload").unwrap();
        assert_eq!(file.file_name.as_deref(), Some("rows.csv"));
        assert_eq!(file.extension().as_deref(), Some("csv"));
        assert_eq!(file.data, Bytes::from("a,b\n1,2"));
        assert!(form.file("upload").is_none());
    }

    #[tokio::test]
    async fn test_rejects_oversized_body() {
        let body = multipart_body(&[("name", "ada")], &[]);
        let config = MultipartConfig::new().max_body_size(4);
        let err = MultipartForm::parse(&headers(), body, &config).await.unwrap_err();
        assert!(matches!(err, DecodeError::PayloadTooLarge { limit: 4, .. }));
    }

    #[tokio::test]
    async fn test_missing_boundary() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("multipart/form-data"));
        let err = MultipartForm::parse(&headers, Bytes::new(), &MultipartConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::ContentType(_)));
    }

    #[tokio::test]
    async fn test_too_many_fields() {
        let body = multipart_body(&[("a", "1"), ("b", "2")], &[]);
        let config = MultipartConfig::new().max_fields(1);
        let err = MultipartForm::parse(&headers(), body, &config).await.unwrap_err();
        assert!(matches!(err, DecodeError::Multipart(_)));
    }
}
