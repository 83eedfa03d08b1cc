//! Upload format detection.

use std::fmt;
use std::str::FromStr;

use trellis_extract::UploadedFile;

use crate::ImportError;

/// A supported upload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Legacy Excel workbook.
    Xls,
    /// Office Open XML workbook.
    Xlsx,
    /// Comma-separated values.
    Csv,
}

impl FileKind {
    /// Extension without the dot.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Xls => "xls",
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }

    /// Returns `true` for workbook formats read through calamine.
    pub const fn is_workbook(self) -> bool {
        matches!(self, Self::Xls | Self::Xlsx)
    }

    /// Maps a MIME type, ignoring parameters.
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let parsed: mime::Mime = content_type.parse().ok()?;
        match (parsed.type_().as_str(), parsed.subtype().as_str()) {
            ("text", "csv") | ("application", "csv") => Some(Self::Csv),
            ("application", "vnd.ms-excel") => Some(Self::Xls),
            ("application", "vnd.openxmlformats-officedocument.spreadsheetml.sheet") => {
                Some(Self::Xlsx)
            }
            _ => None,
        }
    }

    /// Detects the kind of an upload.
    ///
    /// The file name extension wins; the declared content type is the
    /// fallback since browsers often send `application/octet-stream`.
    pub fn detect(file: &UploadedFile) -> Result<Self, ImportError> {
        if let Some(ext) = file.extension() {
            if let Ok(kind) = ext.parse() {
                return Ok(kind);
            }
        }
        file.content_type
            .as_deref()
            .and_then(Self::from_mime)
            .ok_or_else(|| {
                let described = file
                    .extension()
                    .or_else(|| file.content_type.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                ImportError::UnsupportedKind(described)
            })
    }
}

impl FromStr for FileKind {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "xls" => Ok(Self::Xls),
            "xlsx" => Ok(Self::Xlsx),
            "csv" => Ok(Self::Csv),
            other => Err(ImportError::UnsupportedKind(other.to_string())),
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
