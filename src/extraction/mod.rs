//! Source extraction: turns uploaded files, web pages, and inline text into plain text.
//!
//! File inputs are staged to disk under the configured upload directory before parsing and the
//! staged copy is removed once parsing finishes, whether it succeeded or not. URL inputs are
//! fetched with a plain GET and reduced to the text of their `<p>` elements.

mod docx;
mod pdf;
mod staging;
mod web;

use reqwest::Client;
use std::path::{Path, PathBuf};
use thiserror::Error;

use staging::StagedFile;

/// Errors raised while turning a source into plain text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Declared filename did not end in a supported suffix.
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),
    /// Remote page could not be retrieved.
    #[error("{0}")]
    Fetch(String),
    /// Staging the upload on disk failed.
    #[error("Failed to stage upload: {0}")]
    Staging(#[source] std::io::Error),
    /// Reading the staged file back failed.
    #[error("Failed to read {kind} file: {source}")]
    Read {
        /// File kind being read.
        kind: FileKind,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file was read but its contents could not be parsed.
    #[error("Failed to parse {kind} file: {message}")]
    Parse {
        /// File kind being parsed.
        kind: FileKind,
        /// Parser-supplied detail.
        message: String,
    },
    /// Blocking parse task was cancelled or panicked outside the parser guard.
    #[error("Extraction task failed: {0}")]
    Task(String),
}

/// Closed set of uploadable file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Paginated PDF document.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
    /// Plain UTF-8 text.
    Txt,
}

impl FileKind {
    /// Resolve the file kind from a declared filename.
    ///
    /// Matching is an exact, case-sensitive suffix check, so `report.PDF` is rejected.
    pub fn from_filename(filename: &str) -> Result<Self, ExtractionError> {
        [Self::Pdf, Self::Docx, Self::Txt]
            .into_iter()
            .find(|kind| filename.ends_with(kind.suffix()))
            .ok_or_else(|| ExtractionError::UnsupportedFormat(filename.to_string()))
    }

    /// Filename suffix including the leading dot.
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Pdf => ".pdf",
            Self::Docx => ".docx",
            Self::Txt => ".txt",
        }
    }

    /// Which source kind a document of this file kind reports.
    pub const fn source_kind(self) -> SourceKind {
        match self {
            Self::Pdf => SourceKind::Pdf,
            Self::Docx => SourceKind::Docx,
            Self::Txt => SourceKind::Txt,
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.suffix()[1..])
    }
}

/// Where a document's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Uploaded PDF.
    Pdf,
    /// Uploaded DOCX.
    Docx,
    /// Uploaded plain text.
    Txt,
    /// Fetched web page.
    Url,
    /// Text supplied directly in the request.
    RawText,
}

/// Identifies the concrete source a document was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Client-declared filename of an upload.
    Path(PathBuf),
    /// Address of a fetched page.
    Url(String),
    /// Text carried inline in the request.
    Inline,
}

/// Raw input accepted by [`SourceExtractor::extract`].
#[derive(Debug, Clone)]
pub enum SourceInput {
    /// Uploaded bytes plus the filename the client declared for them.
    File {
        /// Declared filename; only its suffix is used.
        filename: String,
        /// File contents.
        bytes: Vec<u8>,
    },
    /// Web page to fetch.
    Url(String),
    /// Text passed through unchanged.
    Inline(String),
}

/// A request-scoped document and its extracted text.
#[derive(Debug, Clone)]
pub struct Document {
    /// Kind of source the text was read from.
    pub source_kind: SourceKind,
    /// Concrete origin of the source.
    pub origin: Origin,
    /// Extracted plain text, populated by the extractor.
    pub text: Option<String>,
}

impl Document {
    /// Consume the document, returning its text (empty when nothing was extracted).
    pub fn into_text(self) -> String {
        self.text.unwrap_or_default()
    }
}

/// Converts raw inputs into [`Document`]s.
pub struct SourceExtractor {
    http: Client,
    staging_dir: PathBuf,
}

impl SourceExtractor {
    /// Build an extractor staging uploads under `staging_dir`, creating the directory if needed.
    pub fn new(staging_dir: impl Into<PathBuf>) -> Result<Self, ExtractionError> {
        let http = Client::builder()
            .user_agent(concat!("docsummarizer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| ExtractionError::Fetch(error.to_string()))?;
        Self::with_client(http, staging_dir)
    }

    /// Build an extractor around an existing HTTP client.
    pub fn with_client(
        http: Client,
        staging_dir: impl Into<PathBuf>,
    ) -> Result<Self, ExtractionError> {
        let staging_dir = staging_dir.into();
        std::fs::create_dir_all(&staging_dir).map_err(ExtractionError::Staging)?;
        Ok(Self { http, staging_dir })
    }

    /// Extract plain text from any supported input.
    pub async fn extract(&self, input: SourceInput) -> Result<Document, ExtractionError> {
        match input {
            SourceInput::File { filename, bytes } => self.extract_file(&filename, bytes).await,
            SourceInput::Url(url) => {
                let text = web::fetch_paragraphs(&self.http, &url).await?;
                Ok(Document {
                    source_kind: SourceKind::Url,
                    origin: Origin::Url(url),
                    text: Some(text),
                })
            }
            SourceInput::Inline(text) => Ok(Document {
                source_kind: SourceKind::RawText,
                origin: Origin::Inline,
                text: Some(text),
            }),
        }
    }

    /// Stage an upload, parse it according to its suffix, and remove the staged copy.
    pub async fn extract_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<Document, ExtractionError> {
        let kind = FileKind::from_filename(filename)?;
        let staged = StagedFile::write(&self.staging_dir, kind, &bytes)?;
        tracing::debug!(
            kind = %kind,
            bytes = bytes.len(),
            path = %staged.path().display(),
            "Staged upload"
        );

        let result = tokio::task::spawn_blocking(move || {
            let text = parse_staged(kind, staged.path());
            staged.release();
            text
        })
        .await
        .map_err(|error| ExtractionError::Task(error.to_string()))?;

        let text = result?;
        Ok(Document {
            source_kind: kind.source_kind(),
            origin: Origin::Path(PathBuf::from(filename)),
            text: Some(text),
        })
    }
}

fn parse_staged(kind: FileKind, path: &Path) -> Result<String, ExtractionError> {
    match kind {
        FileKind::Pdf => pdf::extract_text(path),
        FileKind::Docx => docx::extract_text(path),
        FileKind::Txt => {
            let bytes = std::fs::read(path).map_err(|source| ExtractionError::Read { kind, source })?;
            String::from_utf8(bytes).map_err(|error| ExtractionError::Parse {
                kind,
                message: error.to_string(),
            })
        }
    }
}
