//! PDF text extraction backed by `pdf-extract`.

use super::{ExtractionError, FileKind};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

/// Extract text page by page and concatenate it in page order with no separator.
///
/// A zero-byte file is treated as a document without pages. Pages that yield no text add
/// nothing to the output.
pub(super) fn extract_text(path: &Path) -> Result<String, ExtractionError> {
    let size = std::fs::metadata(path)
        .map_err(|source| ExtractionError::Read {
            kind: FileKind::Pdf,
            source,
        })?
        .len();
    if size == 0 {
        tracing::debug!(path = %path.display(), "Empty PDF upload; no pages to extract");
        return Ok(String::new());
    }

    // pdf-extract can panic on malformed fonts or glyph tables.
    let pages = match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_by_pages(path))) {
        Ok(Ok(pages)) => pages,
        Ok(Err(error)) => {
            return Err(ExtractionError::Parse {
                kind: FileKind::Pdf,
                message: error.to_string(),
            });
        }
        Err(_) => {
            tracing::error!(path = %path.display(), "PDF parser panicked");
            return Err(ExtractionError::Parse {
                kind: FileKind::Pdf,
                message: "PDF parser panicked on malformed content".into(),
            });
        }
    };

    Ok(join_pages(pages))
}

fn join_pages(pages: Vec<String>) -> String {
    let mut text = String::new();
    for (index, page) in pages.into_iter().enumerate() {
        if page.is_empty() {
            tracing::debug!(page = index + 1, "PDF page yielded no text");
            continue;
        }
        text.push_str(&page);
    }
    text
}


#[cfg(test)]
mod tests {
    use super::fixtures::pdf_with_pages;
    use super::*;

    fn write_pdf(dir: &Path, pages: &[&str]) -> std::path::PathBuf {
        let path = dir.join("document.pdf");
        std::fs::write(&path, pdf_with_pages(pages)).expect("write pdf");
        path
    }

    #[test]
    fn pages_are_read_in_order_and_blank_pages_add_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_pdf(dir.path(), &["First", "", "Third"]);

        let text = extract_text(&path).expect("pdf text");

        assert_eq!(text.split_whitespace().collect::<Vec<_>>(), ["First", "Third"]);
    }

    #[test]
    fn document_of_blank_pages_yields_no_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_pdf(dir.path(), &["", ""]);

        let text = extract_text(&path).expect("pdf text");

        assert!(text.trim().is_empty(), "unexpected text {text:?}");
    }

    #[test]
    fn pages_are_joined_without_separator() {
        let pages = vec!["One.".to_string(), String::new(), "Two.".to_string()];
        assert_eq!(join_pages(pages), "One.Two.");
    }

    #[test]
    fn no_pages_yield_empty_text() {
        assert_eq!(join_pages(Vec::new()), "");
    }
}
