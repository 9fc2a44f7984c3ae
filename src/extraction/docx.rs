//! DOCX text extraction backed by `docx-rs`.

use super::{ExtractionError, FileKind};
use docx_rs::{DocumentChild, ParagraphChild, RunChild};
use std::path::Path;

/// Extract body paragraphs in document order, one paragraph per line.
pub(super) fn extract_text(path: &Path) -> Result<String, ExtractionError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractionError::Read {
        kind: FileKind::Docx,
        source,
    })?;
    let document = docx_rs::read_docx(&bytes).map_err(|error| ExtractionError::Parse {
        kind: FileKind::Docx,
        message: error.to_string(),
    })?;

    let paragraphs: Vec<String> = document
        .document
        .children
        .iter()
        .filter_map(|child| match child {
            DocumentChild::Paragraph(paragraph) => Some(paragraph_text(&paragraph.children)),
            _ => None,
        })
        .collect();

    Ok(paragraphs.join("\n"))
}

fn paragraph_text(children: &[ParagraphChild]) -> String {
    let mut text = String::new();
    for child in children {
        match child {
            ParagraphChild::Run(run) => {
                for run_child in &run.children {
                    match run_child {
                        RunChild::Text(run_text) => text.push_str(&run_text.text),
                        RunChild::Tab(_) => text.push('\t'),
                        RunChild::Break(_) => text.push('\n'),
                        _ => {}
                    }
                }
            }
            ParagraphChild::Hyperlink(link) => text.push_str(&paragraph_text(&link.children)),
            _ => {}
        }
    }
    text
}
