//! Document conversion: `.docx` paragraphs rendered to PDF.

pub mod docx;
pub mod font;
pub mod pdf;

use std::{fmt::Display, io, path::Path};
use thiserror::Error;

use font::PdfFont;
use pdf::PageLayout;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("not a word-processing document: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("document part `{0}` is missing")]
    MissingPart(&'static str),
    #[error("malformed document xml: {0}")]
    Xml(String),
    #[error("pdf output failed: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("font unavailable: {0}")]
    Font(String),
}

impl ConvertError {
    pub fn xml(err: impl Display) -> Self {
        ConvertError::Xml(err.to_string())
    }
}

/// Convert the document at `input` and write the PDF to `output`.
/// Returns the number of paragraphs rendered.
pub fn convert_docx_to_pdf(input: &Path, output: &Path, font: &PdfFont) -> Result<usize, ConvertError> {
    let paragraphs = docx::read_paragraphs(input)?;
    let bytes = pdf::render(&paragraphs, font, &PageLayout::default())?;
    std::fs::write(output, bytes)?;
    Ok(paragraphs.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_a_document_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.docx");
        let output = dir.path().join("out.pdf");
        std::fs::write(&input, docx::tests::docx_bytes(&["Hello", "World"])).unwrap();

        let count = convert_docx_to_pdf(&input, &output, &PdfFont::Builtin).unwrap();

        assert_eq!(count, 2);
        let bytes = std::fs::read(&output).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
    }

    #[test]
    fn non_document_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.docx");
        std::fs::write(&input, b"not a zip").unwrap();

        let err = convert_docx_to_pdf(&input, &dir.path().join("out.pdf"), &PdfFont::Builtin).unwrap_err();
        assert!(matches!(err, ConvertError::Archive(_)));
    }
}
