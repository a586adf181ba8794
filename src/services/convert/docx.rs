//! Paragraph text extraction from word-processing (`.docx`) documents.

use quick_xml::{Reader, events::Event};
use std::{
    fs::File,
    io::{Read, Seek},
    path::Path,
};

use super::ConvertError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Read the body paragraphs of the document at `path`, in order.
pub fn read_paragraphs(path: &Path) -> Result<Vec<String>, ConvertError> {
    let file = File::open(path)?;
    paragraphs_from_reader(file)
}

pub fn paragraphs_from_reader<R: Read + Seek>(reader: R) -> Result<Vec<String>, ConvertError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut part = archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| ConvertError::MissingPart(DOCUMENT_PART))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    parse_document_xml(&xml)
}

/// Collect body-level paragraphs from `word/document.xml`.
///
/// Paragraphs inside tables are left out, and so is text of paragraphs
/// nested in a body paragraph (text boxes). Runs of text are concatenated;
/// tabs become `\t` and breaks become `\n`.
pub fn parse_document_xml(xml: &str) -> Result<Vec<String>, ConvertError> {
    let mut reader = Reader::from_str(xml);

    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut paragraph_depth = 0usize;
    let mut table_depth = 0usize;
    let mut in_properties = false;
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(ConvertError::xml)? {
            Event::Start(e) => match e.name().as_ref() {
                b"w:tbl" => table_depth += 1,
                b"w:p" => {
                    paragraph_depth += 1;
                    if paragraph_depth == 1 && table_depth == 0 {
                        current = Some(String::new());
                    }
                }
                b"w:pPr" => in_properties = true,
                b"w:t" => in_text = paragraph_depth == 1,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" if paragraph_depth == 0 && table_depth == 0 => {
                    paragraphs.push(String::new());
                }
                b"w:tab" if paragraph_depth == 1 && !in_properties => push_text(&mut current, "\t"),
                b"w:br" | b"w:cr" if paragraph_depth == 1 => push_text(&mut current, "\n"),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(ConvertError::xml)?;
                push_text(&mut current, &text);
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:tbl" => table_depth = table_depth.saturating_sub(1),
                b"w:p" => {
                    paragraph_depth = paragraph_depth.saturating_sub(1);
                    if paragraph_depth == 0 {
                        if let Some(text) = current.take() {
                            paragraphs.push(text);
                        }
                    }
                }
                b"w:pPr" => in_properties = false,
                b"w:t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

fn push_text(current: &mut Option<String>, text: &str) {
    if let Some(paragraph) = current.as_mut() {
        paragraph.push_str(text);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    /// Minimal `.docx` container holding the given paragraphs.
    pub(crate) fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, escape(p)))
            .collect();
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}<w:sectPr/></w:body></w:document>"#
        );

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("[Content_Types].xml", options).unwrap();
        writer.write_all(b"<Types/>").unwrap();
        writer.start_file(DOCUMENT_PART, options).unwrap();
        writer.write_all(document.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn escape(text: &str) -> String {
        text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
    }

    fn wrap(body: &str) -> String {
        format!(
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        )
    }

    #[test]
    fn joins_runs_and_keeps_order() {
        let xml = wrap(
            r#"<w:p><w:r><w:t>Hello, </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>world</w:t></w:r></w:p>
               <w:p><w:r><w:t>Second &amp; last</w:t></w:r></w:p>"#,
        );
        let paragraphs = parse_document_xml(&xml).unwrap();
        assert_eq!(paragraphs, vec!["Hello, world", "Second & last"]);
    }

    #[test]
    fn tabs_breaks_and_empty_paragraphs() {
        let xml = wrap(
            r#"<w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/><w:t>c</w:t></w:r></w:p><w:p/><w:p><w:pPr/></w:p>"#,
        );
        let paragraphs = parse_document_xml(&xml).unwrap();
        assert_eq!(paragraphs, vec!["a\tb\nc", "", ""]);
    }

    #[test]
    fn table_paragraphs_are_not_body_paragraphs() {
        let xml = wrap(
            r#"<w:p><w:r><w:t>before</w:t></w:r></w:p>
               <w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
               <w:p><w:r><w:t>after</w:t></w:r></w:p>"#,
        );
        assert_eq!(parse_document_xml(&xml).unwrap(), vec!["before", "after"]);
    }

    #[test]
    fn text_box_paragraphs_are_not_part_of_the_anchor() {
        let text_box = r#"<w:txbxContent><w:p><w:r><w:t>boxed</w:t><w:br/></w:r></w:p></w:txbxContent>"#;
        let xml = wrap(&format!(
            r#"<w:p><w:r><w:t>anchor</w:t></w:r><w:r><mc:AlternateContent><mc:Choice Requires="wps"><w:drawing>{text_box}</w:drawing></mc:Choice><mc:Fallback><w:pict>{text_box}</w:pict></mc:Fallback></mc:AlternateContent></w:r><w:r><w:t> text</w:t></w:r></w:p>"#
        ));
        assert_eq!(parse_document_xml(&xml).unwrap(), vec!["anchor text"]);
    }

    #[test]
    fn tab_stops_in_paragraph_properties_are_not_text() {
        let xml = wrap(
            r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t></w:r></w:p>"#,
        );
        assert_eq!(parse_document_xml(&xml).unwrap(), vec!["a\tb"]);
    }

    #[test]
    fn keeps_unicode_text() {
        let xml = wrap(r#"<w:p><w:r><w:t>Zażółć gęślą jaźń — 東京</w:t></w:r></w:p>"#);
        assert_eq!(parse_document_xml(&xml).unwrap(), vec!["Zażółć gęślą jaźń — 東京"]);
    }

    #[test]
    fn reads_paragraphs_from_container() {
        let bytes = docx_bytes(&["First paragraph", "Second <one>"]);
        let paragraphs = paragraphs_from_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(paragraphs, vec!["First paragraph", "Second <one>"]);
    }

    #[test]
    fn container_without_document_part_is_rejected() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("other.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<x/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = paragraphs_from_reader(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, ConvertError::MissingPart(_)));
    }

    #[test]
    fn non_zip_input_is_rejected() {
        let err = paragraphs_from_reader(Cursor::new(b"plain text".to_vec())).unwrap_err();
        assert!(matches!(err, ConvertError::Archive(_)));
    }
}
