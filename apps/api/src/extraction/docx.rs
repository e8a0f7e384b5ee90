use std::io::{Cursor, Read, Seek};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, Event};
use quick_xml::Reader;

use crate::extraction::ExtractionError;

/// Flows the body text of a DOCX package into plain text, one paragraph per line.
pub fn extract_docx_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExtractionError::Docx(format!("Failed to open DOCX: {}", e)))?;

    read_document_xml(&mut archive).and_then(|xml| parse_docx_xml(&xml))
}

fn read_document_xml<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<String, ExtractionError> {
    let mut document_xml = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractionError::Docx(format!("Failed to find document.xml: {}", e)))?;

    let mut xml_content = String::new();
    document_xml
        .read_to_string(&mut xml_content)
        .map_err(|e| ExtractionError::Docx(format!("Failed to read document.xml: {}", e)))?;

    Ok(xml_content)
}

fn parse_docx_xml(xml: &str) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut text = String::new();
    let mut in_text_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_element = true;
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => text.push('\n'),
                // table cells read left to right
                b"tc" => text.push(' '),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_element {
                    let decoded = e.decode().unwrap_or_default();
                    text.push_str(&decoded);
                }
            }
            // `&amp;`, `&#8217;` and friends arrive as their own events
            Ok(Event::GeneralRef(e)) => {
                if in_text_element {
                    push_reference(&mut text, &e);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::Docx(format!("XML parsing error: {}", e)));
            }
            _ => {}
        }
    }

    Ok(text)
}

fn push_reference(text: &mut String, reference: &BytesRef<'_>) {
    if let Ok(Some(ch)) = reference.resolve_char_ref() {
        text.push(ch);
        return;
    }
    if let Some(resolved) = reference
        .decode()
        .ok()
        .and_then(|name| resolve_predefined_entity(&name))
    {
        text.push_str(resolved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            write!(
                zip,
                r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
            )
            .unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_paragraphs_become_lines() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>Jane Doe</w:t></w:r></w:p><w:p><w:r><w:t>Staff</w:t></w:r><w:r><w:t xml:space=\"preserve\"> Engineer</w:t></w:r></w:p>",
        );
        let text = extract_docx_text(&bytes).unwrap();
        assert_eq!(text, "Jane Doe\nStaff Engineer\n");
    }

    #[test]
    fn test_tabs_and_breaks() {
        let bytes = docx_with_body("<w:p><w:r><w:t>Rust</w:t><w:tab/><w:t>Go</w:t><w:br/><w:t>SQL</w:t></w:r></w:p>");
        let text = extract_docx_text(&bytes).unwrap();
        assert_eq!(text, "Rust\tGo\nSQL\n");
    }

    #[test]
    fn test_entity_and_character_references() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>R&amp;D lead at AT&amp;T</w:t></w:r></w:p>\
             <w:p><w:r><w:t>&lt;5 years&gt; at O&#8217;Reilly&#x21;</w:t></w:r></w:p>",
        );
        let text = extract_docx_text(&bytes).unwrap();
        assert_eq!(text, "R&D lead at AT&T\n<5 years> at O\u{2019}Reilly!\n");
    }

    #[test]
    fn test_not_a_zip_is_an_error() {
        let err = extract_docx_text(b"plain bytes").unwrap_err();
        assert!(matches!(err, ExtractionError::Docx(_)));
    }
}
