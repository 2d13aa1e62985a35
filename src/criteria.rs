use std::path::Path;

use lopdf::content::Content;
use lopdf::{Document, Object};

use crate::settings::SettingsError;

/// TJ spacing adjustments more negative than this are treated as a word gap.
const TJ_WORD_GAP: f32 = -200.0;

/// Read criteria from a file. PDFs go through [`extract_text_from_pdf`],
/// anything else is read as UTF-8 text.
pub fn load_criteria_file(path: &Path) -> Result<String, SettingsError> {
    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        let bytes = std::fs::read(path)?;
        extract_text_from_pdf(&bytes)
    } else {
        Ok(std::fs::read_to_string(path)?.trim().to_string())
    }
}

/// Text shown by the PDF's content streams, page by page. Only the string
/// operands of text-showing operators are kept; scanned PDFs have none and
/// yield an error.
pub fn extract_text_from_pdf(bytes: &[u8]) -> Result<String, SettingsError> {
    let doc = Document::load_mem(bytes)?;

    let mut text = String::new();
    for (page_num, page_id) in doc.get_pages() {
        let content = match doc.get_page_content(page_id).and_then(|data| Content::decode(&data)) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Skipping PDF page {}: {}", page_num, e);
                continue;
            }
        };
        for op in &content.operations {
            match op.operator.as_str() {
                "Tj" => push_strings(&op.operands, &mut text),
                "'" | "\"" => {
                    text.push('\n');
                    push_strings(&op.operands, &mut text);
                }
                "TJ" => {
                    for operand in &op.operands {
                        if let Object::Array(items) = operand {
                            push_tj_array(items, &mut text);
                        }
                    }
                }
                "Td" | "TD" | "T*" | "ET" => text.push('\n'),
                _ => {}
            }
        }
        text.push('\n');
    }

    let text = tidy(&text);
    if text.is_empty() {
        return Err(SettingsError::Criteria(
            "Could not extract text from PDF. The PDF might be image-based or encrypted; \
             paste the criteria as text instead."
                .to_string(),
        ));
    }
    Ok(text)
}

fn push_strings(operands: &[Object], out: &mut String) {
    for operand in operands {
        if let Object::String(bytes, _) = operand {
            out.push_str(&decode_pdf_string(bytes));
        }
    }
}

fn push_tj_array(items: &[Object], out: &mut String) {
    for item in items {
        match item {
            Object::String(bytes, _) => out.push_str(&decode_pdf_string(bytes)),
            Object::Integer(n) if (*n as f32) < TJ_WORD_GAP => out.push(' '),
            Object::Real(n) if *n < TJ_WORD_GAP => out.push(' '),
            _ => {}
        }
    }
}

/// UTF-16BE when the string carries a byte-order mark, Latin-1 otherwise.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Collapse runs of spaces within lines and drop blank lines.
fn tidy(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Operation;
    use lopdf::{dictionary, Stream};
    use tempfile::TempDir;

    /// A one-page PDF whose content stream runs `operations`.
    fn pdf_with(operations: Vec<Operation>, compress: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        if compress {
            doc.compress();
        }
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn criteria_ops() -> Vec<Operation> {
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal("1. Must use RCTs")]),
            Operation::new("Td", vec![0.into(), (-14).into()]),
            Operation::new(
                "TJ",
                vec![Object::Array(vec![
                    Object::string_literal("2. Human"),
                    (-250).into(),
                    Object::string_literal("subjects"),
                ])],
            ),
            Operation::new("ET", vec![]),
        ]
    }

    #[test]
    fn test_text_operators_only() {
        let text = extract_text_from_pdf(&pdf_with(criteria_ops(), false)).unwrap();
        assert_eq!(text, "1. Must use RCTs\n2. Human subjects");
        assert!(!text.contains("Tf"));
        assert!(!text.contains("BT"));
    }

    #[test]
    fn test_compressed_streams() {
        let bytes = pdf_with(criteria_ops(), true);
        let text = extract_text_from_pdf(&bytes).unwrap();
        assert_eq!(text, "1. Must use RCTs\n2. Human subjects");
    }

    #[test]
    fn test_drawing_only_page_has_no_text() {
        let ops = vec![
            Operation::new("m", vec![0.into(), 0.into()]),
            Operation::new("l", vec![100.into(), 100.into()]),
            Operation::new("S", vec![]),
        ];
        assert!(matches!(
            extract_text_from_pdf(&pdf_with(ops, true)),
            Err(SettingsError::Criteria(_))
        ));
    }

    #[test]
    fn test_not_a_pdf() {
        assert!(matches!(
            extract_text_from_pdf(b"plain text, not a pdf"),
            Err(SettingsError::Pdf(_))
        ));
    }

    #[test]
    fn test_utf16_strings() {
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x48, 0x00, 0xE9]), "Hé");
        assert_eq!(decode_pdf_string(b"caf\xe9"), "café");
    }

    #[test]
    fn test_load_pdf_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("criteria.PDF");
        std::fs::write(&path, pdf_with(criteria_ops(), true)).unwrap();
        assert_eq!(
            load_criteria_file(&path).unwrap(),
            "1. Must use RCTs\n2. Human subjects"
        );
    }

    #[test]
    fn test_load_text_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("criteria.txt");
        std::fs::write(&path, "1. Human subjects\n2. After 2010\n").unwrap();
        assert_eq!(load_criteria_file(&path).unwrap(), "1. Human subjects\n2. After 2010");
    }
}
