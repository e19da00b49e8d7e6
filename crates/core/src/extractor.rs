use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Converts raw file bytes into page-level text.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, name: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfParser;

impl DocumentParser for PdfParser {
    fn parse(&self, name: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load_mem(bytes)
            .map_err(|error| IngestError::DocumentParse(format!("{name}: {error}")))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::DocumentParse(format!("{name}: {error}")))?;

            pages.push(PageText {
                number: page_no,
                text: text.trim().to_string(),
            });
        }

        Ok(pages)
    }
}

/// UTF-8 text files; a form feed starts a new page.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, name: &str, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|error| IngestError::DocumentParse(format!("{name}: {error}")))?;

        Ok(text
            .split('\u{000c}')
            .enumerate()
            .map(|(index, page)| PageText {
                number: (index + 1) as u32,
                text: page.trim().to_string(),
            })
            .collect())
    }
}

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "txt", "md"];

pub fn parser_for(path: &Path) -> Result<Box<dyn DocumentParser>, IngestError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => Ok(Box::new(PdfParser)),
        "txt" | "md" => Ok(Box::new(PlainTextParser)),
        _ => Err(IngestError::UnsupportedDocument(
            path.display().to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_splits_pages_on_form_feed() {
        let pages = PlainTextParser
            .parse("notes.txt", "First page\u{000C}Second page\n".as_bytes())
            .expect("valid utf-8");

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[0].text, "First page");
        assert_eq!(pages[1].number, 2);
        assert_eq!(pages[1].text, "Second page");
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let result = PlainTextParser.parse("bad.txt", &[0xff, 0xfe, 0xfd]);
        assert!(matches!(result, Err(IngestError::DocumentParse(_))));
    }

    #[test]
    fn broken_pdf_is_a_parse_error() {
        let result = PdfParser.parse("broken.pdf", b"%PDF-1.4\n%broken");
        assert!(matches!(result, Err(IngestError::DocumentParse(_))));
    }

    #[test]
    fn parser_is_selected_by_extension() {
        assert!(parser_for(Path::new("a/b/report.PDF")).is_ok());
        assert!(parser_for(Path::new("readme.md")).is_ok());
        assert!(matches!(
            parser_for(Path::new("image.png")),
            Err(IngestError::UnsupportedDocument(_))
        ));
    }
}
