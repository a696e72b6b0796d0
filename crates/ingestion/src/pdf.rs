//! PDF text extraction module
//!
//! Extracts text content from PDF files using lopdf and reshapes it into
//! the `raw_text` / `sections` / `parser_metadata` columns of a paper.

use crate::errors::IngestionError;
use paper_curator_common::config::PdfParserConfig;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, instrument, warn};

pub const PARSER_NAME: &str = "lopdf";

/// A titled run of text, as stored in the `sections` column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfMetadata {
    pub pages: usize,
    pub pages_parsed: usize,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Parsed PDF content
#[derive(Debug, Clone)]
pub struct PdfContent {
    pub raw_text: String,
    pub sections: Vec<Section>,
    pub parser_used: String,
    pub metadata: PdfMetadata,
}

/// Validating wrapper around lopdf
#[derive(Debug, Clone)]
pub struct PdfParser {
    max_pages: usize,
    max_file_size_bytes: u64,
}

impl PdfParser {
    pub fn new(config: &PdfParserConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            max_file_size_bytes: config.max_file_size_mb * 1024 * 1024,
        }
    }

    /// Parse a PDF on the blocking thread pool
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn parse(&self, path: &Path) -> Result<PdfContent, IngestionError> {
        let bytes = self.read_validated(path).await?;
        let max_pages = self.max_pages;
        let display = path.display().to_string();

        tokio::task::spawn_blocking(move || extract(&bytes, max_pages, &display))
            .await
            .map_err(|e| IngestionError::PdfParse {
                path: path.display().to_string(),
                message: format!("Parser task failed: {}", e),
            })?
    }

    async fn read_validated(&self, path: &Path) -> Result<Vec<u8>, IngestionError> {
        let invalid = |message: String| IngestionError::PdfValidation {
            path: path.display().to_string(),
            message,
        };

        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| invalid(format!("File not readable: {}", e)))?;

        if meta.len() == 0 {
            return Err(invalid("File is empty".to_string()));
        }
        if meta.len() > self.max_file_size_bytes {
            return Err(invalid(format!(
                "File is {} bytes, limit is {}",
                meta.len(),
                self.max_file_size_bytes
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        if !bytes.starts_with(b"%PDF") {
            return Err(invalid("Missing %PDF header".to_string()));
        }
        Ok(bytes)
    }
}

fn extract(bytes: &[u8], max_pages: usize, path: &str) -> Result<PdfContent, IngestionError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| IngestionError::PdfParse {
        path: path.to_string(),
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages = doc.get_pages();
    let page_numbers: Vec<u32> = pages.keys().copied().take(max_pages).collect();

    debug!(
        page_count = pages.len(),
        pages_parsed = page_numbers.len(),
        "Extracting text from PDF"
    );

    let mut page_texts = Vec::with_capacity(page_numbers.len());
    for page_num in &page_numbers {
        match extract_page_text(&doc, *page_num) {
            Ok(text) => page_texts.push((*page_num, text)),
            Err(e) => {
                warn!(page = page_num, error = %e, "Failed to extract text from page, skipping")
            }
        }
    }

    let raw_text = clean_text(
        &page_texts
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    );

    if raw_text.is_empty() {
        return Err(IngestionError::PdfParse {
            path: path.to_string(),
            message: "No text content extracted from PDF".to_string(),
        });
    }

    let sections = split_sections(&page_texts);

    debug!(
        text_len = raw_text.len(),
        sections = sections.len(),
        "Text extraction complete"
    );

    Ok(PdfContent {
        raw_text,
        sections,
        parser_used: PARSER_NAME.to_string(),
        metadata: PdfMetadata {
            pages: pages.len(),
            pages_parsed: page_numbers.len(),
            size_bytes: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(bytes)),
        },
    })
}

/// lopdf's font-aware extraction first, raw content stream operators second
fn extract_page_text(doc: &lopdf::Document, page_num: u32) -> Result<String, String> {
    match doc.extract_text(&[page_num]) {
        Ok(text) if !text.trim().is_empty() => Ok(text),
        _ => {
            let page_id = doc
                .get_pages()
                .get(&page_num)
                .copied()
                .ok_or_else(|| format!("Page {} not found", page_num))?;
            let content = doc.get_page_content(page_id).map_err(|e| e.to_string())?;
            Ok(extract_text_from_content(&content))
        }
    }
}

/// Extract text from PDF content stream
fn extract_text_from_content(content: &[u8]) -> String {
    // Text lives between BT and ET operators
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;
    let mut current_text = String::new();

    for line in content_str.lines() {
        let trimmed = line.trim();

        if trimmed == "BT" {
            in_text_block = true;
            continue;
        }

        if trimmed == "ET" {
            in_text_block = false;
            if !current_text.is_empty() {
                text.push_str(&current_text);
                text.push('\n');
                current_text.clear();
            }
            continue;
        }

        if in_text_block {
            if let Some(text_content) = extract_text_from_operator(trimmed) {
                current_text.push_str(&text_content);
            }
        }
    }

    text
}

/// Extract text from a `Tj`, `'`, `"` or `TJ` operator
fn extract_text_from_operator(line: &str) -> Option<String> {
    if line.ends_with("Tj") || line.ends_with('\'') || line.ends_with('"') {
        let start = line.find('(')?;
        let end = line.rfind(')')?;
        return (start < end).then(|| decode_pdf_string(&line[start + 1..end]));
    }

    if line.ends_with("TJ") {
        let mut result = String::new();
        let mut in_paren = false;
        let mut current = String::new();

        for ch in line.chars() {
            match ch {
                '(' => in_paren = true,
                ')' => {
                    in_paren = false;
                    result.push_str(&decode_pdf_string(&current));
                    current.clear();
                }
                _ if in_paren => current.push(ch),
                _ => {}
            }
        }

        if !result.is_empty() {
            return Some(result);
        }
    }

    None
}

/// Decode PDF string escapes
fn decode_pdf_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some(c) => result.push(c),
                None => {}
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Collapse whitespace and drop BOMs
fn clean_text(text: &str) -> String {
    text.replace('\u{FEFF}', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn heading_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?:\d+(?:\.\d+)*\.?|[IVX]+\.)\s+[A-Z][A-Za-z\- ]{2,80}|Abstract|Introduction|Related Work|Conclusions?|References|Acknowledgm?ents?)$",
        )
        .expect("heading pattern is valid")
    })
}

/// Split page text into sections at heading-like lines. Falls back to one
/// section per page when no headings are found.
fn split_sections(page_texts: &[(u32, String)]) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in page_texts.iter().flat_map(|(_, text)| text.lines()) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if heading_pattern().is_match(trimmed) {
            if let Some((title, lines)) = current.take() {
                push_section(&mut sections, title, &lines);
            }
            current = Some((trimmed.to_string(), Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(trimmed);
        }
    }
    if let Some((title, lines)) = current {
        push_section(&mut sections, title, &lines);
    }

    if sections.is_empty() {
        sections = page_texts
            .iter()
            .map(|(page, text)| Section {
                title: format!("Page {}", page),
                content: clean_text(text),
            })
            .filter(|s| !s.content.is_empty())
            .collect();
    }

    sections
}

fn push_section(sections: &mut Vec<Section>, title: String, lines: &[&str]) {
    let content = clean_text(&lines.join(" "));
    if !content.is_empty() {
        sections.push(Section { title, content });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a small single-font PDF with one page per entry of `pages`.
    pub(crate) fn sample_pdf(pages: &[&[&str]]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for lines in pages {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
            ];
            for (i, line) in lines.iter().enumerate() {
                let y = 720 - 20 * i as i64;
                operations.push(Operation::new("Td", vec![72.into(), y.into()]));
                operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            }
            operations.push(Operation::new("ET", vec![]));

            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn parser() -> PdfParser {
        PdfParser::new(&PdfParserConfig {
            max_pages: 2,
            max_file_size_mb: 1,
        })
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("\u{FEFF}Hello   World\n\nTest"), "Hello World Test");
    }

    #[test]
    fn test_decode_pdf_string() {
        assert_eq!(decode_pdf_string("Hello\\nWorld"), "Hello\nWorld");
        assert_eq!(decode_pdf_string("Test\\(paren\\)"), "Test(paren)");
    }

    #[test]
    fn test_extract_text_from_content_stream() {
        let content = b"BT\n/F1 12 Tf\n(Hello) Tj\n[(Wor) -20 (ld)] TJ\nET\n";
        assert_eq!(extract_text_from_content(content), "HelloWorld\n");
    }

    #[test]
    fn test_split_sections_on_headings() {
        let pages = vec![(
            1,
            "Abstract\nWe study things.\n1 Introduction\nThings matter.\nA lot.\n\
             References\n[1] Someone."
                .to_string(),
        )];
        let sections = split_sections(&pages);

        let titles: Vec<_> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Abstract", "1 Introduction", "References"]);
        assert_eq!(sections[1].content, "Things matter. A lot.");
    }

    #[test]
    fn test_split_sections_falls_back_to_pages() {
        let pages = vec![(1, "plain text".to_string()), (2, "more text".to_string())];
        let sections = split_sections(&pages);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].title, "Page 2");
    }

    #[tokio::test]
    async fn test_parse_respects_page_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.pdf");
        std::fs::write(
            &path,
            sample_pdf(&[&["Abstract", "First page"], &["Second page"], &["Third page"]]),
        )
        .unwrap();

        let content = parser().parse(&path).await.unwrap();

        assert!(content.raw_text.contains("First page"));
        assert!(content.raw_text.contains("Second page"));
        assert!(!content.raw_text.contains("Third page"));
        assert_eq!(content.parser_used, "lopdf");
        assert_eq!(content.metadata.pages, 3);
        assert_eq!(content.metadata.pages_parsed, 2);
        assert_eq!(content.metadata.sha256.len(), 64);
    }

    #[tokio::test]
    async fn test_parse_rejects_invalid_files() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.pdf");
        assert!(matches!(
            parser().parse(&missing).await,
            Err(IngestionError::PdfValidation { .. })
        ));

        let empty = dir.path().join("empty.pdf");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(
            parser().parse(&empty).await,
            Err(IngestionError::PdfValidation { .. })
        ));

        let html = dir.path().join("html.pdf");
        std::fs::write(&html, b"<html>rate limited</html>").unwrap();
        assert!(matches!(
            parser().parse(&html).await,
            Err(IngestionError::PdfValidation { .. })
        ));

        let too_big = dir.path().join("big.pdf");
        let mut bytes = b"%PDF-1.4\n".to_vec();
        bytes.resize(2 * 1024 * 1024, b' ');
        std::fs::write(&too_big, bytes).unwrap();
        assert!(matches!(
            parser().parse(&too_big).await,
            Err(IngestionError::PdfValidation { .. })
        ));

        let corrupt = dir.path().join("corrupt.pdf");
        std::fs::write(&corrupt, b"%PDF-1.4\ngarbage").unwrap();
        assert!(matches!(
            parser().parse(&corrupt).await,
            Err(IngestionError::PdfParse { .. })
        ));
    }
}
