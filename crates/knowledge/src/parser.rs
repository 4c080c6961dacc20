//! Source file parsing and text extraction.

use ragent_core::{AppError, AppResult};
use std::path::Path;

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Html,
    Pdf,
    Code,
    PlainText,
    Unknown,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            Some("pdf") => Self::Pdf,
            Some("rs") | Some("py") | Some("js") | Some("ts") | Some("go") | Some("c")
            | Some("cpp") | Some("java") | Some("sh") | Some("yaml") | Some("yml")
            | Some("json") | Some("toml") => Self::Code,
            Some("txt") | Some("rst") => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Code => "code",
            Self::PlainText => "text",
            Self::Unknown => "unknown",
        }
    }
}

/// Text extracted from a source file.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub content_type: ContentType,
    pub text: String,
}

/// Extract indexable text from raw file contents.
///
/// Code is kept verbatim since comments often carry the answer. PDFs
/// contribute their text layer; everything else must be UTF-8.
pub fn parse_contents(path: &Path, raw: &[u8]) -> AppResult<ParsedDocument> {
    let content_type = ContentType::from_path(path);

    let text = match content_type {
        ContentType::Pdf => extract_pdf_text(path, raw)?,
        ContentType::Markdown => clean_markdown(as_utf8(path, raw)?),
        ContentType::Html => clean_html(as_utf8(path, raw)?),
        ContentType::Code | ContentType::PlainText => as_utf8(path, raw)?.trim().to_string(),
        ContentType::Unknown => {
            let text = as_utf8(path, raw)?;
            if text.contains('\0') {
                return Err(AppError::Knowledge(format!(
                    "Binary file not supported: {:?}",
                    path
                )));
            }
            text.trim().to_string()
        }
    };

    Ok(ParsedDocument { content_type, text })
}

fn as_utf8<'a>(path: &Path, raw: &'a [u8]) -> AppResult<&'a str> {
    std::str::from_utf8(raw)
        .map_err(|_| AppError::Knowledge(format!("Not valid UTF-8: {:?}", path)))
}

/// Pull the text layer out of a PDF, one page at a time. Pages that fail
/// to decode are skipped; a PDF with no text at all is an error.
fn extract_pdf_text(path: &Path, raw: &[u8]) -> AppResult<String> {
    let doc = lopdf::Document::load_mem(raw)
        .map_err(|e| AppError::Knowledge(format!("Failed to load PDF {:?}: {}", path, e)))?;

    let page_numbers: Vec<u32> = doc.get_pages().into_keys().collect();
    tracing::debug!(
        "Extracting text from {} PDF pages of {:?}",
        page_numbers.len(),
        path
    );

    let mut pages = Vec::with_capacity(page_numbers.len());
    for page in page_numbers {
        match doc.extract_text(&[page]) {
            Ok(text) => {
                let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !text.is_empty() {
                    pages.push(text);
                }
            }
            Err(e) => tracing::warn!("Skipping page {} of {:?}: {}", page, path, e),
        }
    }

    if pages.is_empty() {
        return Err(AppError::Knowledge(format!(
            "No text content extracted from PDF: {:?}",
            path
        )));
    }

    Ok(pages.join("\n\n"))
}

/// Drop fences, rules and heading markers, keep the prose.
fn clean_markdown(text: &str) -> String {
    text.lines()
        .map(|line| line.trim_start_matches('#').trim())
        .filter(|line| {
            !line.is_empty()
                && !line.starts_with("---")
                && !line.starts_with("```")
                && !line.starts_with("~~~")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip tags, scripts and styles, then collapse whitespace.
fn clean_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut skipping: Option<&'static str> = None;

    for (i, ch) in text.char_indices() {
        let rest = &text[i..];

        if let Some(closing) = skipping {
            if starts_with_ignore_case(rest, closing) {
                skipping = None;
                in_tag = true;
            }
            continue;
        }

        match ch {
            '<' => {
                in_tag = true;
                if starts_with_ignore_case(rest, "<script") {
                    skipping = Some("</script");
                } else if starts_with_ignore_case(rest, "<style") {
                    skipping = Some("</style");
                }
            }
            '>' if in_tag => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack
        .get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}
