//! HTML article field extraction
//!
//! Extracts the fields an RSS entry page exposes: Open Graph title and cover
//! image, document language, and body text assembled from paragraph tags.
//! Short paragraphs (20 characters or fewer) are treated as navigation noise
//! and discarded; the body is capped at 80 paragraphs.

use lazy_static::lazy_static;
use scraper::{Html, Selector};

use crate::utils::error::ParseError;

/// Paragraphs at or below this length are discarded as boilerplate
const MIN_PARAGRAPH_CHARS: usize = 20;

/// Maximum paragraphs kept per page
const MAX_PARAGRAPHS: usize = 80;

// Helper macro to parse selectors safely at startup
macro_rules! parse_selector {
    ($s:expr) => {
        Selector::parse($s).expect(concat!("Invalid CSS selector: ", $s))
    };
}

lazy_static! {
    static ref OG_TITLE: Selector = parse_selector!(r#"meta[property="og:title"]"#);
    static ref OG_IMAGE: Selector = parse_selector!(r#"meta[property="og:image"]"#);
    static ref HTML_TAG: Selector = parse_selector!("html");
    static ref TITLE_TAG: Selector = parse_selector!("title");
    static ref PARAGRAPH: Selector = parse_selector!("p");
}

/// Fields extracted from one article page
#[derive(Debug, Clone, Default)]
pub struct ArticleFields {
    pub title: String,
    pub body: String,
    pub language: Option<String>,
    pub cover_image_url: Option<String>,
}

/// Extract title, body, language, and cover image from an article page.
///
/// # Errors
/// Returns `ParseError::TitleNotFound` when neither `og:title` nor a
/// `<title>` tag is present, and `ParseError::BodyNotFound` when no
/// paragraph survives the length filter.
pub fn extract_article_fields(html: &str) -> Result<ArticleFields, ParseError> {
    let document = Html::parse_document(html);

    let title = extract_title(&document).ok_or(ParseError::TitleNotFound)?;
    let body = extract_body(&document).ok_or(ParseError::BodyNotFound)?;

    Ok(ArticleFields {
        title,
        body,
        language: extract_language(&document),
        cover_image_url: extract_cover_image(&document),
    })
}

/// og:title with a plain `<title>` fallback
fn extract_title(document: &Html) -> Option<String> {
    if let Some(meta) = document.select(&OG_TITLE).next() {
        if let Some(content) = meta.value().attr("content") {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }

    document
        .select(&TITLE_TAG)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Paragraph text joined by newlines, short paragraphs dropped
fn extract_body(document: &Html) -> Option<String> {
    let paragraphs: Vec<String> = document
        .select(&PARAGRAPH)
        .map(|p| {
            p.text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|text| text.chars().count() > MIN_PARAGRAPH_CHARS)
        .take(MAX_PARAGRAPHS)
        .collect();

    if paragraphs.is_empty() {
        None
    } else {
        Some(paragraphs.join("\n"))
    }
}

/// `lang` attribute of the root element, primary subtag only
fn extract_language(document: &Html) -> Option<String> {
    document
        .select(&HTML_TAG)
        .next()
        .and_then(|html| html.value().attr("lang"))
        .map(|lang| {
            lang.split(['-', '_'])
                .next()
                .unwrap_or(lang)
                .to_lowercase()
        })
        .filter(|lang| !lang.is_empty())
}

fn extract_cover_image(document: &Html) -> Option<String> {
    document
        .select(&OG_IMAGE)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(head: &str, body: &str) -> String {
        format!("<html lang=\"en-US\"><head>{head}</head><body>{body}</body></html>")
    }

    #[test]
    fn test_extracts_og_fields() {
        let html = page(
            r#"<meta property="og:title" content="Summit Concludes" />
               <meta property="og:image" content="https://cdn.example.com/a.jpg" />"#,
            "<p>A long opening paragraph describing the diplomatic summit.</p>",
        );
        let fields = extract_article_fields(&html).unwrap();
        assert_eq!(fields.title, "Summit Concludes");
        assert_eq!(
            fields.cover_image_url.as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
        assert_eq!(fields.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_title_tag_fallback() {
        let html = page(
            "<title>Fallback Headline</title>",
            "<p>Long enough paragraph to count as real article body text.</p>",
        );
        let fields = extract_article_fields(&html).unwrap();
        assert_eq!(fields.title, "Fallback Headline");
    }

    #[test]
    fn test_missing_title_is_error() {
        let html = page("", "<p>Long enough paragraph to count as body content here.</p>");
        assert!(matches!(
            extract_article_fields(&html),
            Err(ParseError::TitleNotFound)
        ));
    }

    #[test]
    fn test_short_paragraphs_discarded() {
        let html = page(
            "<title>T</title>",
            "<p>Menu</p><p>Login</p><p>This paragraph is comfortably long enough to keep.</p>",
        );
        let fields = extract_article_fields(&html).unwrap();
        assert_eq!(
            fields.body,
            "This paragraph is comfortably long enough to keep."
        );
    }

    #[test]
    fn test_all_short_paragraphs_is_body_error() {
        let html = page("<title>T</title>", "<p>Menu</p><p>Login</p>");
        assert!(matches!(
            extract_article_fields(&html),
            Err(ParseError::BodyNotFound)
        ));
    }

    #[test]
    fn test_paragraph_cap() {
        let many: String = (0..120)
            .map(|i| format!("<p>Paragraph number {i} padded out well past the minimum.</p>"))
            .collect();
        let html = page("<title>T</title>", &many);
        let fields = extract_article_fields(&html).unwrap();
        assert_eq!(fields.body.lines().count(), 80);
    }

    #[test]
    fn test_whitespace_normalized_within_paragraph() {
        let html = page(
            "<title>T</title>",
            "<p>Spread   across\n\n   multiple lines of raw   markup text.</p>",
        );
        let fields = extract_article_fields(&html).unwrap();
        assert_eq!(fields.body, "Spread across multiple lines of raw markup text.");
    }
}
