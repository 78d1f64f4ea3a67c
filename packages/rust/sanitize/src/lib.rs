//! Post-processing sanitizer for synthesized content.
//!
//! Providers are instructed to return bare article HTML, but in practice
//! they emit full-document wrappers, leftover template placeholders, and
//! home-grown promotional blocks. Every cleanup is a function
//! `&str -> String` applied in sequence at one well-defined point in the
//! pipeline (after synthesis, before the content is considered terminal).
//!
//! The whole pipeline is idempotent: running it on already-sanitized
//! content is a no-op, so re-runs of the synthesis stage can re-sanitize
//! stored content without degrading it.

use std::sync::LazyLock;

use regex::Regex;

/// Class name of the one promotional block allowed in final content.
pub const CANONICAL_OFFER_CLASS: &str = "offer-box";

/// Run the full sanitization pipeline on synthesized content.
pub fn sanitize(content: &str, subject: &str) -> String {
    let mut result = content.to_string();

    result = strip_document_wrapper(&result);
    result = substitute_placeholders(&result, subject);
    result = strip_disallowed_promos(&result);
    result = normalize_markup(&result);
    result = normalize_whitespace(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Strip document-wrapper markup
// ---------------------------------------------------------------------------

static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body[^>]*>(.*?)</body>").expect("valid regex"));
static WRAPPER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!doctype[^>]*>|</?html[^>]*>|<head[^>]*>.*?</head>|</?body[^>]*>|<meta[^>]*>|<title[^>]*>.*?</title>")
        .expect("valid regex")
});

/// Remove full-document boilerplate a provider emitted despite instructions.
///
/// If a `<body>` block is present its inner content becomes the article;
/// any remaining wrapper tags are stripped afterwards.
fn strip_document_wrapper(content: &str) -> String {
    let inner = match BODY_RE.captures(content) {
        Some(caps) => caps[1].to_string(),
        None => content.to_string(),
    };

    WRAPPER_RE.replace_all(&inner, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Substitute unresolved template placeholders
// ---------------------------------------------------------------------------

static TITLE_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(?i:title|subject|keyword)\s*\}\}").expect("valid regex"));
static STRAY_BRACES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{[^}]*\}\}").expect("valid regex"));

/// Replace title-style placeholders with the actual subject and drop any
/// other unresolved `{{... }}` templates entirely.
fn substitute_placeholders(content: &str, subject: &str) -> String {
    let result = TITLE_PLACEHOLDER_RE.replace_all(content, subject);
    STRAY_BRACES_RE.replace_all(&result, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Strip disallowed promotional-section variants
// ---------------------------------------------------------------------------

static SPONSORED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<(div|section)[^>]*(?:sponsored|monetization-box|ad-unit)[^>]*>.*?</(?:div|section)>"#)
        .expect("valid regex")
});

/// Remove promotional blocks that are not the canonical offer block.
///
/// The synthesis prompt requests exactly one block shape
/// (`class="offer-box"`); anything a provider invented on its own
/// (sponsored sections, legacy monetization boxes, ad units) is cut.
fn strip_disallowed_promos(content: &str) -> String {
    SPONSORED_RE.replace_all(content, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Normalize residual lightweight markup
// ---------------------------------------------------------------------------

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.+?)\s*$").expect("valid regex"));
static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").expect("valid regex"));

/// Convert any Markdown remnants to the canonical HTML markup.
fn normalize_markup(content: &str) -> String {
    let result = HEADING_RE.replace_all(content, |caps: &regex::Captures| {
        let level = match caps[1].len() {
            1 => 1,
            2 => 2,
            _ => 3,
        };
        format!("<h{level}>{}</h{level}>", &caps[2])
    });

    BOLD_RE.replace_all(&result, "<strong>$1</strong>").to_string()
}

// ---------------------------------------------------------------------------
// Pass 5: Normalize whitespace
// ---------------------------------------------------------------------------

static MULTI_BLANK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Trim line trailing whitespace, collapse blank-line runs, trim the ends.
fn normalize_whitespace(content: &str) -> String {
    let trimmed_lines = content
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    MULTI_BLANK_RE
        .replace_all(&trimmed_lines, "\n\n")
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SUBJECT: &str = "nursing license reciprocity texas";

    #[test]
    fn strips_full_document_wrapper() {
        let input = "<!DOCTYPE html>\n<html lang=\"en\">\n<head><title>Gen</title>\
                     <meta charset=\"utf-8\"></head>\n<body class=\"article\">\
                     <h1>The Guide</h1><p>Content.</p></body>\n</html>";
        let result = sanitize(input, SUBJECT);
        assert_eq!(result, "<h1>The Guide</h1><p>Content.</p>");
    }

    #[test]
    fn strips_wrapper_without_body_block() {
        let input = "<html><h2>Loose</h2><meta name=\"viewport\" content=\"x\"><p>Text</p></html>";
        let result = sanitize(input, SUBJECT);
        assert!(!result.contains("<html"));
        assert!(!result.contains("<meta"));
        assert!(result.contains("<h2>Loose</h2>"));
        assert!(result.contains("<p>Text</p>"));
    }

    #[test]
    fn substitutes_title_placeholders_with_subject() {
        let input = "<h1>{{TITLE}}</h1><p>All about {{ title }}.</p>";
        let result = sanitize(input, SUBJECT);
        assert_eq!(
            result,
            format!("<h1>{SUBJECT}</h1><p>All about {SUBJECT}.</p>")
        );
    }

    #[test]
    fn drops_unknown_placeholders() {
        let input = "<p>See {{RELATED_LINKS}} for more.</p>";
        let result = sanitize(input, SUBJECT);
        assert_eq!(result, "<p>See  for more.</p>");
    }

    #[test]
    fn removes_sponsored_variants_keeps_canonical_offer() {
        let input = "<p>Intro</p>\
             <div class=\"sponsored-banner\"><a href=\"#\">Buy pills</a></div>\
             <div class=\"offer-box\"><a href=\"/reports/x\">Get the report</a></div>\
             <section data-kind=\"monetization-box\"><p>legacy block</p></section>\
             <p>Outro</p>";
        let result = sanitize(input, SUBJECT);
        assert!(!result.contains("sponsored-banner"));
        assert!(!result.contains("legacy block"));
        assert!(result.contains("offer-box"));
        assert!(result.contains("Get the report"));
    }

    #[test]
    fn normalizes_markdown_remnants() {
        let input = "# Big Title\n\n## Fees\n\nThe fee is **$350** flat.\n\n#### Deep note";
        let result = sanitize(input, SUBJECT);
        assert!(result.contains("<h1>Big Title</h1>"));
        assert!(result.contains("<h2>Fees</h2>"));
        assert!(result.contains("<strong>$350</strong>"));
        assert!(result.contains("<h3>Deep note</h3>"));
        assert!(!result.contains("**"));
        assert!(!result.contains("\n# "));
    }

    #[test]
    fn collapses_blank_line_runs() {
        let input = "<p>a</p>\n\n\n\n\n<p>b</p>   \n";
        let result = sanitize(input, SUBJECT);
        assert_eq!(result, "<p>a</p>\n\n<p>b</p>");
    }

    #[test]
    fn clean_input_is_untouched() {
        let input = "<h1>Title</h1>\n\n<p>Plain paragraph with <strong>bold</strong>.</p>";
        assert_eq!(sanitize(input, SUBJECT), input);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            // Already clean
            "<h2>Clean</h2><p>Nothing to do.</p>".to_string(),
            // Residual wrapper markup
            "<!DOCTYPE html><html><head><title>t</title></head><body><p>Wrapped</p></body></html>"
                .to_string(),
            // Placeholders + markdown + promo variant, combined
            format!(
                "## {{{{TITLE}}}}\n\n\n<div class=\"sponsored\">junk</div>\n\
                 Pay **attention** to {{{{PDF_LINK}}}} here."
            ),
            // Empty input
            String::new(),
        ];

        for input in inputs {
            let once = sanitize(&input, SUBJECT);
            let twice = sanitize(&once, SUBJECT);
            assert_eq!(once, twice, "sanitize not idempotent for {input:?}");
        }
    }
}
