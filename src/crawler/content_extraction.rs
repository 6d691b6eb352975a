//! Content extraction functionality for the crawler module

use std::sync::LazyLock;

use regex::{Captures, Regex};
use scraper::{Html, Selector};
use tracing::warn;

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid script pattern"));

static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("valid style pattern"));

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:nbsp|amp|lt|gt|quot|#39);").expect("valid entity pattern")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Extract the document title
///
/// # Arguments
///
/// * `html` - The HTML of the page
///
/// # Returns
///
/// The trimmed text of the first `<title>` element, if any and non-empty
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let title_selector = match Selector::parse("title") {
        Ok(selector) => selector,
        Err(e) => {
            warn!("Failed to parse title selector: {}", e);
            return None;
        }
    };

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Reduce an HTML document to plain text
///
/// Script and style blocks are dropped, remaining tags become spaces, the
/// entities `&nbsp; &amp; &lt; &gt; &quot; &#39;` are decoded in a single pass
/// and whitespace runs collapse to one space. Any other entity is left as is.
pub fn normalize_text(html: &str) -> String {
    let without_scripts = SCRIPT_BLOCK.replace_all(html, "");
    let without_styles = STYLE_BLOCK.replace_all(&without_scripts, "");
    let without_tags = TAG.replace_all(&without_styles, " ");
    let decoded = ENTITY.replace_all(&without_tags, |caps: &Captures| {
        match &caps[0] {
            "&nbsp;" => " ",
            "&amp;" => "&",
            "&lt;" => "<",
            "&gt;" => ">",
            "&quot;" => "\"",
            _ => "'",
        }
    });
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}
