//! Reduces email HTML to compact plain text for the extraction prompt.

use regex::Regex;
use std::sync::LazyLock;

static RE_SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static RE_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static RE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Default body budget in characters.
pub const DEFAULT_MAX_BODY_CHARS: usize = 8000;
const MAX_SUBJECT_CHARS: usize = 500;
const MAX_SNIPPET_CHARS: usize = 1000;

/// Removes scripts, styles, comments and tags, decodes the common
/// entities and collapses whitespace.
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let text = RE_SCRIPT.replace_all(html, "");
    let text = RE_STYLE.replace_all(&text, "");
    let text = RE_COMMENT.replace_all(&text, "");
    let text = RE_TAG.replace_all(&text, " ");

    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'");

    RE_WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Truncates to `max_chars` characters and appends `...`.
///
/// When a space falls in the last 20% of the kept text the cut moves back
/// to it so no word is split.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let truncated = &text[..cut];

    if let Some(space) = truncated.rfind(' ') {
        let space_chars = truncated[..space].chars().count();
        if space_chars * 5 > max_chars * 4 {
            return format!("{}...", &truncated[..space]);
        }
    }

    format!("{}...", truncated)
}

fn take_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Cleaned email fields ready for the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedEmail {
    pub subject: String,
    pub snippet: String,
    pub body: String,
}

impl CleanedEmail {
    /// The body, or the snippet when the body is empty.
    pub fn text_to_scan(&self) -> &str {
        if self.body.is_empty() {
            &self.snippet
        } else {
            &self.body
        }
    }
}

pub fn clean_email_for_ai(
    subject: &str,
    snippet: &str,
    body: &str,
    max_body_chars: usize,
) -> CleanedEmail {
    CleanedEmail {
        subject: take_chars(&strip_html(subject), MAX_SUBJECT_CHARS),
        snippet: take_chars(&strip_html(snippet), MAX_SNIPPET_CHARS),
        body: truncate_text(&strip_html(body), max_body_chars),
    }
}
