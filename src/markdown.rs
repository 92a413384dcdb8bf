use std::sync::OnceLock;

use regex::Regex;

const SUMMARY_MAX_CHARS: usize = 120;
const NEWSPIC_MAX_TEXT_CHARS: usize = 1_000;
const NEWSPIC_MAX_IMAGES: usize = 20;

static CODE_FENCE_RE: OnceLock<Regex> = OnceLock::new();
static IMAGE_RE: OnceLock<Regex> = OnceLock::new();
static LINK_RE: OnceLock<Regex> = OnceLock::new();
static PUNCT_RE: OnceLock<Regex> = OnceLock::new();
static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

fn code_fence_re() -> &'static Regex {
    CODE_FENCE_RE.get_or_init(|| Regex::new(r"(?s)```.*?```").expect("valid code fence regex"))
}

/// Markdown image syntax: `![alt](url)`. The url is capture group 1.
pub(crate) fn image_re() -> &'static Regex {
    IMAGE_RE.get_or_init(|| Regex::new(r"!\[[^\]]*\]\(([^)]+)\)").expect("valid image regex"))
}

fn link_re() -> &'static Regex {
    LINK_RE.get_or_init(|| Regex::new(r"\[[^\]]*\]\([^)]+\)").expect("valid link regex"))
}

fn punct_re() -> &'static Regex {
    PUNCT_RE.get_or_init(|| Regex::new(r"[#>*_`~\-]").expect("valid punctuation regex"))
}

fn whitespace_re() -> &'static Regex {
    WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

fn strip_syntax(markdown: &str) -> String {
    let out = code_fence_re().replace_all(markdown, "");
    let out = image_re().replace_all(&out, "");
    let out = link_re().replace_all(&out, "");
    punct_re().replace_all(&out, "").into_owned()
}

/// Number of characters a reader actually sees: code fences, images, links,
/// structural punctuation and whitespace do not count.
pub fn visible_length(markdown: &str) -> usize {
    let stripped = strip_syntax(markdown);
    stripped.chars().filter(|c| !c.is_whitespace()).count()
}

/// Plain-text rendition of `markdown` with whitespace runs collapsed.
pub fn strip_markdown(markdown: &str) -> String {
    let stripped = strip_syntax(markdown);
    whitespace_re()
        .replace_all(&stripped, " ")
        .trim()
        .to_owned()
}

pub fn count_images(markdown: &str) -> usize {
    image_re().find_iter(markdown).count()
}

/// Image urls in document order.
pub fn extract_images(markdown: &str) -> Vec<String> {
    image_re()
        .captures_iter(markdown)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_owned())
        .filter(|url| !url.is_empty())
        .collect()
}

pub fn first_image(markdown: &str) -> Option<String> {
    extract_images(markdown).into_iter().next()
}

pub fn extract_summary(markdown: &str) -> String {
    take_chars(&strip_markdown(markdown), SUMMARY_MAX_CHARS)
}

/// Body for the gateway's image-post ("newspic") article type: a text block
/// followed by one image per line.
pub fn build_newspic_content(markdown: &str) -> String {
    let text = take_chars(&strip_markdown(markdown), NEWSPIC_MAX_TEXT_CHARS);
    let image_block = extract_images(markdown)
        .into_iter()
        .take(NEWSPIC_MAX_IMAGES)
        .enumerate()
        .map(|(idx, url)| format!("![图片{}]({url})", idx + 1))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{text}\n\n{image_block}").trim().to_owned()
}

pub(crate) fn take_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
