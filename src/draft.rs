use std::future::Future;

use serde_json::Value;

use crate::markdown::visible_length;

pub const UNTITLED: &str = "未命名文章";

/// Best-effort structured reading of a model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDraft {
    pub title: Option<String>,
    pub markdown: Option<String>,
}

/// Reads `{"title": .., "markdown": ..}` out of a model reply. Anything that
/// does not start with `{` is rejected without a parse attempt; fields of the
/// wrong type are treated as absent.
pub fn try_parse_draft(raw: &str) -> Option<ParsedDraft> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let obj = value.as_object()?;
    let field = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_owned);
    Some(ParsedDraft {
        title: field("title"),
        markdown: field("markdown"),
    })
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Title and Markdown body for a model reply, falling back to the raw text
/// as the body and to `fallback_title` (then [`UNTITLED`]) as the title.
pub fn resolve_draft(raw: &str, fallback_title: Option<&str>) -> (String, String) {
    let parsed = try_parse_draft(raw).unwrap_or_default();
    let title = non_blank(parsed.title.as_deref())
        .or_else(|| non_blank(fallback_title))
        .unwrap_or(UNTITLED)
        .to_owned();
    let markdown = non_blank(parsed.markdown.as_deref())
        .unwrap_or(raw)
        .trim()
        .to_owned();
    (title, markdown)
}

/// Asks `expand` for a longer version when `markdown` is shorter than
/// `threshold` visible characters.
///
/// `expand` runs at most once. A blank reply or an error keeps the original
/// draft; errors are logged and never returned.
pub async fn ensure_minimum_length<F, Fut, E>(markdown: String, threshold: usize, expand: F) -> String
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<Option<String>, E>>,
    E: std::fmt::Display,
{
    let before = visible_length(&markdown);
    if before >= threshold {
        return markdown;
    }

    match expand(markdown.clone()).await {
        Ok(Some(expanded)) if !expanded.trim().is_empty() => {
            let expanded = expanded.trim().to_owned();
            let after = visible_length(&expanded);
            if after < threshold {
                tracing::info!(before, after, threshold, "expanded draft is still short");
            } else {
                tracing::debug!(before, after, "draft expanded");
            }
            expanded
        }
        Ok(_) => {
            tracing::warn!(before, threshold, "draft expansion returned nothing");
            markdown
        }
        Err(err) => {
            tracing::warn!(error = %err, before, threshold, "draft expansion failed");
            markdown
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;

    use super::*;

    #[test]
    fn parses_json_draft() {
        assert_eq!(
            try_parse_draft(r#"{"title":"T","markdown":"M"}"#),
            Some(ParsedDraft {
                title: Some("T".to_owned()),
                markdown: Some("M".to_owned()),
            })
        );
    }

    #[test]
    fn rejects_prose_and_broken_json() {
        assert_eq!(try_parse_draft("plain text"), None);
        assert_eq!(try_parse_draft("{not json"), None);
        assert_eq!(try_parse_draft("```json\n{\"title\":\"T\"}\n```"), None);
    }

    #[test]
    fn wrong_field_types_are_absent() {
        assert_eq!(
            try_parse_draft(r#" {"title": 3, "markdown": "body"} "#),
            Some(ParsedDraft {
                title: None,
                markdown: Some("body".to_owned()),
            })
        );
    }

    #[test]
    fn resolve_prefers_parsed_fields() {
        let (title, md) = resolve_draft(r#"{"title":" 新标题 ","markdown":"\n# 正文\n"}"#, Some("原标题"));
        assert_eq!(title, "新标题");
        assert_eq!(md, "# 正文");
    }

    #[test]
    fn resolve_falls_back_to_raw_text_and_source_title() {
        let (title, md) = resolve_draft("  # 纯文本\n正文  ", Some("天气"));
        assert_eq!(title, "天气");
        assert_eq!(md, "# 纯文本\n正文");
    }

    #[test]
    fn resolve_uses_raw_text_when_markdown_missing() {
        let raw = r#"{"title":"T"}"#;
        let (title, md) = resolve_draft(raw, None);
        assert_eq!(title, "T");
        assert_eq!(md, raw);
    }

    #[test]
    fn resolve_defaults_title() {
        let (title, _) = resolve_draft("正文", Some("   "));
        assert_eq!(title, UNTITLED);
    }

    #[tokio::test]
    async fn long_draft_skips_expansion() {
        let calls = AtomicUsize::new(0);
        let md = "字".repeat(1000);
        let out = ensure_minimum_length(md.clone(), 1000, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(Some("never".to_owned())) }
        })
        .await;
        assert_eq!(out, md);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_draft_is_replaced_by_expansion() {
        let calls = AtomicUsize::new(0);
        let out = ensure_minimum_length("短文".to_owned(), 1000, |text| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(text, "短文");
            async { Ok::<_, anyhow::Error>(Some("  更长的正文  ".to_owned())) }
        })
        .await;
        assert_eq!(out, "更长的正文");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_expansion_keeps_original() {
        let out = ensure_minimum_length("短文".to_owned(), 1000, |_| async {
            Err::<Option<String>, _>(anyhow!("connection reset"))
        })
        .await;
        assert_eq!(out, "短文");
    }

    #[tokio::test]
    async fn blank_expansion_keeps_original() {
        let out = ensure_minimum_length("短文".to_owned(), 1000, |_| async {
            Ok::<_, anyhow::Error>(Some(" \n ".to_owned()))
        })
        .await;
        assert_eq!(out, "短文");

        let out = ensure_minimum_length("短文".to_owned(), 1000, |_| async {
            Ok::<Option<String>, anyhow::Error>(None)
        })
        .await;
        assert_eq!(out, "短文");
    }
}
