use serde::{Deserialize, Serialize};

use crate::ai;
use crate::config::AiConfig;
use crate::draft::{ensure_minimum_length, resolve_draft};
use crate::images::{BodyImagePlacement, ImagePool, RandomSource, inject_images};
use crate::markdown::visible_length;
use crate::upstream::UpstreamError;

const EDITOR_PERSONA: &str =
    "你是微信公众号资深编辑，擅长把原文改写成结构清晰、可直接发布的公众号文章。";
const REWRITE_TEMPERATURE: f32 = 0.7;
const EXPAND_TEMPERATURE: f32 = 0.5;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteResult {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteTuning {
    /// Drafts below this many visible characters get one expansion pass.
    pub min_visible_chars: usize,
    pub placement: BodyImagePlacement,
}

impl Default for RewriteTuning {
    fn default() -> Self {
        Self {
            min_visible_chars: 1_000,
            placement: BodyImagePlacement::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("正文内容不能为空。")]
    EmptyHtml,
    #[error("缺少 GLM_API_KEY 配置。")]
    NotConfigured,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

fn or_none(value: Option<&str>) -> &str {
    value.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("无")
}

fn build_rewrite_prompt(req: &RewriteRequest, min_chars: usize) -> String {
    format!(
        "请根据提供的原文内容改写为新的公众号文章。\n\
         要求：\n\
         1) 输出 JSON，包含 title 和 markdown 两个字段。\n\
         2) markdown 使用公众号常见排版模板：\n   \
            - # 标题\n   \
            - > 导语（2-3 句）\n   \
            - ## 小标题（3-5 段）\n   \
            - 要点清单（项目符号）\n   \
            - 适用人群/注意事项\n   \
            - 小结收束\n\
         3) 在 markdown 中安排 {{{{IMAGE_1}}}} 与 {{{{IMAGE_2}}}} 两个图片占位符，用于插图位置。\n\
         4) 正文不少于 {min_chars} 字（不包含空格/标点）。\n\
         5) 文章语言为简体中文，逻辑清晰、段落分明、可读性强。\n\
         6) 不要堆砌营销话术，不要添加未给出的事实，保持与原文一致的核心信息。\n\
         7) 标题需改写为更适合公众号的表达，但不夸大。\n\n\
         原文标题：{title}\n\
         原文链接：{source}\n\
         原文 HTML：\n{html}\n",
        title = or_none(req.title.as_deref()),
        source = or_none(req.source_url.as_deref()),
        html = req.html,
    )
}

fn build_expand_prompt(markdown: &str, min_chars: usize) -> String {
    format!(
        "请将下面的公众号文章在不新增事实的前提下扩写到 {min_chars} 字以上，\
         保持原有结构和语气，输出 Markdown 正文即可，不要输出 JSON：\n\n{markdown}\n"
    )
}

/// Rewrites a source article into a publishable draft.
///
/// One chat call produces the draft; a second one is made only when the
/// draft is shorter than [`RewriteTuning::min_visible_chars`]. Images are
/// placed after expansion so they land in the final text.
pub async fn rewrite_article<R>(
    http: &reqwest::Client,
    ai: Option<&AiConfig>,
    tuning: RewriteTuning,
    pool: &ImagePool,
    req: RewriteRequest,
    rng: &mut R,
) -> Result<RewriteResult, RewriteError>
where
    R: RandomSource + Send,
{
    if req.html.trim().is_empty() {
        return Err(RewriteError::EmptyHtml);
    }
    let Some(ai) = ai else {
        return Err(RewriteError::NotConfigured);
    };

    let prompt = build_rewrite_prompt(&req, tuning.min_visible_chars);
    let raw = ai::chat_completion(http, ai, EDITOR_PERSONA, &prompt, REWRITE_TEMPERATURE).await?;

    let (title, markdown) = resolve_draft(&raw, req.title.as_deref());
    tracing::info!(
        title = %title,
        visible = visible_length(&markdown),
        threshold = tuning.min_visible_chars,
        "draft rewritten"
    );

    let min_chars = tuning.min_visible_chars;
    let markdown = ensure_minimum_length(markdown, min_chars, |current| async move {
        let prompt = build_expand_prompt(&current, min_chars);
        ai::chat_completion(http, ai, EDITOR_PERSONA, &prompt, EXPAND_TEMPERATURE)
            .await
            .map(Some)
    })
    .await;

    let content = inject_images(
        &markdown,
        req.cover_url.as_deref(),
        pool,
        tuning.placement,
        rng,
    );

    Ok(RewriteResult { title, content })
}
