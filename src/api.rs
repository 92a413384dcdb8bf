use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::{Json, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::{DajialaConfig, WechatConfig};
use crate::dajiala::{self, ArticleHtmlResponse, SearchQuery, SearchResponse};
use crate::images::ThreadRandom;
use crate::markdown::{build_newspic_content, extract_summary, first_image, take_chars};
use crate::rewrite::{self, RewriteRequest, RewriteResult};
use crate::store::{DraftItem, PublishOutcome, SaveDraft};
use crate::wechat::{self, AccountList, PublishRequest, PublishResponse};
use crate::{error::ApiError, state::AppState};

const PUBLISH_TITLE_MAX_CHARS: usize = 64;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    ok: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { ok: true, data })
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn dajiala_config(state: &AppState) -> Result<&DajialaConfig, ApiError> {
    state
        .config
        .dajiala
        .as_ref()
        .ok_or_else(|| ApiError::not_configured("缺少 DAJIALA_API_KEY 配置。"))
}

fn wechat_config(state: &AppState) -> Result<&WechatConfig, ApiError> {
    state
        .config
        .wechat
        .as_ref()
        .ok_or_else(|| ApiError::not_configured("缺少 WECHAT_OPENAPI_KEY 配置。"))
}

pub async fn search_articles(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchQuery>, JsonRejection>,
) -> Result<Json<Envelope<SearchResponse>>, ApiError> {
    let query = body(payload)?;
    if query.kw.trim().is_empty() {
        return Err(ApiError::bad_request("关键词不能为空。"));
    }
    let cfg = dajiala_config(&state)?;
    let resp = dajiala::search_articles(&state.http, cfg, &query).await?;
    Ok(ok(resp))
}

#[derive(Debug, Deserialize)]
pub struct ArticleHtmlRequest {
    #[serde(default)]
    url: String,
}

pub async fn article_html(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ArticleHtmlRequest>, JsonRejection>,
) -> Result<Json<Envelope<ArticleHtmlResponse>>, ApiError> {
    let req = body(payload)?;
    let url = req.url.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request("文章链接不能为空。"));
    }
    let cfg = dajiala_config(&state)?;
    let resp = dajiala::fetch_article_html(&state.http, cfg, url).await?;
    Ok(ok(resp))
}

pub async fn rewrite_article(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RewriteRequest>, JsonRejection>,
) -> Result<Json<Envelope<RewriteResult>>, ApiError> {
    let req = body(payload)?;
    let result = rewrite::rewrite_article(
        &state.http,
        state.config.ai.as_ref(),
        state.config.rewrite,
        &state.config.image_pool,
        req,
        &mut ThreadRandom,
    )
    .await?;
    Ok(ok(result))
}

pub async fn sync_wechat_accounts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Envelope<AccountList>>, ApiError> {
    let cfg = wechat_config(&state)?;
    let accounts = wechat::list_accounts(&state.http, cfg).await?;
    Ok(ok(accounts))
}

pub async fn publish_article(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<Json<Envelope<PublishResponse>>, ApiError> {
    let req = body(payload)?;
    let missing = req.missing_fields();
    if !missing.is_empty() {
        return Err(ApiError::bad_request(format!(
            "{} 为必填项。",
            missing.join("、")
        )));
    }
    let cfg = wechat_config(&state)?;
    let resp = wechat::publish(&state.http, cfg, &req).await?;
    Ok(ok(resp))
}

pub async fn list_drafts(State(state): State<Arc<AppState>>) -> Json<Envelope<Vec<DraftItem>>> {
    ok(state.drafts.list().await)
}

pub async fn save_draft(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SaveDraft>, JsonRejection>,
) -> Result<Json<Envelope<DraftItem>>, ApiError> {
    let req = body(payload)?;
    let item = state.drafts.save(req).await?;
    Ok(ok(item))
}

pub async fn delete_draft(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.drafts.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleType {
    #[default]
    News,
    /// Image post: short text followed by a picture list.
    Newspic,
}

impl ArticleType {
    fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Newspic => "newspic",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishDraftRequest {
    #[serde(default)]
    wechat_appid: String,
    #[serde(default)]
    article_type: ArticleType,
    author: Option<String>,
}

fn build_publish_request(draft: &DraftItem, req: &PublishDraftRequest) -> PublishRequest {
    let content = match req.article_type {
        ArticleType::News => draft.content.clone(),
        ArticleType::Newspic => build_newspic_content(&draft.content),
    };
    let summary = Some(extract_summary(&draft.content)).filter(|s| !s.is_empty());
    PublishRequest {
        wechat_appid: req.wechat_appid.trim().to_owned(),
        title: take_chars(&draft.title, PUBLISH_TITLE_MAX_CHARS),
        content,
        summary,
        cover_image: first_image(&draft.content),
        author: req.author.clone().filter(|a| !a.trim().is_empty()),
        content_format: Some("markdown".to_owned()),
        article_type: Some(req.article_type.as_str().to_owned()),
    }
}

/// Publishes a stored draft and records the outcome on it.
pub async fn publish_draft(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<PublishDraftRequest>, JsonRejection>,
) -> Result<Json<Envelope<DraftItem>>, ApiError> {
    let req = body(payload)?;
    if req.wechat_appid.trim().is_empty() {
        return Err(ApiError::bad_request("请先同步并选择公众号账号。"));
    }
    let cfg = wechat_config(&state)?;
    let Some(draft) = state.drafts.get(&id).await else {
        return Err(ApiError::not_found(format!("draft {id} not found")));
    };

    let publish_req = build_publish_request(&draft, &req);
    state
        .drafts
        .record_publish(&id, PublishOutcome::Started)
        .await?;

    match wechat::publish(&state.http, cfg, &publish_req).await {
        Ok(resp) => {
            let item = state
                .drafts
                .record_publish(
                    &id,
                    PublishOutcome::Published {
                        publication_id: resp.publication_id(),
                    },
                )
                .await?;
            Ok(ok(item))
        }
        Err(err) => {
            let error = err.to_string();
            state
                .drafts
                .record_publish(&id, PublishOutcome::Failed { error })
                .await?;
            Err(err.into())
        }
    }
}
