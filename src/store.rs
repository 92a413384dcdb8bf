//! Process-local draft storage. Last writer wins; nothing survives a restart.

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::draft::UNTITLED;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    #[default]
    Draft,
    Ready,
    Publishing,
    Published,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftItem {
    pub id: String,
    pub title: String,
    pub content: String,
    pub status: DraftStatus,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDraft {
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub status: Option<DraftStatus>,
    pub source_title: Option<String>,
    pub source_url: Option<String>,
}

/// Outcome of a publish attempt, applied to a stored draft.
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    Started,
    Published { publication_id: Option<String> },
    Failed { error: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("请先生成或填写正文内容再保存。")]
    EmptyContent,
    #[error("draft {0} not found")]
    NotFound(String),
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Default)]
pub struct DraftStore {
    items: RwLock<HashMap<String, DraftItem>>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest first.
    pub async fn list(&self) -> Vec<DraftItem> {
        let guard = self.items.read().await;
        let mut items = guard.values().cloned().collect::<Vec<_>>();
        items.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        items
    }

    pub async fn get(&self, id: &str) -> Option<DraftItem> {
        self.items.read().await.get(id).cloned()
    }

    /// Inserts or overwrites a draft. Publish bookkeeping of an existing
    /// draft is kept unless the status is reset.
    pub async fn save(&self, req: SaveDraft) -> Result<DraftItem, StoreError> {
        let content = req.content.trim().to_owned();
        if content.is_empty() {
            return Err(StoreError::EmptyContent);
        }
        let title = non_blank(Some(req.title)).unwrap_or_else(|| UNTITLED.to_owned());
        let id = non_blank(req.id).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut guard = self.items.write().await;
        let previous = guard.get(&id);
        let status = req
            .status
            .or_else(|| previous.map(|p| p.status))
            .unwrap_or_default();
        let keep_history = previous.is_some_and(|p| p.status == status);
        let item = DraftItem {
            id: id.clone(),
            title,
            content,
            status,
            updated_at: now_rfc3339(),
            source_title: non_blank(req.source_title)
                .or_else(|| previous.and_then(|p| p.source_title.clone())),
            source_url: non_blank(req.source_url)
                .or_else(|| previous.and_then(|p| p.source_url.clone())),
            last_error: previous
                .filter(|_| keep_history)
                .and_then(|p| p.last_error.clone()),
            publication_id: previous
                .filter(|_| keep_history)
                .and_then(|p| p.publication_id.clone()),
        };
        guard.insert(id, item.clone());
        tracing::debug!(id = %item.id, status = ?item.status, "draft saved");
        Ok(item)
    }

    pub async fn remove(&self, id: &str) -> Result<DraftItem, StoreError> {
        self.items
            .write()
            .await
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }

    pub async fn record_publish(
        &self,
        id: &str,
        outcome: PublishOutcome,
    ) -> Result<DraftItem, StoreError> {
        let mut guard = self.items.write().await;
        let item = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        match outcome {
            PublishOutcome::Started => {
                item.status = DraftStatus::Publishing;
                item.last_error = None;
            }
            PublishOutcome::Published { publication_id } => {
                item.status = DraftStatus::Published;
                item.last_error = None;
                item.publication_id = publication_id;
            }
            PublishOutcome::Failed { error } => {
                item.status = DraftStatus::Failed;
                item.last_error = Some(error);
            }
        }
        item.updated_at = now_rfc3339();
        Ok(item.clone())
    }
}
