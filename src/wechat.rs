//! Account listing and article publishing through the WeChat open-API gateway.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::WechatConfig;
use crate::upstream::{UpstreamError, lenient, read_body};

const SERVICE: &str = "wechat gateway";
const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WechatAccount {
    #[serde(deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(deserialize_with = "lenient::text")]
    pub wechat_appid: String,
    #[serde(deserialize_with = "lenient::text")]
    pub username: String,
    #[serde(deserialize_with = "lenient::text")]
    pub avatar: String,
    #[serde(rename = "type", deserialize_with = "lenient::text")]
    pub kind: String,
    #[serde(deserialize_with = "lenient::flag")]
    pub verified: bool,
    #[serde(deserialize_with = "lenient::text")]
    pub status: String,
    #[serde(deserialize_with = "lenient::text")]
    pub last_auth_time: String,
    #[serde(deserialize_with = "lenient::text")]
    pub created_at: String,
}

/// Accounts authorized on the gateway, as listed under `data.accounts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountList {
    #[serde(deserialize_with = "lenient::or_default")]
    pub accounts: Vec<WechatAccount>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccountsReply {
    #[serde(deserialize_with = "lenient::or_default")]
    data: AccountList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    #[serde(default)]
    pub wechat_appid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_type: Option<String>,
}

impl PublishRequest {
    /// Names of required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("wechatAppid", &self.wechat_appid),
            ("title", &self.title),
            ("content", &self.content),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect()
    }

    fn normalized(&self) -> Self {
        Self {
            wechat_appid: self.wechat_appid.trim().to_owned(),
            title: self.title.trim().to_owned(),
            content: self.content.clone(),
            summary: self.summary.clone(),
            cover_image: self.cover_image.clone(),
            author: self.author.clone(),
            content_format: Some(
                self.content_format
                    .clone()
                    .unwrap_or_else(|| "markdown".to_owned()),
            ),
            article_type: Some(self.article_type.clone().unwrap_or_else(|| "news".to_owned())),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishResponse {
    #[serde(deserialize_with = "lenient::flag")]
    pub success: bool,
    #[serde(
        deserialize_with = "lenient::opt_message",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
    #[serde(
        deserialize_with = "lenient::opt_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl PublishResponse {
    pub fn publication_id(&self) -> Option<String> {
        let id = self.data.get("publicationId")?;
        match id {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

fn endpoint(cfg: &WechatConfig, op: &str) -> Result<url::Url, UpstreamError> {
    cfg.base_url
        .join(op)
        .map_err(|source| UpstreamError::endpoint(SERVICE, source))
}

pub async fn list_accounts(
    http: &reqwest::Client,
    cfg: &WechatConfig,
) -> Result<AccountList, UpstreamError> {
    let resp = http
        .post(endpoint(cfg, "wechat-accounts")?)
        .header(API_KEY_HEADER, &cfg.api_key)
        .json(&serde_json::json!({}))
        .send()
        .await
        .map_err(|source| UpstreamError::transport(SERVICE, source))?;
    let body = read_body(SERVICE, resp).await?;
    body.ensure_success(SERVICE)?;
    let reply: AccountsReply = body.json(SERVICE)?;
    tracing::info!(accounts = reply.data.accounts.len(), "wechat accounts synced");
    Ok(reply.data)
}

/// Publishes an article. The gateway signals failure either with a non-2xx
/// status or with `success: false`; both become [`UpstreamError::Rejected`].
pub async fn publish(
    http: &reqwest::Client,
    cfg: &WechatConfig,
    req: &PublishRequest,
) -> Result<PublishResponse, UpstreamError> {
    let payload = req.normalized();
    let resp = http
        .post(endpoint(cfg, "wechat-publish")?)
        .header(API_KEY_HEADER, &cfg.api_key)
        .json(&payload)
        .send()
        .await
        .map_err(|source| UpstreamError::transport(SERVICE, source))?;
    let body = read_body(SERVICE, resp).await?;
    // Error pages without a JSON body still fail on the status below.
    let parsed = if body.status.is_success() {
        body.json::<PublishResponse>(SERVICE)?
    } else {
        body.json::<PublishResponse>(SERVICE).unwrap_or_default()
    };

    if !body.status.is_success() || !parsed.success {
        let message = parsed
            .error
            .clone()
            .unwrap_or_else(|| format!("上游请求失败: {}", body.status));
        tracing::warn!(
            status = %body.status,
            code = parsed.code.as_deref().unwrap_or(""),
            appid = %payload.wechat_appid,
            %message,
            "wechat publish rejected"
        );
        return Err(UpstreamError::Rejected {
            service: SERVICE,
            message,
            code: parsed.code,
        });
    }

    tracing::info!(
        appid = %payload.wechat_appid,
        publication_id = parsed.publication_id().as_deref().unwrap_or(""),
        "article published"
    );
    Ok(parsed)
}
