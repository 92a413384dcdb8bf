//! Keyword search and article HTML from the dajiala WeChat article index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::DajialaConfig;
use crate::upstream::{UpstreamError, lenient, read_body};

const SERVICE: &str = "dajiala";

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub kw: String,
    pub sort_type: Option<i64>,
    pub mode: Option<i64>,
    pub period: Option<i64>,
    pub page: Option<i64>,
    pub any_kw: Option<String>,
    pub ex_kw: Option<String>,
    pub verifycode: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SearchPayload<'a> {
    kw: &'a str,
    sort_type: i64,
    mode: i64,
    period: i64,
    page: i64,
    key: &'a str,
    any_kw: &'a str,
    ex_kw: &'a str,
    verifycode: &'a str,
    #[serde(rename = "type")]
    kind: i64,
}

impl<'a> SearchPayload<'a> {
    fn new(query: &'a SearchQuery, key: &'a str) -> Self {
        Self {
            kw: query.kw.trim(),
            sort_type: query.sort_type.unwrap_or(1),
            mode: query.mode.unwrap_or(1),
            period: query.period.unwrap_or(7),
            page: query.page.unwrap_or(1),
            key,
            any_kw: query.any_kw.as_deref().unwrap_or(""),
            ex_kw: query.ex_kw.as_deref().unwrap_or(""),
            verifycode: query.verifycode.as_deref().unwrap_or(""),
            kind: query.kind.unwrap_or(1),
        }
    }
}

#[derive(Debug, Serialize)]
struct ArticleHtmlPayload<'a> {
    url: &'a str,
    key: &'a str,
    verifycode: &'a str,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    #[serde(deserialize_with = "lenient::int")]
    pub code: i64,
    #[serde(deserialize_with = "lenient::float")]
    pub cost_money: f64,
    #[serde(deserialize_with = "lenient::text")]
    pub cut_words: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub data: Vec<SearchArticle>,
    #[serde(deserialize_with = "lenient::int")]
    pub data_number: i64,
    #[serde(deserialize_with = "lenient::text")]
    pub msg: String,
    #[serde(deserialize_with = "lenient::int")]
    pub page: i64,
    #[serde(deserialize_with = "lenient::float")]
    pub remain_money: f64,
    #[serde(deserialize_with = "lenient::int")]
    pub total: i64,
    #[serde(deserialize_with = "lenient::int")]
    pub total_page: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchArticle {
    #[serde(deserialize_with = "lenient::text")]
    pub avatar: String,
    #[serde(deserialize_with = "lenient::text")]
    pub classify: String,
    #[serde(deserialize_with = "lenient::text")]
    pub content: String,
    #[serde(deserialize_with = "lenient::text")]
    pub ghid: String,
    #[serde(deserialize_with = "lenient::text")]
    pub ip_wording: String,
    #[serde(deserialize_with = "lenient::int")]
    pub is_original: i64,
    #[serde(deserialize_with = "lenient::int")]
    pub looking: i64,
    #[serde(deserialize_with = "lenient::int")]
    pub praise: i64,
    #[serde(deserialize_with = "lenient::int")]
    pub publish_time: i64,
    #[serde(deserialize_with = "lenient::text")]
    pub publish_time_str: String,
    #[serde(deserialize_with = "lenient::int")]
    pub read: i64,
    #[serde(deserialize_with = "lenient::text")]
    pub short_link: String,
    #[serde(deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(deserialize_with = "lenient::int")]
    pub update_time: i64,
    #[serde(deserialize_with = "lenient::text")]
    pub update_time_str: String,
    #[serde(deserialize_with = "lenient::text")]
    pub url: String,
    #[serde(deserialize_with = "lenient::text")]
    pub wx_id: String,
    #[serde(deserialize_with = "lenient::text")]
    pub wx_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleHtmlResponse {
    #[serde(deserialize_with = "lenient::int")]
    pub code: i64,
    #[serde(deserialize_with = "lenient::float")]
    pub cost_money: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub data: ArticleHtml,
    #[serde(deserialize_with = "lenient::text")]
    pub msk: String,
    #[serde(deserialize_with = "lenient::float")]
    pub remain_money: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleHtml {
    #[serde(deserialize_with = "lenient::text")]
    pub article_url: String,
    #[serde(deserialize_with = "lenient::text")]
    pub author: String,
    #[serde(deserialize_with = "lenient::text")]
    pub biz: String,
    #[serde(deserialize_with = "lenient::int")]
    pub copyright: i64,
    #[serde(deserialize_with = "lenient::text")]
    pub cover_url: String,
    #[serde(deserialize_with = "lenient::text")]
    pub desc: String,
    #[serde(deserialize_with = "lenient::text")]
    pub gh_id: String,
    #[serde(deserialize_with = "lenient::text")]
    pub html: String,
    #[serde(deserialize_with = "lenient::text")]
    pub mp_head_img: String,
    #[serde(deserialize_with = "lenient::text")]
    pub nickname: String,
    #[serde(deserialize_with = "lenient::int")]
    pub post_time: i64,
    #[serde(deserialize_with = "lenient::text")]
    pub post_time_str: String,
    #[serde(deserialize_with = "lenient::text")]
    pub signature: String,
    #[serde(deserialize_with = "lenient::text")]
    pub source_url: String,
    #[serde(deserialize_with = "lenient::text")]
    pub title: String,
    #[serde(deserialize_with = "lenient::text")]
    pub wxid: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

async fn post_json<B, T>(
    http: &reqwest::Client,
    cfg: &DajialaConfig,
    op: &str,
    payload: &B,
) -> Result<T, UpstreamError>
where
    B: Serialize + ?Sized,
    T: serde::de::DeserializeOwned,
{
    let url = cfg
        .base_url
        .join(op)
        .map_err(|source| UpstreamError::endpoint(SERVICE, source))?;

    let resp = http
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(|source| UpstreamError::transport(SERVICE, source))?;
    let body = read_body(SERVICE, resp).await?;
    body.ensure_success(SERVICE)?;
    body.json(SERVICE)
}

pub async fn search_articles(
    http: &reqwest::Client,
    cfg: &DajialaConfig,
    query: &SearchQuery,
) -> Result<SearchResponse, UpstreamError> {
    let payload = SearchPayload::new(query, &cfg.api_key);
    let resp: SearchResponse = post_json(http, cfg, "kw_search", &payload).await?;
    tracing::debug!(
        kw = payload.kw,
        code = resp.code,
        total = resp.total,
        returned = resp.data.len(),
        "keyword search completed"
    );
    Ok(resp)
}

pub async fn fetch_article_html(
    http: &reqwest::Client,
    cfg: &DajialaConfig,
    url: &str,
) -> Result<ArticleHtmlResponse, UpstreamError> {
    let payload = ArticleHtmlPayload {
        url: url.trim(),
        key: &cfg.api_key,
        verifycode: "",
    };
    post_json(http, cfg, "article_html", &payload).await
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(server: &MockServer) -> DajialaConfig {
        DajialaConfig {
            base_url: Url::parse(&format!("{}/fbmain/monitor/v3/", server.uri())).unwrap(),
            api_key: "dj-key".to_owned(),
        }
    }

    fn query(kw: &str) -> SearchQuery {
        serde_json::from_value(json!({ "kw": kw })).unwrap()
    }

    #[tokio::test]
    async fn search_fills_provider_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fbmain/monitor/v3/kw_search"))
            .and(body_json(json!({
                "kw": "露营",
                "sort_type": 1,
                "mode": 1,
                "period": 7,
                "page": 1,
                "key": "dj-key",
                "any_kw": "",
                "ex_kw": "",
                "verifycode": "",
                "type": 1
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "ok",
                "total": 1,
                "data": [{"title": "露营指南", "url": "https://mp.weixin.qq.com/s/x", "read": 10001, "new_field": true}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let resp = search_articles(&http, &config(&server), &query(" 露营 "))
            .await
            .unwrap();
        assert_eq!(resp.total, 1);
        assert_eq!(resp.data[0].title, "露营指南");
        assert_eq!(resp.data[0].read, 10001);
        assert_eq!(resp.data[0].extra.get("new_field"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn search_reports_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = search_articles(&http, &config(&server), &query("x"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "上游请求失败: 503 Service Unavailable");
    }

    #[tokio::test]
    async fn search_keeps_provider_error_with_null_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fbmain/monitor/v3/kw_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 20001,
                "msg": "余额不足",
                "data": null,
                "remain_money": null
            })))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let resp = search_articles(&http, &config(&server), &query("露营"))
            .await
            .unwrap();
        assert_eq!(resp.code, 20001);
        assert_eq!(resp.msg, "余额不足");
        assert!(resp.data.is_empty());
        assert_eq!(resp.remain_money, 0.0);
    }

    #[tokio::test]
    async fn search_tolerates_stringly_numbers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": "0",
                "total": "2",
                "cost_money": "0.08",
                "data": [{"title": 7, "read": "10万+", "praise": null, "publish_time": "1700000000"}]
            })))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let resp = search_articles(&http, &config(&server), &query("x"))
            .await
            .unwrap();
        assert_eq!(resp.code, 0);
        assert_eq!(resp.total, 2);
        assert!((resp.cost_money - 0.08).abs() < f64::EPSILON);
        let article = &resp.data[0];
        assert_eq!(article.title, "7");
        assert_eq!(article.read, 0);
        assert_eq!(article.praise, 0);
        assert_eq!(article.publish_time, 1_700_000_000);
    }

    #[tokio::test]
    async fn article_html_with_null_data_keeps_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 101,
                "msk": "文章已删除",
                "data": null
            })))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let resp = fetch_article_html(&http, &config(&server), "u")
            .await
            .unwrap();
        assert_eq!(resp.code, 101);
        assert_eq!(resp.msk, "文章已删除");
        assert!(resp.data.html.is_empty());
    }

    #[tokio::test]
    async fn article_html_reads_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fbmain/monitor/v3/article_html"))
            .and(body_json(json!({
                "url": "https://mp.weixin.qq.com/s/x",
                "key": "dj-key",
                "verifycode": ""
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": {
                    "title": "原文",
                    "html": "<p>正文</p>",
                    "cover_url": "http://cover"
                }
            })))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let resp = fetch_article_html(&http, &config(&server), "https://mp.weixin.qq.com/s/x")
            .await
            .unwrap();
        assert_eq!(resp.data.html, "<p>正文</p>");
        assert_eq!(resp.data.cover_url, "http://cover");
    }

    #[tokio::test]
    async fn article_html_rejects_non_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("error page"))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = fetch_article_html(&http, &config(&server), "u")
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::NonJson { .. }));
    }
}
