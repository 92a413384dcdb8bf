use anyhow::{Context, Result};
use url::Url;

use crate::config::AppConfig;
use crate::store::DraftStore;

pub struct AppState {
    pub config: AppConfig,
    pub http: reqwest::Client,
    pub drafts: DraftStore,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("WechatStudio/", env!("CARGO_PKG_VERSION")))
            .timeout(config.upstream_timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            config,
            http,
            drafts: DraftStore::new(),
        })
    }
}

pub fn normalize_origin(url: &Url) -> Result<Url> {
    let origin = url.origin().ascii_serialization();
    Url::parse(&origin).context("failed to normalize origin url")
}
