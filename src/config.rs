use std::{
    env, fmt,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Context, Result};
use url::Url;

use crate::images::{BodyImagePlacement, ImagePool};
use crate::rewrite::RewriteTuning;

const DEFAULT_GLM_ENDPOINT: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";
const DEFAULT_GLM_MODEL: &str = "glm-4.7";
const DEFAULT_DAJIALA_BASE: &str = "https://www.dajiala.com/fbmain/monitor/v3/";
const DEFAULT_WECHAT_OPENAPI_BASE: &str = "https://wx.limyai.com/api/openapi/";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 120;

fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }
    url
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub public_base_url: Url,
    pub static_dir: Option<PathBuf>,
    pub ai: Option<AiConfig>,
    pub dajiala: Option<DajialaConfig>,
    pub wechat: Option<WechatConfig>,
    pub upstream_timeout: Duration,
    pub rewrite: RewriteTuning,
    pub image_pool: ImagePool,
}

/// OpenAI-compatible chat completion endpoint (GLM by default).
#[derive(Clone)]
pub struct AiConfig {
    pub endpoint: Url,
    pub model: String,
    pub api_key: String,
}

#[derive(Clone)]
pub struct DajialaConfig {
    pub base_url: Url,
    pub api_key: String,
}

#[derive(Clone)]
pub struct WechatConfig {
    pub base_url: Url,
    pub api_key: String,
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for DajialaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DajialaConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for WechatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WechatConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("public_base_url", &self.public_base_url)
            .field("static_dir", &self.static_dir)
            .field("ai", &self.ai)
            .field("dajiala", &self.dajiala)
            .field("wechat", &self.wechat)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("rewrite", &self.rewrite)
            .field("image_pool", &self.image_pool.urls().len())
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let bind_addr: SocketAddr = var("WECHAT_STUDIO_BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:58100".to_owned())
            .parse()
            .context("invalid WECHAT_STUDIO_BIND_ADDR (expected ip:port)")?;

        let default_host = match bind_addr.ip() {
            IpAddr::V4(v4) if v4.is_unspecified() => "127.0.0.1".to_owned(),
            IpAddr::V6(v6) if v6.is_unspecified() => "127.0.0.1".to_owned(),
            ip => ip.to_string(),
        };
        let public_base_url = var("WECHAT_STUDIO_PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{}:{}", default_host, bind_addr.port()));
        let public_base_url =
            Url::parse(&public_base_url).context("invalid WECHAT_STUDIO_PUBLIC_BASE_URL")?;

        let ai = var("GLM_API_KEY")
            .map(|api_key| {
                let endpoint =
                    var("GLM_API_BASE").unwrap_or_else(|| DEFAULT_GLM_ENDPOINT.to_owned());
                let endpoint = Url::parse(&endpoint).context("invalid GLM_API_BASE")?;
                let model = var("GLM_MODEL").unwrap_or_else(|| DEFAULT_GLM_MODEL.to_owned());
                Ok::<_, anyhow::Error>(AiConfig {
                    endpoint,
                    model,
                    api_key,
                })
            })
            .transpose()?;

        let dajiala = var("DAJIALA_API_KEY")
            .map(|api_key| {
                let base_url =
                    var("DAJIALA_BASE_URL").unwrap_or_else(|| DEFAULT_DAJIALA_BASE.to_owned());
                let base_url = Url::parse(&base_url).context("invalid DAJIALA_BASE_URL")?;
                Ok::<_, anyhow::Error>(DajialaConfig {
                    base_url: ensure_trailing_slash(base_url),
                    api_key,
                })
            })
            .transpose()?;

        let wechat = var("WECHAT_OPENAPI_KEY")
            .or_else(|| var("WECHAT_ACCOUNTS_API_KEY"))
            .map(|api_key| {
                let base_url = var("WECHAT_OPENAPI_BASE")
                    .unwrap_or_else(|| DEFAULT_WECHAT_OPENAPI_BASE.to_owned());
                let base_url = Url::parse(&base_url).context("invalid WECHAT_OPENAPI_BASE")?;
                Ok::<_, anyhow::Error>(WechatConfig {
                    base_url: ensure_trailing_slash(base_url),
                    api_key,
                })
            })
            .transpose()?;

        let parse_usize = |key: &'static str| {
            var(key)
                .map(|raw| {
                    raw.parse::<usize>()
                        .with_context(|| format!("invalid {key} (expected non-negative integer)"))
                })
                .transpose()
        };

        let upstream_timeout = var("UPSTREAM_TIMEOUT_SECS")
            .map(|raw| {
                raw.parse::<u64>()
                    .context("invalid UPSTREAM_TIMEOUT_SECS (expected seconds)")
            })
            .transpose()?
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS);

        let defaults = RewriteTuning::default();
        let rewrite = RewriteTuning {
            min_visible_chars: parse_usize("REWRITE_MIN_VISIBLE_CHARS")?
                .unwrap_or(defaults.min_visible_chars),
            placement: BodyImagePlacement {
                min_line: parse_usize("REWRITE_BODY_IMAGE_MIN_LINE")?
                    .unwrap_or(defaults.placement.min_line),
                line_span: parse_usize("REWRITE_BODY_IMAGE_LINE_SPAN")?
                    .unwrap_or(defaults.placement.line_span)
                    .max(1),
            },
        };

        let image_pool = match var("REWRITE_IMAGE_POOL") {
            Some(raw) => ImagePool::new(raw.split(',').map(str::to_owned).collect())
                .context("invalid REWRITE_IMAGE_POOL")?,
            None => ImagePool::default(),
        };

        let static_dir = {
            let candidate = PathBuf::from(
                var("WECHAT_STUDIO_STATIC_DIR").unwrap_or_else(|| "web/dist".to_owned()),
            );
            if candidate.exists() {
                Some(candidate)
            } else {
                None
            }
        };

        Ok(Self {
            bind_addr,
            public_base_url,
            static_dir,
            ai,
            dajiala,
            wechat,
            upstream_timeout: Duration::from_secs(upstream_timeout.max(1)),
            rewrite,
            image_pool,
        })
    }
}
