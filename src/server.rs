use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::{delete, get, post},
};
use serde_json::json;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::info;

use crate::api;
use crate::config::AppConfig;
use crate::state::{self, AppState};

pub async fn serve(config: AppConfig) -> Result<()> {
    info!(
        ai = config.ai.is_some(),
        search = config.dajiala.is_some(),
        wechat = config.wechat.is_some(),
        "integrations configured"
    );

    let addr: SocketAddr = config.bind_addr;
    let app_state = Arc::new(AppState::new(config)?);
    let app = build_router(app_state)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;

    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server exited")?;

    Ok(())
}

pub fn build_router(app_state: Arc<AppState>) -> Result<Router> {
    let config = app_state.config.clone();

    let api_router = Router::new()
        .route("/health", get(api_health))
        .route("/analysis", post(api::search_articles))
        .route("/article-html", post(api::article_html))
        .route("/rewrite", post(api::rewrite_article))
        .route("/wechat-accounts", post(api::sync_wechat_accounts))
        .route("/wechat-publish", post(api::publish_article))
        .route("/drafts", get(api::list_drafts).post(api::save_draft))
        .route("/drafts/{id}", delete(api::delete_draft))
        .route("/drafts/{id}/publish", post(api::publish_draft));

    let mut app = Router::new()
        .nest("/api", api_router)
        .with_state(app_state);

    if let Some(static_dir) = config.static_dir.clone() {
        let index = static_dir.join("index.html");
        app = app
            .fallback_service(ServeDir::new(static_dir).not_found_service(ServeFile::new(index)));
    }

    let cors_origin = state::normalize_origin(&config.public_base_url)?;
    let cors_origin: HeaderValue = cors_origin
        .as_str()
        .trim_end_matches('/')
        .parse()
        .context("invalid cors origin")?;

    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Ok(app.layer(cors).layer(TraceLayer::new_for_http()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

async fn api_health() -> axum::Json<serde_json::Value> {
    axum::Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
