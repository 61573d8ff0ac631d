//! Local dev server: static files plus an authenticated Companies House proxy
//! under `/ch/`.

use super::companies_house::{key_preview, DEFAULT_API_URL};
use super::http::build_client;
use crate::utils::error::{PrepError, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{ACCEPT, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub port: u16,
    pub static_dir: String,
    pub upstream_base: String,
    pub timeout_seconds: u64,
    pub env_file: String,
    pub json_logs: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            port: 8000,
            static_dir: ".".into(),
            upstream_base: DEFAULT_API_URL.into(),
            timeout_seconds: 30,
            env_file: ".env".into(),
            json_logs: false,
        }
    }
}

pub struct ProxyState {
    client: Client,
    upstream_base: String,
    api_key: Option<String>,
}

impl ProxyState {
    pub fn new(upstream_base: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client("mapprep-dev-server", timeout)?,
            upstream_base: upstream_base.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }
}

fn cors_json(status: StatusCode, content_type: HeaderValue, body: impl IntoResponse) -> Response {
    (
        status,
        [
            (CONTENT_TYPE, content_type),
            (ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
        ],
        body,
    )
        .into_response()
}

fn json_error(status: StatusCode, body: serde_json::Value) -> Response {
    cors_json(status, HeaderValue::from_static("application/json"), body.to_string())
}

async fn proxy_ch(State(state): State<Arc<ProxyState>>, uri: Uri) -> Response {
    let Some(api_key) = state.api_key.as_deref() else {
        tracing::error!("❌ CH_API_KEY not found in environment");
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "CH_API_KEY env var not set"}),
        );
    };

    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let upstream_path = path_and_query.strip_prefix("/ch").unwrap_or(path_and_query);
    let url = format!("{}{}", state.upstream_base, upstream_path);
    tracing::info!("Proxying: {} -> {}", path_and_query, url);

    match forward(&state.client, &url, api_key).await {
        Ok((status, content_type, body)) => {
            if status.is_success() {
                tracing::info!("✅ Proxy success: {}", status.as_u16());
            } else {
                tracing::warn!("Upstream HTTP error {}", status.as_u16());
            }
            cors_json(status, content_type, body)
        }
        Err(e) => {
            tracing::error!("❌ Proxy error: {}", e);
            json_error(
                StatusCode::BAD_GATEWAY,
                json!({"error": "Upstream failed", "detail": e.to_string()}),
            )
        }
    }
}

/// Upstream status, content type and body. Error statuses are answered as
/// JSON regardless of what upstream declared.
async fn forward(
    client: &Client,
    url: &str,
    api_key: &str,
) -> std::result::Result<(StatusCode, HeaderValue, Bytes), reqwest::Error> {
    let upstream = client
        .get(url)
        .basic_auth(api_key, None::<&str>)
        .header(ACCEPT, "application/json")
        .send()
        .await?;

    let status = upstream.status();
    let json = HeaderValue::from_static("application/json");
    let content_type = if status.is_success() {
        upstream.headers().get(CONTENT_TYPE).cloned().unwrap_or(json)
    } else {
        json
    };
    let body = upstream.bytes().await?;
    Ok((status, content_type, body))
}

pub fn router(state: Arc<ProxyState>, static_dir: &Path) -> Router {
    Router::new()
        .route("/ch/", get(proxy_ch))
        .route("/ch/*rest", get(proxy_ch))
        .with_state(state)
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(settings: &ProxySettings, api_key: Option<String>) -> Result<()> {
    match api_key.as_deref() {
        Some(key) => tracing::info!("✅ CH_API_KEY loaded: {}", key_preview(key)),
        None => tracing::warn!("⚠️ CH_API_KEY not set, /ch/ requests will fail with 500"),
    }

    let state = ProxyState::new(
        &settings.upstream_base,
        api_key,
        Duration::from_secs(settings.timeout_seconds),
    )?;
    let app = router(Arc::new(state), Path::new(&settings.static_dir));

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🚀 Dev server running on http://localhost:{}", settings.port);
    tracing::info!("Proxy: /ch/* -> {}", settings.upstream_base);

    axum::serve(listener, app)
        .await
        .map_err(|e| PrepError::processing(format!("server stopped: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_treated_as_missing() {
        let state = ProxyState::new("http://upstream/", Some("  ".into()), Duration::from_secs(1)).unwrap();
        assert!(state.api_key.is_none());
        assert_eq!(state.upstream_base, "http://upstream");
    }

    #[test]
    fn test_default_settings() {
        let settings = ProxySettings::default();
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.upstream_base, "https://api.company-information.service.gov.uk");
        assert_eq!(settings.timeout_seconds, 30);
    }
}
