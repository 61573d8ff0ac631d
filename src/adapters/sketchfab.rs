//! Sketchfab model search, collection listing and GLB downloads.

use super::http::{build_client, ensure_success};
use crate::utils::error::{PrepError, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.sketchfab.com/v3";
pub const TOKEN_ENV: &str = "SKETCHFAB_API_TOKEN";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelSummary {
    pub uid: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    results: Vec<ModelSummary>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadInfo {
    glb: Option<DownloadLink>,
}

#[derive(Debug, Deserialize)]
struct DownloadLink {
    url: String,
}

/// Keeps alphanumerics, spaces, `_` and `-`, then trims.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .collect::<String>()
        .trim()
        .to_string()
}

pub struct SketchfabClient {
    client: Client,
    /// Unauthenticated client for the signed GLB URLs.
    download_client: Client,
    api_url: String,
    delay: Duration,
}

impl SketchfabClient {
    pub fn new(
        api_url: impl Into<String>,
        token: &str,
        user_agent: &str,
        timeout: Duration,
        delay: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Token {}", token))
            .map_err(|e| PrepError::config(format!("invalid API token: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            download_client: build_client(user_agent, timeout)?,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            delay,
        })
    }

    pub async fn search(&self, query: &str, count: usize) -> Result<Vec<ModelSummary>> {
        let count = count.to_string();
        let response = self
            .client
            .get(format!("{}/search", self.api_url))
            .query(&[
                ("q", query),
                ("type", "models"),
                ("downloadable", "true"),
                ("count", count.as_str()),
            ])
            .send()
            .await?;
        let page: Page = ensure_success(response).await?.json().await?;
        Ok(page.results)
    }

    /// All models of a collection, following `next` links. A failing page
    /// ends the listing with what was collected so far.
    pub async fn collection_models(&self, collection_uid: &str) -> Result<Vec<ModelSummary>> {
        let mut models = Vec::new();
        let mut next = Some(format!("{}/collections/{}/models", self.api_url, collection_uid));

        while let Some(url) = next.take() {
            let response = self.client.get(&url).send().await?;
            let page: Page = match ensure_success(response).await {
                Ok(response) => response.json().await?,
                Err(e) => {
                    tracing::warn!("⚠️ Failed to fetch collection page {}: {}", url, e);
                    break;
                }
            };
            models.extend(page.results);
            next = page.next.filter(|n| !n.is_empty());
        }
        Ok(models)
    }

    /// GLB URL of a model, or `None` when the model is not downloadable.
    pub async fn download_url(&self, uid: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(format!("{}/models/{}/download", self.api_url, uid))
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Ok(None);
        }
        let info: DownloadInfo = response.json().await?;
        Ok(info.glb.map(|g| g.url))
    }

    /// Downloads each model's GLB to `<sanitized name>_<uid>.glb`, pausing
    /// between downloads. Non-downloadable models are skipped.
    pub async fn download_models(&self, models: &[ModelSummary], out_dir: &Path) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(out_dir).await?;
        let mut written = Vec::new();

        for model in models {
            let Some(url) = self.download_url(&model.uid).await? else {
                tracing::info!("Skipping {} (not downloadable)", model.name);
                continue;
            };
            tracing::info!("📥 Downloading: {}", model.name);
            let response = ensure_success(self.download_client.get(&url).send().await?).await?;
            let bytes = response.bytes().await?;

            let path = out_dir.join(format!("{}_{}.glb", sanitize_name(&model.name), model.uid));
            tokio::fs::write(&path, &bytes).await?;
            written.push(path);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
        Ok(written)
    }
}
