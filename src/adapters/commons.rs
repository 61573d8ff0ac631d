//! Wikimedia Commons media search.

use super::http::{build_client, ensure_success};
use crate::utils::error::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://commons.wikimedia.org/w/api.php";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommonsImage {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ImageInfoResponse {
    #[serde(default)]
    query: Option<ImageInfoQuery>,
}

#[derive(Debug, Deserialize)]
struct ImageInfoQuery {
    #[serde(default)]
    pages: BTreeMap<String, ImagePage>,
}

#[derive(Debug, Deserialize)]
struct ImagePage {
    #[serde(default)]
    imageinfo: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    url: Option<String>,
}

pub struct CommonsClient {
    client: Client,
    api_url: String,
}

impl CommonsClient {
    pub fn new(api_url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(user_agent, timeout)?,
            api_url: api_url.into(),
        })
    }

    /// File titles in namespace 6 matching the query.
    pub async fn search_titles(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let srsearch = format!("{} incategory:File", query);
        let limit = limit.to_string();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", srsearch.as_str()),
                ("srnamespace", "6"),
                ("srlimit", limit.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?;
        let body: SearchResponse = ensure_success(response).await?.json().await?;
        Ok(body
            .query
            .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
            .unwrap_or_default())
    }

    pub async fn image_url(&self, title: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("titles", title),
                ("prop", "imageinfo"),
                ("iiprop", "url|extmetadata"),
                ("format", "json"),
            ])
            .send()
            .await?;
        let body: ImageInfoResponse = ensure_success(response).await?.json().await?;
        Ok(body.query.and_then(|q| {
            q.pages
                .into_values()
                .find_map(|page| page.imageinfo.into_iter().next().and_then(|info| info.url))
        }))
    }

    /// Search followed by one image-info lookup per hit. Hits without a URL
    /// are left out.
    pub async fn search_images(&self, query: &str, limit: usize) -> Result<Vec<CommonsImage>> {
        let titles = self.search_titles(query, limit).await?;
        tracing::debug!("{} titles for '{}'", titles.len(), query);

        let mut images = Vec::with_capacity(titles.len());
        for title in titles {
            match self.image_url(&title).await? {
                Some(url) => images.push(CommonsImage { title, url }),
                None => tracing::debug!("No image info for {}", title),
            }
        }
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_search_images() {
        let server = MockServer::start();
        let search = server.mock(|when, then| {
            when.method(GET)
                .path("/w/api.php")
                .query_param("list", "search")
                .query_param("srsearch", "tram incategory:File")
                .query_param("srnamespace", "6");
            then.status(200).json_body(json!({
                "query": {"search": [{"title": "File:Tram.jpg"}, {"title": "File:Gone.jpg"}]}
            }));
        });
        let tram = server.mock(|when, then| {
            when.method(GET)
                .path("/w/api.php")
                .query_param("titles", "File:Tram.jpg");
            then.status(200).json_body(json!({
                "query": {"pages": {"12": {"imageinfo": [{"url": "https://upload.example/Tram.jpg"}]}}}
            }));
        });
        let gone = server.mock(|when, then| {
            when.method(GET)
                .path("/w/api.php")
                .query_param("titles", "File:Gone.jpg");
            then.status(200).json_body(json!({"query": {"pages": {"-1": {"missing": ""}}}}));
        });

        let client = CommonsClient::new(server.url("/w/api.php"), "mapprep-test", Duration::from_secs(5)).unwrap();
        let images = client.search_images("tram", 10).await.unwrap();

        search.assert();
        tram.assert();
        gone.assert();
        assert_eq!(
            images,
            vec![CommonsImage {
                title: "File:Tram.jpg".into(),
                url: "https://upload.example/Tram.jpg".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_no_results() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/w/api.php");
            then.status(200).json_body(json!({"batchcomplete": ""}));
        });
        let client = CommonsClient::new(server.url("/w/api.php"), "mapprep-test", Duration::from_secs(5)).unwrap();
        assert!(client.search_images("nothing", 5).await.unwrap().is_empty());
    }
}
