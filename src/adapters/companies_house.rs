//! Companies House API key setup checks.

use super::http::build_client;
use crate::utils::error::Result;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.company-information.service.gov.uk";
pub const API_KEY_ENV: &str = "CH_API_KEY";
const PLACEHOLDER_KEY: &str = "your_api_key_here";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub checks: Vec<CheckResult>,
}

impl VerifyReport {
    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.checks.len()
    }
}

/// The configured key from an env file, ignoring empty values and the
/// template placeholder.
pub fn read_api_key(env_file: &Path) -> Option<String> {
    dotenvy::from_path_iter(env_file)
        .ok()?
        .filter_map(|item| item.ok())
        .find(|(key, _)| key == API_KEY_ENV)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty() && value != PLACEHOLDER_KEY)
}

/// First characters of a secret, for log lines.
pub fn key_preview(key: &str) -> String {
    let shown: String = key.chars().take(8).collect();
    format!("{}...", shown)
}

pub fn check_env_file(env_file: &Path) -> CheckResult {
    const NAME: &str = "env file";
    if !env_file.exists() {
        return CheckResult::fail(NAME, format!("{} not found, create it with {}=<key>", env_file.display(), API_KEY_ENV));
    }
    match read_api_key(env_file) {
        Some(key) => CheckResult::pass(NAME, format!("API key found ({})", key_preview(&key))),
        None => CheckResult::fail(NAME, format!("{} missing or still a placeholder", API_KEY_ENV)),
    }
}

pub fn check_gitignore(gitignore: &Path, env_file_name: &str) -> CheckResult {
    const NAME: &str = "gitignore";
    match std::fs::read_to_string(gitignore) {
        Ok(content) if content.lines().any(|l| l.trim() == env_file_name || l.trim() == format!("/{}", env_file_name)) => {
            CheckResult::pass(NAME, format!("{} is ignored", env_file_name))
        }
        Ok(_) => CheckResult::fail(NAME, format!("{} is not listed in {}", env_file_name, gitignore.display())),
        Err(_) => CheckResult::fail(NAME, format!("{} not found", gitignore.display())),
    }
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: Option<String>,
}

/// One-result company search against the live API.
pub async fn check_api(api_url: &str, api_key: &str, timeout: Duration) -> Result<CheckResult> {
    const NAME: &str = "API connection";
    let client = build_client("mapprep", timeout)?;
    let response = match client
        .get(format!("{}/search/companies", api_url.trim_end_matches('/')))
        .query(&[("q", "tesco"), ("items_per_page", "1")])
        .basic_auth(api_key, None::<&str>)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return Ok(CheckResult::fail(NAME, format!("connection failed: {}", e))),
    };

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Ok(CheckResult::fail(NAME, "authentication failed, check the API key"));
    }
    if !status.is_success() {
        return Ok(CheckResult::fail(NAME, format!("HTTP error {}", status.as_u16())));
    }

    let results: SearchResults = response.json().await?;
    Ok(match results.items.first() {
        Some(item) => CheckResult::pass(
            NAME,
            format!("API working, first result: {}", item.title.as_deref().unwrap_or("Unknown")),
        ),
        None => CheckResult::fail(NAME, "API returned no results"),
    })
}

pub async fn verify(env_file: &Path, gitignore: &Path, api_url: &str, timeout: Duration) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();
    report.checks.push(check_env_file(env_file));

    let env_name = env_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".env".to_string());
    report.checks.push(check_gitignore(gitignore, &env_name));

    match read_api_key(env_file) {
        Some(key) => report.checks.push(check_api(api_url, &key, timeout).await?),
        None => report
            .checks
            .push(CheckResult::fail("API connection", "skipped, API key not configured")),
    }

    for check in &report.checks {
        if check.passed {
            tracing::info!("✅ {}: {}", check.name, check.detail);
        } else {
            tracing::warn!("❌ {}: {}", check.name, check.detail);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_placeholder_key_rejected() {
        let dir = TempDir::new().unwrap();
        let env = dir.path().join(".env");
        std::fs::write(&env, "OTHER=1\nCH_API_KEY=your_api_key_here\n").unwrap();
        assert!(read_api_key(&env).is_none());
        assert!(!check_env_file(&env).passed);

        std::fs::write(&env, "CH_API_KEY=abcdef123456\n").unwrap();
        assert_eq!(read_api_key(&env).as_deref(), Some("abcdef123456"));
        assert_eq!(check_env_file(&env).detail, "API key found (abcdef12...)");
    }

    #[test]
    fn test_gitignore_check() {
        let dir = TempDir::new().unwrap();
        let gitignore = dir.path().join(".gitignore");
        assert!(!check_gitignore(&gitignore, ".env").passed);
        std::fs::write(&gitignore, "target/\n.env\n").unwrap();
        assert!(check_gitignore(&gitignore, ".env").passed);
        std::fs::write(&gitignore, "target/\n.env.example\n").unwrap();
        assert!(!check_gitignore(&gitignore, ".env").passed);
    }

    #[tokio::test]
    async fn test_verify_against_mock_api() {
        let server = MockServer::start();
        let search = server.mock(|when, then| {
            when.method(GET)
                .path("/search/companies")
                .query_param("q", "tesco")
                .header("Authorization", "Basic a2V5MTIzOg==");
            then.status(200)
                .json_body(json!({"items": [{"title": "TESCO PLC"}]}));
        });

        let dir = TempDir::new().unwrap();
        let env = dir.path().join(".env");
        let gitignore = dir.path().join(".gitignore");
        std::fs::write(&env, "CH_API_KEY=key123\n").unwrap();
        std::fs::write(&gitignore, ".env\n").unwrap();

        let report = verify(&env, &gitignore, &server.base_url(), Duration::from_secs(5))
            .await
            .unwrap();
        search.assert();
        assert!(report.all_passed(), "{:?}", report);
        assert!(report.checks[2].detail.contains("TESCO PLC"));
    }

    #[tokio::test]
    async fn test_unauthorized_key() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/search/companies");
            then.status(401);
        });
        let check = check_api(&server.base_url(), "bad", Duration::from_secs(5)).await.unwrap();
        assert!(!check.passed);
        assert!(check.detail.contains("authentication failed"));
    }
}
