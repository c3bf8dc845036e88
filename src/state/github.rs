use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{StateStore, StoreError};

/// GitHub Actions repository variables as a key/value store.
///
/// Used by scheduled-workflow deployments where every tick is a fresh process
/// and the repository variable is the only thing that carries over.
#[derive(Clone)]
pub struct GithubVariables {
    http: Client,
    api_url: String,
    repo: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct Variable {
    value: String,
}

impl GithubVariables {
    pub fn new(api_url: &str, repo: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(GithubVariables {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
        })
    }

    fn variables_url(&self) -> String {
        format!("{}/repos/{}/actions/variables", self.api_url, self.repo)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn create(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let resp = self
            .request(reqwest::Method::POST, &self.variables_url())
            .json(&serde_json::json!({ "name": key, "value": value }))
            .send()
            .await?;
        check_status(resp).await?;
        info!("Created repository variable {}", key);
        Ok(())
    }
}

#[async_trait]
impl StateStore for GithubVariables {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let url = format!("{}/{}", self.variables_url(), key);
        debug!("Reading repository variable {}", key);

        let resp = self.request(reqwest::Method::GET, &url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp).await?;
        let var: Variable = resp.json().await?;
        Ok(Some(var.value))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.variables_url(), key);
        let resp = self
            .request(reqwest::Method::PATCH, &url)
            .json(&serde_json::json!({ "name": key, "value": value }))
            .send()
            .await?;

        // PATCH only updates; the first write of a fresh repository has to create it.
        if resp.status() == StatusCode::NOT_FOUND {
            return self.create(key, value).await;
        }
        check_status(resp).await?;
        debug!("Updated repository variable {}", key);
        Ok(())
    }

    fn name(&self) -> &str {
        "github-variables"
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Status { status, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn store(server: &mockito::ServerGuard) -> GithubVariables {
        GithubVariables::new(&server.url(), "owner/repo", "secret", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn reads_variable_value() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/owner/repo/actions/variables/NEXT_MATCH_INFO")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body(r#"{"name":"NEXT_MATCH_INFO","value":"{\"idEvent\":\"1\"}"}"#)
            .create_async()
            .await;

        let value = store(&server).read("NEXT_MATCH_INFO").await.unwrap();
        assert_eq!(value.as_deref(), Some(r#"{"idEvent":"1"}"#));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_variable_reads_as_absent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/owner/repo/actions/variables/NEXT_MATCH_INFO")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;

        assert!(store(&server).read("NEXT_MATCH_INFO").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_updates_existing_variable() {
        let mut server = mockito::Server::new_async().await;
        let patch = server
            .mock("PATCH", "/repos/owner/repo/actions/variables/NEXT_MATCH_INFO")
            .match_body(Matcher::Json(serde_json::json!({
                "name": "NEXT_MATCH_INFO",
                "value": "{}",
            })))
            .with_status(204)
            .create_async()
            .await;

        store(&server).write("NEXT_MATCH_INFO", "{}").await.unwrap();
        patch.assert_async().await;
    }

    #[tokio::test]
    async fn write_creates_variable_on_first_use() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PATCH", "/repos/owner/repo/actions/variables/NEXT_MATCH_INFO")
            .with_status(404)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/repos/owner/repo/actions/variables")
            .match_body(Matcher::PartialJson(serde_json::json!({ "name": "NEXT_MATCH_INFO" })))
            .with_status(201)
            .create_async()
            .await;

        store(&server).write("NEXT_MATCH_INFO", "{}").await.unwrap();
        create.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_write_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PATCH", "/repos/owner/repo/actions/variables/NEXT_MATCH_INFO")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = store(&server).write("NEXT_MATCH_INFO", "{}").await.unwrap_err();
        match err {
            StoreError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
