//! JSON:API client for the hosted review service

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use vizreg_core::{sha256_hex, ApiError, Resource, Result, SnapshotOptions, VizregConfig, VizregError};

use crate::api::{ApiResult, BuildResponse, ReviewApi, SnapshotResponse};

/// Review service reached over HTTPS with a bearer-style token
#[derive(Debug, Clone)]
pub struct HttpReviewApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpReviewApi {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| VizregError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Requires a token, normally from `VIZREG_TOKEN`
    pub fn from_config(config: &VizregConfig, user_agent: &str) -> Result<Self> {
        let token = config.token.clone().ok_or_else(|| {
            VizregError::Config(format!(
                "{} is required to talk to the review service",
                vizreg_core::config::TOKEN_ENV
            ))
        })?;
        Self::new(
            config.api.url.clone(),
            token,
            user_agent,
            Duration::from_secs(config.api.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, body: Value) -> ApiResult<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Token token={}", self.token))
            .header("Content-Type", "application/vnd.api+json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&url, e))?;

        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), "POST", &url, text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("POST {}: {}", url, e)))
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Timeout(format!("{}: {}", url, e))
    } else {
        ApiError::ConnectionFailed(format!("{}: {}", url, e))
    }
}

/// JSON:API resource objects for a resource list
fn resource_objects(resources: &[Resource]) -> Vec<Value> {
    resources
        .iter()
        .map(|resource| {
            let descriptor = resource.descriptor();
            let mut attributes = json!({
                "resource-url": descriptor.resource_url,
                "is-root": descriptor.is_root,
            });
            if let Some(mimetype) = descriptor.mimetype {
                attributes["mimetype"] = json!(mimetype);
            }
            json!({
                "type": "resources",
                "id": descriptor.id,
                "attributes": attributes,
            })
        })
        .collect()
}

fn data_id(body: &Value) -> ApiResult<String> {
    body.pointer("/data/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ApiError::InvalidResponse("response has no data.id".to_string()))
}

/// Missing hashes from `relationships`, or the older `links` linkage
pub fn missing_resource_ids(body: &Value) -> Vec<String> {
    let entries = body
        .pointer("/data/relationships/missing-resources/data")
        .or_else(|| body.pointer("/data/links/missing-resources/linkage"))
        .and_then(Value::as_array);

    entries
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl ReviewApi for HttpReviewApi {
    async fn create_build(&self, repo_slug: &str, resources: &[Resource]) -> ApiResult<BuildResponse> {
        let mut data = json!({ "type": "builds", "attributes": {} });
        if !resources.is_empty() {
            data["relationships"] = json!({
                "resources": { "data": resource_objects(resources) }
            });
        }

        let body = self
            .post(&format!("repos/{}/builds/", repo_slug), json!({ "data": data }))
            .await?;

        Ok(BuildResponse {
            id: data_id(&body)?,
            missing_resource_ids: missing_resource_ids(&body),
            web_url: body
                .pointer("/data/attributes/web-url")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    async fn finalize_build(&self, build_id: &str) -> ApiResult<()> {
        self.post(&format!("builds/{}/finalize", build_id), json!({}))
            .await?;
        Ok(())
    }

    async fn create_snapshot(
        &self,
        build_id: &str,
        resources: &[Resource],
        options: &SnapshotOptions,
    ) -> ApiResult<SnapshotResponse> {
        let attributes = serde_json::to_value(options)
            .map_err(|e| ApiError::InvalidResponse(format!("unserializable options: {}", e)))?;

        let body = self
            .post(
                &format!("builds/{}/snapshots/", build_id),
                json!({
                    "data": {
                        "type": "snapshots",
                        "attributes": attributes,
                        "relationships": {
                            "resources": { "data": resource_objects(resources) }
                        }
                    }
                }),
            )
            .await?;

        Ok(SnapshotResponse {
            id: data_id(&body)?,
            missing_resource_ids: missing_resource_ids(&body),
        })
    }

    async fn upload_resource(&self, build_id: &str, content: &[u8]) -> ApiResult<()> {
        self.post(
            &format!("builds/{}/resources/", build_id),
            json!({
                "data": {
                    "type": "resources",
                    "id": sha256_hex(content),
                    "attributes": { "base64-content": BASE64.encode(content) }
                }
            }),
        )
        .await?;
        Ok(())
    }

    async fn finalize_snapshot(&self, snapshot_id: &str) -> ApiResult<()> {
        self.post(&format!("snapshots/{}/finalize", snapshot_id), json!({}))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_from_relationships() {
        let body = json!({
            "data": {
                "id": "123",
                "relationships": {
                    "missing-resources": { "data": [{ "type": "resources", "id": "abc" }] }
                }
            }
        });
        assert_eq!(missing_resource_ids(&body), vec!["abc"]);
    }

    #[test]
    fn test_missing_from_legacy_links() {
        let body = json!({
            "data": {
                "id": "123",
                "links": { "missing-resources": { "linkage": [{ "id": "def" }, { "id": "ghi" }] } }
            }
        });
        assert_eq!(missing_resource_ids(&body), vec!["def", "ghi"]);
    }

    #[test]
    fn test_missing_absent() {
        assert!(missing_resource_ids(&json!({ "data": { "id": "1" } })).is_empty());
    }

    #[test]
    fn test_resource_objects() {
        let root = Resource::root_html("/", "<html></html>");
        let css = Resource::from_content("/a.css", "a").with_mimetype("text/css");
        let objects = resource_objects(&[root.clone(), css]);

        assert_eq!(objects[0]["type"], "resources");
        assert_eq!(objects[0]["id"], root.sha());
        assert_eq!(objects[0]["attributes"]["is-root"], true);
        assert_eq!(objects[1]["attributes"]["resource-url"], "/a.css");
        assert_eq!(objects[1]["attributes"]["mimetype"], "text/css");
    }

    #[test]
    fn test_from_config_requires_token() {
        let err = HttpReviewApi::from_config(&VizregConfig::default(), "vizreg/test").unwrap_err();
        assert!(matches!(err, VizregError::Config(_)));
    }
}
