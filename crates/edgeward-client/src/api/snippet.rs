//! VCL snippet API endpoints.

use super::de;
use crate::FastlyClient;
use edgeward_core::{Result, Snippet};
use serde::Deserialize;
use tracing::debug;

/// Snippet as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct SnippetInfo {
    /// Snippet ID
    pub id: String,
    /// Snippet name
    pub name: String,
    /// Owning service ID
    pub service_id: String,
    /// Service version, absent for versionless dynamic snippet updates
    #[serde(default, deserialize_with = "de::string_or_number")]
    pub version: String,
}

/// VCL snippet API endpoints
pub struct SnippetApi<'a> {
    client: &'a FastlyClient,
}

impl<'a> SnippetApi<'a> {
    pub(crate) fn new(client: &'a FastlyClient) -> Self {
        Self { client }
    }

    /// Create a snippet in a service version
    pub async fn create(&self, snippet: &Snippet) -> Result<SnippetInfo> {
        let content = snippet.content();
        let priority = snippet.priority.to_string();
        let dynamic = if snippet.dynamic { "1" } else { "0" };

        self.client
            .post_form(
                &format!(
                    "/service/{}/version/{}/snippet",
                    snippet.service_id, snippet.version
                ),
                &[
                    ("name", snippet.name.as_str()),
                    ("type", snippet.kind.as_str()),
                    ("content", content.as_str()),
                    ("dynamic", dynamic),
                    ("priority", priority.as_str()),
                ],
            )
            .await
    }

    /// Replace the content of a dynamic snippet
    pub async fn update_dynamic(
        &self,
        service_id: &str,
        snippet_id: &str,
        content: &str,
    ) -> Result<SnippetInfo> {
        self.client
            .put_form(
                &format!("/service/{service_id}/snippet/{snippet_id}"),
                &[("content", content)],
            )
            .await
    }

    /// Replace the content of a versioned snippet
    pub async fn update(
        &self,
        service_id: &str,
        version: &str,
        name: &str,
        content: &str,
    ) -> Result<SnippetInfo> {
        self.client
            .put_form(
                &format!("/service/{service_id}/version/{version}/snippet/{name}"),
                &[("content", content)],
            )
            .await
    }

    /// Create the snippet if it has no remote ID yet, otherwise update it
    pub async fn upsert(&self, snippet: &Snippet) -> Result<Snippet> {
        let info = match &snippet.id {
            None => {
                debug!(snippet = %snippet.name, "creating snippet");
                self.create(snippet).await?
            }
            Some(id) if snippet.dynamic => {
                debug!(snippet = %snippet.name, "updating dynamic snippet");
                self.update_dynamic(&snippet.service_id, id, &snippet.content())
                    .await?
            }
            Some(_) => {
                debug!(snippet = %snippet.name, "updating versioned snippet");
                self.update(
                    &snippet.service_id,
                    &snippet.version,
                    &snippet.name,
                    &snippet.content(),
                )
                .await?
            }
        };

        let mut updated = snippet.clone();
        updated.id = Some(info.id);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> FastlyClient {
        FastlyClient::builder("token")
            .base_url(server.uri())
            .build()
            .unwrap()
    }

    fn ban_snippet() -> Snippet {
        let mut snippet = Snippet::new("edgeward_ban_rule", "svc", "5", "error 403;");
        snippet.conditional = "if ( client.as.number == 1234 )".into();
        snippet
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/service/svc/version/5/snippet"))
            .and(body_string_contains("name=edgeward_ban_rule"))
            .and(body_string_contains("dynamic=1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "snip-1",
                "name": "edgeward_ban_rule",
                "service_id": "svc",
                "version": "5"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/service/svc/snippet/snip-1"))
            .and(body_string_contains("content="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "snip-1",
                "name": "edgeward_ban_rule",
                "service_id": "svc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let created = client.snippets().upsert(&ban_snippet()).await.unwrap();
        assert_eq!(created.id.as_deref(), Some("snip-1"));
        assert_eq!(created.conditional, "if ( client.as.number == 1234 )");

        let updated = client.snippets().upsert(&created).await.unwrap();
        assert_eq!(updated, created);
    }

    #[tokio::test]
    async fn test_upsert_versioned_snippet() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/service/svc/version/5/snippet/edgeward_ban_rule"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "snip-9",
                "name": "edgeward_ban_rule",
                "service_id": "svc",
                "version": 5
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut snippet = ban_snippet();
        snippet.dynamic = false;
        snippet.id = Some("snip-9".into());

        let client = client_for(&server).await;
        let updated = client.snippets().upsert(&snippet).await.unwrap();
        assert_eq!(updated.id.as_deref(), Some("snip-9"));
    }
}
