//! [`Transport`] implementation over the Fastly API.

use crate::api::EntryOperation;
use crate::FastlyClient;
use async_trait::async_trait;
use edgeward_core::{Acl, AclEntries, NetworkEntry, Result, Snippet, Transport};
use std::net::IpAddr;
use tracing::debug;

/// Build the batch operations for the staged changes of an ACL
pub fn diff_operations(acl: &Acl) -> Result<Vec<EntryOperation>> {
    let mut operations = Vec::new();

    for item in acl.pending_creates() {
        let entry = NetworkEntry::parse(item)?;
        operations.push(EntryOperation::Create {
            ip: entry.ip.to_string(),
            subnet: entry.subnet,
        });
    }

    for (_, id) in acl.pending_deletes() {
        operations.push(EntryOperation::Delete { id: id.to_string() });
    }

    Ok(operations)
}

/// Identifier under which a remote entry is tracked
fn entry_key(ip: &str, subnet: Option<u8>) -> String {
    match ip.parse::<IpAddr>() {
        Ok(addr) => NetworkEntry::from_parts(addr, subnet).to_string(),
        Err(_) => match subnet {
            Some(len) => format!("{ip}/{len}"),
            None => ip.to_string(),
        },
    }
}

#[async_trait]
impl Transport for FastlyClient {
    async fn create_acl(&self, service_id: &str, version: &str, name: &str) -> Result<Acl> {
        let info = self.acls().create(service_id, version, name).await?;
        Ok(Acl::new(info.id, info.name, info.service_id, info.version))
    }

    async fn push_acl_diff(&self, acl: &Acl) -> Result<()> {
        let operations = diff_operations(acl)?;
        if operations.is_empty() {
            debug!(acl = %acl.name, "no operations to send");
            return Ok(());
        }

        self.acls()
            .batch_update(&acl.service_id, &acl.id, &operations)
            .await
    }

    async fn fetch_acl_entries(&self, acl: &Acl) -> Result<AclEntries> {
        let entries = self.acls().entries(&acl.service_id, &acl.id).await?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry_key(&entry.ip, entry.subnet), entry.id))
            .collect())
    }

    async fn upsert_snippet(&self, snippet: &Snippet) -> Result<Snippet> {
        self.snippets().upsert(snippet).await
    }

    async fn activate_version(&self, service_id: &str, version: &str) -> Result<()> {
        self.versions().activate(service_id, version).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeward_core::EdgeError;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn staged_acl() -> Acl {
        let mut acl = Acl::new("acl-1", "edgeward_ban_0", "svc", "3");
        acl.entries.insert("9.9.9.9".into(), "e9".into());
        acl.entries.insert("8.8.8.8".into(), "e8".into());
        acl.entries_to_add.insert("1.2.3.4".into());
        acl.entries_to_add.insert("10.0.0.0/8".into());
        acl.entries_to_add.insert("8.8.8.8".into());
        acl.entries_to_delete.insert("9.9.9.9".into());
        acl.recount();
        acl
    }

    #[test]
    fn test_diff_operations() {
        let ops = diff_operations(&staged_acl()).unwrap();
        assert_eq!(
            ops,
            vec![
                EntryOperation::Create {
                    ip: "1.2.3.4".into(),
                    subnet: None
                },
                EntryOperation::Create {
                    ip: "10.0.0.0".into(),
                    subnet: Some(8)
                },
                EntryOperation::Delete { id: "e9".into() },
            ]
        );
    }

    #[test]
    fn test_diff_rejects_invalid_identifier() {
        let mut acl = Acl::new("acl-1", "edgeward_ban_0", "svc", "3");
        acl.entries_to_add.insert("not.an.ip".into());
        assert!(matches!(
            diff_operations(&acl),
            Err(EdgeError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_entry_key_round_trip() {
        assert_eq!(entry_key("1.2.3.4", None), "1.2.3.4");
        assert_eq!(entry_key("10.0.0.0", Some(8)), "10.0.0.0/8");
        assert_eq!(entry_key("2001:0db8::0001", None), "2001:db8::1");
        assert_eq!(entry_key("garbage", Some(3)), "garbage/3");
    }

    #[tokio::test]
    async fn test_push_and_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/service/svc/acl/acl-1/entries"))
            .and(body_json(json!({"entries": [
                {"op": "create", "ip": "1.2.3.4"},
                {"op": "create", "ip": "10.0.0.0", "subnet": 8},
                {"op": "delete", "id": "e9"}
            ]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/service/svc/acl/acl-1/entries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "e1", "ip": "1.2.3.4", "subnet": null},
                {"id": "e2", "ip": "10.0.0.0", "subnet": 8},
                {"id": "e8", "ip": "8.8.8.8"}
            ])))
            .mount(&server)
            .await;

        let client = FastlyClient::builder("token")
            .base_url(server.uri())
            .build()
            .unwrap();
        let acl = staged_acl();
        client.push_acl_diff(&acl).await.unwrap();

        let entries = client.fetch_acl_entries(&acl).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries["10.0.0.0/8"], "e2");
        assert_eq!(entries["1.2.3.4"], "e1");
    }

    #[tokio::test]
    async fn test_duplicate_create_is_a_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "msg": "Bad request",
                "detail": "Duplicate record"
            })))
            .mount(&server)
            .await;

        let client = FastlyClient::builder("token")
            .base_url(server.uri())
            .build()
            .unwrap();
        let err = client.push_acl_diff(&staged_acl()).await.unwrap_err();
        assert!(err.is_conflict());
    }
}
