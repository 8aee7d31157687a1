//! Search index write interface.
//!
//! The sync pipeline only talks to the index through [`IndexClient`], so the
//! HTTP adapter can be swapped for an in-memory fake in tests.

pub mod workplace;

pub use workplace::WorkplaceSearchClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ingest::Document;

/// Per-document outcome of a bulk index call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub id: String,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexResponse {
    #[serde(default)]
    pub results: Vec<DocumentResult>,
}

/// Permission grant published for one index user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPermissions {
    pub user: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionList {
    #[serde(default)]
    pub results: Vec<UserPermissions>,
}

/// Content source created by [`IndexClient::create_content_source`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSource {
    pub id: String,
    pub name: String,
}

/// Index write client
///
/// Implementations own their retry policy; callers do not retry.
#[async_trait]
pub trait IndexClient: Send + Sync {
    async fn index_documents(&self, source_id: &str, documents: &[Document])
        -> Result<IndexResponse>;

    async fn delete_documents(&self, source_id: &str, ids: &[String]) -> Result<()>;

    async fn list_permissions(&self, source_id: &str) -> Result<PermissionList>;

    async fn add_user_permissions(
        &self,
        source_id: &str,
        user: &str,
        permissions: &[String],
    ) -> Result<()>;

    async fn remove_user_permissions(
        &self,
        source_id: &str,
        user: &str,
        permissions: &[String],
    ) -> Result<()>;

    async fn create_content_source(&self, name: &str) -> Result<ContentSource>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_response_defaults_missing_errors() {
        let response: IndexResponse =
            serde_json::from_str(r#"{"results":[{"id":"1"},{"id":"2","errors":["bad"]}]}"#)
                .unwrap();
        assert!(response.results[0].errors.is_empty());
        assert_eq!(response.results[1].errors, vec!["bad".to_string()]);
    }

    #[test]
    fn test_permission_list_parse() {
        let list: PermissionList = serde_json::from_str(
            r#"{"meta":{"page":{"current":1}},"results":[{"user":"alice","permissions":["S-1"]}]}"#,
        )
        .unwrap();
        assert_eq!(list.results[0].user, "alice");
        assert_eq!(list.results[0].permissions, vec!["S-1".to_string()]);
    }
}
