use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Metadata for a file discovered on the share
#[derive(Debug, Clone, PartialEq)]
pub struct FileDetails {
    /// Native file id reported by the server, if any
    pub file_id: Option<u64>,
    pub file_name: String,
    /// Path relative to the share root, `/`-separated
    pub file_path: String,
    /// `file://{server_ip}/{share}/{file_path}`
    pub web_path: String,
    /// Extension including the leading dot (`.txt`), empty when absent
    pub file_type: String,
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileDetails {
    /// Extension without the dot, lowercased; used to pick a text extractor.
    pub fn extension(&self) -> String {
        self.file_type.trim_start_matches('.').to_lowercase()
    }
}

/// Allow/deny SID sets read from a file's DACL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions {
    pub allow: BTreeSet<String>,
    pub deny: BTreeSet<String>,
}

/// A document ready to be written to the index.
///
/// Built by the extractor and never modified once it is on the work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub path: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(rename = "type")]
    pub file_type: String,
    pub size: u64,
    pub body: String,
    #[serde(
        rename = "_allow_permissions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub allow_permissions: Option<BTreeSet<String>>,
    #[serde(
        rename = "_deny_permissions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub deny_permissions: Option<BTreeSet<String>>,
}

impl Document {
    /// Map file metadata into the index schema. Body and permissions are
    /// attached afterwards.
    pub fn from_details(id: String, details: &FileDetails) -> Self {
        Self {
            id,
            title: details.file_name.clone(),
            path: details.file_path.clone(),
            url: details.web_path.clone(),
            created_at: details.created_at,
            last_updated: details.updated_at,
            file_type: details.file_type.clone(),
            size: details.file_size,
            body: String::new(),
            allow_permissions: None,
            deny_permissions: None,
        }
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.allow_permissions = Some(permissions.allow);
        self.deny_permissions = Some(permissions.deny);
        self
    }
}

/// Stable id for files whose server does not report a native id.
///
/// SHA256 of `"{file_name}-{folder_path}"`, hex encoded.
pub fn hash_id(file_name: &str, folder_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_name.as_bytes());
    hasher.update(b"-");
    hasher.update(folder_path.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Document id for a listed file: the native id when present and non-zero,
/// otherwise [`hash_id`].
pub fn document_id(details: &FileDetails, folder_path: &str) -> String {
    match details.file_id {
        Some(id) if id != 0 => id.to_string(),
        _ => hash_id(&details.file_name, folder_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn details(file_id: Option<u64>) -> FileDetails {
        let t = Utc.with_ymd_and_hms(2022, 1, 5, 10, 0, 0).unwrap();
        FileDetails {
            file_id,
            file_name: "report.TXT".to_string(),
            file_path: "docs/report.TXT".to_string(),
            web_path: "file://10.0.0.1/share/docs/report.TXT".to_string(),
            file_type: ".TXT".to_string(),
            file_size: 42,
            created_at: t,
            updated_at: t,
        }
    }

    #[test]
    fn test_hash_id_stable_and_distinct() {
        let a = hash_id("file.txt", "root/docs");
        assert_eq!(a, hash_id("file.txt", "root/docs"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_id("file.txt", "root/other"));
        assert_ne!(a, hash_id("file2.txt", "root/docs"));
    }

    #[test]
    fn test_document_id_prefers_native_id() {
        assert_eq!(document_id(&details(Some(844424930334011)), "docs"), "844424930334011");
        assert_eq!(
            document_id(&details(None), "docs"),
            hash_id("report.TXT", "docs")
        );
        assert_eq!(document_id(&details(Some(0)), "docs"), hash_id("report.TXT", "docs"));
    }

    #[test]
    fn test_extension() {
        assert_eq!(details(None).extension(), "txt");
    }

    #[test]
    fn test_serialization_schema() {
        let doc = Document::from_details("1".to_string(), &details(None));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["type"], ".TXT");
        assert_eq!(json["title"], "report.TXT");
        assert_eq!(json["last_updated"], "2022-01-05T10:00:00Z");
        assert!(json.get("_allow_permissions").is_none());

        let mut permissions = Permissions::default();
        permissions.allow.insert("S-1-5-21-1".to_string());
        let json = serde_json::to_value(doc.with_permissions(permissions)).unwrap();
        assert_eq!(json["_allow_permissions"][0], "S-1-5-21-1");
        assert_eq!(json["_deny_permissions"].as_array().unwrap().len(), 0);
    }
}
