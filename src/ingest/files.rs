//! Document extraction: list files in folders, filter them, and build
//! index documents with body text and permissions.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::document::{document_id, Document, FileDetails, Permissions};
use super::extract::ExtractorRegistry;
use super::rules::IndexingRules;
use super::window::TimeWindow;
use crate::config::Config;
use crate::error::Result;
use crate::mapping::UserMapping;
use crate::share::{connect_with_retry, join_path, ShareClient, ShareConnection};

pub const ACCESS_ALLOWED_TYPE: u8 = 0;
pub const ACCESS_DENIED_TYPE: u8 = 1;
/// Access mask treated as an allow grant regardless of ACE type
pub const ALLOW_MASK: u32 = 278;
/// Access mask treated as a deny grant regardless of ACE type
pub const DENY_MASK: u32 = 1_048_854;

/// Fetches files from the share and turns them into [`Document`]s
pub struct Files {
    client: Arc<dyn ShareClient>,
    server_ip: String,
    enable_document_permission: bool,
    user_mapping: Option<UserMapping>,
    retry_count: u32,
    retry_delay: Duration,
    extractors: ExtractorRegistry,
}

impl Files {
    pub fn new(client: Arc<dyn ShareClient>, server_ip: &str) -> Self {
        Self {
            client,
            server_ip: server_ip.to_string(),
            enable_document_permission: false,
            user_mapping: None,
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            extractors: ExtractorRegistry::new(),
        }
    }

    /// Build from configuration; loads the user mapping table when permissions
    /// are enabled and the mapping file exists.
    pub fn from_config(client: Arc<dyn ShareClient>, config: &Config) -> Result<Self> {
        let user_mapping = if config.enable_document_permission {
            UserMapping::load_if_present(config.user_mapping_path())?
        } else {
            None
        };
        Ok(Self::new(client, &config.network_drive.server_ip)
            .with_permissions(config.enable_document_permission, user_mapping)
            .with_retry(config.retry_count, Duration::from_secs(1)))
    }

    pub fn with_permissions(mut self, enabled: bool, user_mapping: Option<UserMapping>) -> Self {
        self.enable_document_permission = enabled;
        self.user_mapping = user_mapping;
        self
    }

    pub fn with_retry(mut self, retry_count: u32, retry_delay: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_delay = retry_delay;
        self
    }

    /// Open a connection to the share, retrying transient failures
    pub fn connect(&self) -> Result<Box<dyn ShareConnection>> {
        connect_with_retry(self.client.as_ref(), self.retry_count, self.retry_delay)
    }

    /// List the files directly inside `folder` that pass `rules` and whose
    /// last change falls inside `window`, keyed by document id.
    ///
    /// A folder that cannot be listed yields no files.
    pub fn extract_files(
        &self,
        conn: &dyn ShareConnection,
        share: &str,
        folder: &str,
        window: &TimeWindow,
        rules: &IndexingRules,
    ) -> Vec<(String, FileDetails)> {
        let entries = match conn.list_path(share, folder) {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Unable to extract files from folder {}: {}", folder, e);
                return Vec::new();
            }
        };

        let mut storage = Vec::new();
        for entry in entries.into_iter().filter(|e| !e.is_directory) {
            let file_path = join_path(folder, &entry.filename);
            let file_type = Path::new(&entry.filename)
                .extension()
                .map(|ext| format!(".{}", ext.to_string_lossy()))
                .unwrap_or_default();
            let details = FileDetails {
                file_id: entry.file_id,
                web_path: format!("file://{}/{}/{}", self.server_ip, share, file_path),
                file_name: entry.filename,
                file_path,
                file_type,
                file_size: entry.file_size,
                created_at: entry.create_time,
                updated_at: entry.last_attr_change_time,
            };
            if rules.should_index(&details) && window.contains(details.updated_at) {
                storage.push((document_id(&details, folder), details));
            }
        }
        storage
    }

    /// Read the DACL of `path` and split its entries into allow and deny SIDs.
    ///
    /// A failure to read the ACL is logged and yields empty sets.
    pub fn retrieve_permission(
        &self,
        conn: &dyn ShareConnection,
        share: &str,
        path: &str,
    ) -> Permissions {
        let descriptor = match conn.get_security(share, path) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                log::error!("Unable to fetch permission details for file {}: {}", path, e);
                return Permissions::default();
            }
        };

        let mut permissions = Permissions::default();
        for ace in descriptor.dacl.unwrap_or_default() {
            if ace.ace_type == ACCESS_ALLOWED_TYPE || ace.mask == ALLOW_MASK {
                permissions.allow.insert(ace.sid.clone());
            }
            if (ace.ace_type == ACCESS_DENIED_TYPE && ace.mask != ALLOW_MASK) || ace.mask == DENY_MASK
            {
                permissions.deny.insert(ace.sid.clone());
            }
            let mapped = self
                .user_mapping
                .as_ref()
                .and_then(|m| m.get(&ace.sid))
                .is_some();
            if !mapped {
                log::warn!(
                    "No mapping found for sid {}. Add the sid->user mapping and rerun permission-sync",
                    ace.sid
                );
            }
        }
        permissions
    }

    /// Retrieve the raw content of a file and extract its text.
    ///
    /// Returns an empty body when the file cannot be read.
    pub fn fetch_file_content(
        &self,
        conn: &dyn ShareConnection,
        share: &str,
        details: &FileDetails,
    ) -> String {
        let mut raw = Vec::new();
        match conn.retrieve_file(share, &details.file_path, &mut raw) {
            Ok(_) => self
                .extractors
                .extract(&raw, &details.file_path, &details.extension()),
            Err(e) => {
                log::error!(
                    "Cannot read the contents of the file {}: {}",
                    details.file_name,
                    e
                );
                String::new()
            }
        }
    }

    /// Build documents for every admitted file in `folders`.
    ///
    /// Fails only when no connection can be opened; per-folder and per-file
    /// problems are logged.
    pub fn fetch_files(
        &self,
        share: &str,
        folders: &[String],
        window: &TimeWindow,
        rules: &IndexingRules,
    ) -> Result<Vec<Document>> {
        let mut conn = self.connect()?;
        let mut documents = Vec::new();

        for folder in folders {
            for (id, details) in self.extract_files(conn.as_ref(), share, folder, window, rules) {
                let mut doc = Document::from_details(id, &details);
                if self.enable_document_permission {
                    let permissions = self.retrieve_permission(conn.as_ref(), share, &details.file_path);
                    doc = doc.with_permissions(permissions);
                }
                doc.body = self.fetch_file_content(conn.as_ref(), share, &details);
                documents.push(doc);
            }
        }

        conn.close();
        Ok(documents)
    }
}
