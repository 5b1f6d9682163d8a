//! Configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::drive::transfer::DEFAULT_CHUNK_SIZE;
use crate::drive::types::{ListQuery, DEFAULT_PAGE_SIZE};

/// Current config file version
pub const CONFIG_VERSION: u32 = 1;

/// Base URLs of the Drive REST API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveEndpoints {
    /// Metadata, download and delete calls
    pub api_base: String,
    /// Upload calls
    pub upload_base: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
        }
    }
}

/// Top-level config file (`config.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub version: u32,
    pub endpoints: DriveEndpoints,
    /// Files requested per list call (first page only)
    pub page_size: u32,
    /// Per-file fields requested on list
    pub list_fields: Vec<String>,
    /// Copy buffer size in bytes
    pub chunk_size: usize,
    /// Where downloads land; `<config dir>/files` when unset
    pub download_dir: Option<PathBuf>,
    /// Editor command for `edit`; falls back to `$VISUAL` / `$EDITOR`
    pub editor_command: Option<String>,
    /// Keychain account holding the access token
    pub account: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let query = ListQuery::default();
        Self {
            version: CONFIG_VERSION,
            endpoints: DriveEndpoints::default(),
            page_size: query.page_size,
            list_fields: query.fields,
            chunk_size: DEFAULT_CHUNK_SIZE,
            download_dir: None,
            editor_command: None,
            account: "default".to_string(),
        }
    }
}

impl AppConfig {
    pub fn list_query(&self) -> ListQuery {
        let mut query = ListQuery::new(if self.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size
        });
        if !self.list_fields.is_empty() {
            query.fields = self.list_fields.clone();
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"pageSize": 25}"#).unwrap();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.account, "default");
        assert_eq!(config.endpoints, DriveEndpoints::default());
    }

    #[test]
    fn test_list_query_from_config() {
        let mut config = AppConfig::default();
        config.page_size = 0;
        config.list_fields.clear();
        let query = config.list_query();
        assert_eq!(query, ListQuery::default());
    }
}
