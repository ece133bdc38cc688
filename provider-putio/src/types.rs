//! put.io API response types
//!
//! Data structures for deserializing put.io API v2 responses.

use serde::{Deserialize, Deserializer, Serialize};

/// put.io file resource (subset of fields used here)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutioFile {
    /// Numeric file id
    pub id: i64,

    /// File or folder name
    pub name: String,

    /// Parent folder id, `0` for the root
    #[serde(default)]
    pub parent_id: Option<i64>,

    /// Size in bytes
    #[serde(default)]
    pub size: Option<u64>,

    /// `FOLDER`, `VIDEO`, `ARCHIVE` and so on
    #[serde(default)]
    pub file_type: Option<String>,
}

/// `GET /files/list` response
#[derive(Debug, Deserialize)]
pub struct FilesListResponse {
    pub files: Vec<PutioFile>,
}

/// `POST /zips/create` response
#[derive(Debug, Deserialize)]
pub struct ZipCreateResponse {
    pub zip_id: i64,
}

/// `GET /zips/<id>` response
///
/// put.io reports `"url": false` until the archive is built.
#[derive(Debug, Deserialize)]
pub struct ZipStatusResponse {
    #[serde(default, deserialize_with = "url_or_false")]
    pub url: Option<String>,

    #[serde(default)]
    pub zip_status: Option<String>,

    #[serde(default)]
    pub size: Option<u64>,
}

/// Error body returned alongside non-2xx statuses
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error_message: Option<String>,

    #[serde(default)]
    pub error_type: Option<String>,
}

fn url_or_false<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum UrlOrFlag {
        Url(String),
        Flag(bool),
    }

    Ok(match Option::<UrlOrFlag>::deserialize(deserializer)? {
        Some(UrlOrFlag::Url(url)) if !url.is_empty() => Some(url),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zip_status_pending() {
        let status: ZipStatusResponse =
            serde_json::from_str(r#"{"url": false, "zip_status": "PROCESSING", "status": "OK"}"#)
                .unwrap();
        assert_eq!(status.url, None);
        assert_eq!(status.zip_status.as_deref(), Some("PROCESSING"));
    }

    #[test]
    fn test_zip_status_ready() {
        let status: ZipStatusResponse = serde_json::from_str(
            r#"{"url": "https://zips.put.io/1.zip", "zip_status": "DONE", "size": 12}"#,
        )
        .unwrap();
        assert_eq!(status.url.as_deref(), Some("https://zips.put.io/1.zip"));
        assert_eq!(status.size, Some(12));
    }

    #[test]
    fn test_zip_status_missing_or_null_url() {
        let missing: ZipStatusResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(missing.url, None);

        let null: ZipStatusResponse = serde_json::from_str(r#"{"url": null}"#).unwrap();
        assert_eq!(null.url, None);
    }

    #[test]
    fn test_files_list_ignores_unknown_fields() {
        let list: FilesListResponse = serde_json::from_str(
            r#"{
                "files": [
                    {"id": 11, "name": "Movie", "parent_id": 0, "file_type": "FOLDER", "crc32": null}
                ],
                "parent": {"id": 0, "name": "Your Files"},
                "status": "OK"
            }"#,
        )
        .unwrap();

        assert_eq!(list.files.len(), 1);
        assert_eq!(list.files[0].id, 11);
        assert_eq!(list.files[0].file_type.as_deref(), Some("FOLDER"));
    }
}
