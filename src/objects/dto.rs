use serde::{Deserialize, Serialize};

/// Request body for a direct upload; `content` is stored verbatim.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub object_name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub bucket: String,
    pub object_name: String,
    pub etag: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
pub struct PresignRequest {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub object_name: String,
    #[serde(default)]
    pub expiry_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct PresignResponse {
    pub url: String,
    pub expiry_seconds: u64,
}
