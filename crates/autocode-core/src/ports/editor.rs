//! Editor collaborator

use crate::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFileRequest {
    pub path: String,
    pub name: String,
    pub content: String,
    pub language: String,
}

#[async_trait]
pub trait EditorPort: Send + Sync {
    async fn open_file(&self, request: OpenFileRequest) -> Result<()>;

    async fn update_file_content(&self, path: &str, content: &str) -> Result<()>;

    /// Close the file if it is open; closing a file that is not open is fine
    async fn close_file(&self, path: &str) -> Result<()>;

    async fn mark_file_as_externally_modified(&self, path: &str) -> Result<()>;
}
