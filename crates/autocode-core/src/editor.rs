//! Editor collaborator for headless use
//!
//! Tracks which files are open and what they contain, and records every
//! call so callers (and tests) can see what the editor was asked to do.

use crate::ports::{EditorPort, OpenFileRequest};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorCall {
    Open { path: String, language: String },
    Update { path: String },
    Close { path: String },
    MarkExternal { path: String },
}

#[derive(Default)]
struct EditorState {
    open: HashMap<String, String>,
    external: Vec<String>,
    calls: Vec<EditorCall>,
}

#[derive(Clone, Default)]
pub struct HeadlessEditor {
    state: Arc<Mutex<EditorState>>,
}

impl HeadlessEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, path: &str) -> bool {
        self.with_state(|s| s.open.contains_key(path))
    }

    /// Buffer content of an open file
    pub fn buffer(&self, path: &str) -> Option<String> {
        self.with_state(|s| s.open.get(path).cloned())
    }

    pub fn calls(&self) -> Vec<EditorCall> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn externally_modified(&self) -> Vec<String> {
        self.with_state(|s| s.external.clone())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut EditorState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl EditorPort for HeadlessEditor {
    async fn open_file(&self, request: OpenFileRequest) -> Result<()> {
        debug!("Editor open: {} ({})", request.path, request.language);
        self.with_state(|s| {
            s.calls.push(EditorCall::Open {
                path: request.path.clone(),
                language: request.language.clone(),
            });
            s.open.insert(request.path, request.content);
        });
        Ok(())
    }

    async fn update_file_content(&self, path: &str, content: &str) -> Result<()> {
        debug!("Editor update: {}", path);
        self.with_state(|s| {
            s.calls.push(EditorCall::Update {
                path: path.to_string(),
            });
            if let Some(buffer) = s.open.get_mut(path) {
                *buffer = content.to_string();
            }
        });
        Ok(())
    }

    async fn close_file(&self, path: &str) -> Result<()> {
        debug!("Editor close: {}", path);
        self.with_state(|s| {
            s.calls.push(EditorCall::Close {
                path: path.to_string(),
            });
            s.open.remove(path);
        });
        Ok(())
    }

    async fn mark_file_as_externally_modified(&self, path: &str) -> Result<()> {
        debug!("Editor external change: {}", path);
        self.with_state(|s| {
            s.calls.push(EditorCall::MarkExternal {
                path: path.to_string(),
            });
            s.external.push(path.to_string());
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str, content: &str) -> OpenFileRequest {
        OpenFileRequest {
            path: path.to_string(),
            name: crate::utils::file_name(path).to_string(),
            content: content.to_string(),
            language: crate::utils::language_for_path(path).to_string(),
        }
    }

    #[test]
    fn test_tracks_open_buffers() {
        let editor = HeadlessEditor::new();
        tokio_test::block_on(async {
            editor.open_file(request("src/a.ts", "one")).await.unwrap();
            editor.update_file_content("src/a.ts", "two").await.unwrap();
            editor.update_file_content("src/b.ts", "ignored").await.unwrap();
        });
        assert!(editor.is_open("src/a.ts"));
        assert_eq!(editor.buffer("src/a.ts").as_deref(), Some("two"));
        assert!(editor.buffer("src/b.ts").is_none());

        tokio_test::block_on(editor.close_file("src/a.ts")).unwrap();
        assert!(!editor.is_open("src/a.ts"));
        assert_eq!(
            editor.calls(),
            vec![
                EditorCall::Open {
                    path: "src/a.ts".into(),
                    language: "typescript".into()
                },
                EditorCall::Update {
                    path: "src/a.ts".into()
                },
                EditorCall::Update {
                    path: "src/b.ts".into()
                },
                EditorCall::Close {
                    path: "src/a.ts".into()
                },
            ]
        );
    }

    #[test]
    fn test_external_marks() {
        let editor = HeadlessEditor::new();
        tokio_test::block_on(editor.mark_file_as_externally_modified("notes.md")).unwrap();
        assert_eq!(editor.externally_modified(), vec!["notes.md".to_string()]);
    }
}
