//! Port traits (interfaces) for dependency injection

pub mod editor;
pub mod storage;
pub mod sync;
pub mod transport;

pub use editor::{EditorPort, OpenFileRequest};
pub use storage::{EntryKind, WorkspaceStorage};
pub use sync::SyncTransport;
pub use transport::{ChunkStream, ModelTransport};
