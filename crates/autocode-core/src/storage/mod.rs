//! Storage implementations
//!
//! `MemoryStorage` keeps a workspace in a DashMap (tests, previews).
//! `LocalStorage` maps a workspace onto a directory on disk.

pub mod local;
pub mod memory;

pub use local::LocalStorage;
pub use memory::MemoryStorage;
