//! Autocode Types - Pure type definitions shared by the engine, server and CLI
//!
//! This crate contains only plain data types with no async runtime
//! dependencies, so it can be used on any target.

pub mod artifact;
pub mod chat;
pub mod command;
pub mod message;
pub mod progress;
pub mod stream;
pub mod sync;

pub use artifact::*;
pub use chat::*;
pub use command::*;
pub use message::*;
pub use progress::*;
pub use stream::*;
pub use sync::*;
