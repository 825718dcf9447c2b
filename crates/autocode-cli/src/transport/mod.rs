//! Network transports: the model API and the sync server

pub mod openai;
pub mod sync;

pub use openai::OpenAiTransport;
pub use sync::WsSyncTransport;
