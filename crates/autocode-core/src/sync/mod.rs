//! Workspace broadcast
//!
//! `WorkspaceHub` is the fan-out group used by the sync server.
//! `HubClient` joins a hub from inside the same process.

pub mod client;
pub mod hub;

pub use client::HubClient;
pub use hub::WorkspaceHub;
