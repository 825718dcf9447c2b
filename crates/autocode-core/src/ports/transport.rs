//! Model transport collaborator

use crate::{ModelRequest, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// Text increments from the model, in arrival order
pub type ChunkStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Start a streamed exchange. Implementations stop reading once `cancel`
    /// fires; the caller also checks it between chunks.
    async fn stream(&self, request: ModelRequest, cancel: CancellationToken)
        -> Result<ChunkStream>;
}
