pub mod reqwest_client;

pub use reqwest_client::ReqwestTransport;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWrite;

/// Writable byte destination a transfer streams into.
pub type Sink = dyn AsyncWrite + Send + Unpin;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("writing to sink failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("transfer did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("transfer aborted: {0}")]
    Aborted(String),
}

/// Network side of a transfer: issue the request and stream the body into
/// `sink` chunk by chunk. Returns the number of bytes written.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn fetch(&self, locator: &str, sink: &mut Sink) -> Result<u64, TransferError>;
}
