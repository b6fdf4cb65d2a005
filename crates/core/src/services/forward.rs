//! Forward sink.
//!
//! Provides an abstraction for delivering processed uploads to their target
//! channel. The actual implementation is provided by the transport.

use async_trait::async_trait;
use reelcap_common::{AppError, AppResult};
use std::sync::Arc;

use super::dispatcher::UploadEvent;
use super::progression::ForwardRequest;

/// Trait for delivering uploads.
///
/// Calls are fire-and-forget from the engine's point of view: failures are
/// logged by the caller and never retried.
#[async_trait]
pub trait ForwardSink: Send + Sync {
    /// Send a captioned upload to its target channel.
    async fn forward(&self, request: &ForwardRequest) -> AppResult<()>;

    /// Tell the uploader that an upload was denied.
    async fn reject(&self, event: &UploadEvent, error: &AppError) -> AppResult<()>;
}

/// No-op forward sink for when no transport is attached.
pub struct NoOpForwardSink;

#[async_trait]
impl ForwardSink for NoOpForwardSink {
    async fn forward(&self, _request: &ForwardRequest) -> AppResult<()> {
        Ok(())
    }

    async fn reject(&self, _event: &UploadEvent, _error: &AppError) -> AppResult<()> {
        Ok(())
    }
}

/// Type alias for the shared forward sink.
pub type ForwardService = Arc<dyn ForwardSink>;
