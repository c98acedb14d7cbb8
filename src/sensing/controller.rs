use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{capture_loop, PipelineCtx};

/// Owns one session's capture loop task and its cancellation token.
pub(crate) struct SensingController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SensingController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn start(&mut self, ctx: PipelineCtx) -> Result<()> {
        if self.handle.is_some() {
            bail!("capture loop already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();
        info!("starting capture loop for session {}", ctx.session.id);

        let handle = tokio::spawn(capture_loop(ctx, token_clone));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancel new ticks immediately and wait for the loop (and its single
    /// in-flight classification) to wind down.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("capture loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}
