//! Session acquisition trait.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{SessionError, SessionResult};
use crate::types::session::SessionContext;

/// Pause between bootstrap attempts.
const RETRY_PAUSE: Duration = Duration::from_secs(2);

/// Acquires fresh authenticated browsing contexts.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Acquire a brand-new session. One attempt, no retries.
    async fn acquire(&self) -> SessionResult<SessionContext>;

    /// Acquire with a small fixed number of attempts, as done at worker start.
    ///
    /// Exhausting the attempts yields [`SessionError::Exhausted`], which is
    /// fatal to the worker.
    async fn acquire_with_retries(&self, attempts: u32) -> SessionResult<SessionContext> {
        let attempts = attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.acquire().await {
                Ok(session) => return Ok(session),
                Err(e) if attempt < attempts => {
                    tracing::warn!(attempt, attempts, error = %e, "Session acquisition failed, retrying");
                    tokio::time::sleep(RETRY_PAUSE).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(SessionError::Exhausted {
                        attempts,
                        last: Box::new(e),
                    })
                }
            }
        }
    }
}
