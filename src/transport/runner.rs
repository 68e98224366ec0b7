//! Long-polling loop
//!
//! Fetches updates, advances the offset past every update it has seen and
//! spawns one task per image so a slow request never holds up polling.

use super::{handler::USAGE_MESSAGE, InboundEvent, InboundUpdate, RequestHandler, UpdateSource};
use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// First retry delay after a failed poll
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound of the retry delay
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How long in-flight requests may finish after shutdown was requested
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Polls updates and dispatches them to the request handler
pub struct BotRunner {
    source: Arc<dyn UpdateSource>,
    handler: RequestHandler,
}

impl BotRunner {
    #[must_use]
    pub fn new(source: Arc<dyn UpdateSource>, handler: RequestHandler) -> Self {
        Self { source, handler }
    }

    /// Delay before the next poll after `failures` consecutive errors
    #[must_use]
    pub fn backoff_delay(failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        INITIAL_BACKOFF
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF)
    }

    /// Run until `shutdown` resolves
    ///
    /// Poll errors are logged and retried with exponential back-off; they
    /// never end the loop.
    ///
    /// # Errors
    /// Currently always returns `Ok`; the signature leaves room for fatal
    /// transport conditions.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut offset: Option<i64> = None;
        let mut failures: u32 = 0;
        let mut tasks = JoinSet::new();

        info!("Polling for updates");
        loop {
            // A pending long poll is only ever cancelled by shutdown
            let batch = tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                batch = self.source.poll_updates(offset) => batch,
            };
            Self::reap_finished(&mut tasks);

            match batch {
                Ok(updates) => {
                    failures = 0;
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        self.dispatch(update, &mut tasks);
                    }
                },
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = Self::backoff_delay(failures);
                    warn!(error = %e, failures, retry_in_ms = delay.as_millis() as u64, "Polling failed");
                    tokio::select! {
                        () = &mut shutdown => {
                            info!("Shutdown requested");
                            break;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                },
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight requests");
            let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
                while tasks.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(abandoned = tasks.len(), "In-flight requests did not finish in time");
                tasks.abort_all();
            }
        }
        Ok(())
    }

    fn reap_finished(tasks: &mut JoinSet<()>) {
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Request task panicked");
            }
        }
    }

    fn dispatch(&self, update: InboundUpdate, tasks: &mut JoinSet<()>) {
        match update.event {
            InboundEvent::Image(image) => {
                let handler = self.handler.clone();
                tasks.spawn(async move {
                    handler.handle(image).await;
                });
            },
            InboundEvent::Command { chat_id, command } => {
                if matches!(command.as_str(), "/start" | "/help") {
                    let transport = Arc::clone(self.handler.transport());
                    tasks.spawn(async move {
                        if let Err(e) = transport.send_text(chat_id, USAGE_MESSAGE).await {
                            warn!(error = %e, "Could not send usage hint");
                        }
                    });
                } else {
                    debug!(%command, "Ignoring unknown command");
                }
            },
            InboundEvent::Ignored => {
                debug!(update_id = update.update_id, "Ignoring update");
            },
        }
    }
}
