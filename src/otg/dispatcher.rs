//! Mailbox event dispatch.
//!
//! Single-concurrency deferred task bound 1:1 to a controller context. Line
//! state changes are latched as "most recent status" and the task is woken;
//! the dispatch body reads the latch at dispatch time, so posts that land
//! before the task runs coalesce and only the latest status is guaranteed
//! to be observed.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::machine::ControllerContext;
use super::state::MailboxEvent;

pub(crate) struct MailboxDispatcher {
    latch: Arc<Mutex<MailboxEvent>>,
    notify: Arc<Notify>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MailboxDispatcher {
    pub fn new() -> Self {
        Self {
            latch: Arc::new(Mutex::new(MailboxEvent::Unknown)),
            notify: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Record `event` as the most recent mailbox status. A later latch
    /// before the task runs overwrites this one.
    pub fn latch(&self, event: MailboxEvent) {
        *self.latch.lock() = event;
    }

    /// Most recent latched status.
    pub fn latched(&self) -> MailboxEvent {
        *self.latch.lock()
    }

    /// Wake the dispatch task. Multiple schedules before it runs collapse
    /// into one dispatch of the latest latch.
    pub fn schedule(&self) {
        self.notify.notify_one();
    }

    /// Spawn the dispatch task for `ctx`.
    pub fn spawn(&self, ctx: Arc<AsyncMutex<ControllerContext>>) {
        let latch = Arc::clone(&self.latch);
        let notify = Arc::clone(&self.notify);
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = notify.notified() => {
                        // status is read here, not at post time
                        let status = *latch.lock();
                        debug!("dispatching mailbox status {}", status);
                        let mut guard = ctx.lock().await;
                        guard.apply_event(status).await;
                    }
                }
            }
        });

        *self.task.lock() = Some(handle);
    }

    /// Cancel the task and wait for any in-flight dispatch to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}
