//! Reload notification.
//!
//! Single-slot: any number of triggers while nobody is waiting leave
//! exactly one pending wakeup. A trigger that arrives while a reload is
//! running therefore yields one follow-up reload, and a trigger sent
//! while idle is never lost.

use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct ReloadSignal {
    notify: Arc<Notify>,
}

impl ReloadSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a reload. Never blocks.
    pub fn trigger(&self) {
        self.notify.notify_one();
    }

    /// Wait for the next request.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
