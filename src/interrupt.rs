//! Ctrl+C handling.
//!
//! The first Ctrl+C raises the interrupt so loops can stop and save partial
//! results; a second one exits immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

#[derive(Default)]
struct Inner {
    flag: AtomicBool,
    notify: Notify,
}

/// Shared, cloneable interrupt flag
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

impl Interrupt {
    /// New, untriggered interrupt
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the interrupt and wake every waiter
    pub fn trigger(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether the interrupt has been raised
    pub fn is_triggered(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolve once the interrupt is raised
    pub async fn triggered(&self) {
        let notified = self.inner.notify.notified();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }

    /// Route Ctrl+C to this interrupt. Must be called inside a tokio runtime.
    pub fn install_ctrl_c(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                warn!("Unable to listen for Ctrl+C");
                return;
            }
            interrupt.trigger();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        });
    }
}
