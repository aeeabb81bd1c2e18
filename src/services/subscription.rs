use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::ListenerHandle;

/// A caller-owned live query. It may be backed by more than one listener
/// (a fallback opened after an error); `unsubscribe` stops all of them.
#[derive(Clone, Default)]
pub struct Subscription {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    listeners: Mutex<Vec<ListenerHandle>>,
}

impl Subscription {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Track a listener. If the subscription is already cancelled the
    /// listener is stopped right away.
    pub(crate) fn attach(&self, handle: ListenerHandle) {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.cancelled.load(Ordering::SeqCst) {
            handle.cancel();
        } else {
            listeners.push(handle);
        }
    }

    pub fn unsubscribe(&self) {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.inner.cancelled.store(true, Ordering::SeqCst);
        for handle in listeners.drain(..) {
            handle.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        !self.inner.cancelled.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pending_listener() -> ListenerHandle {
        let task = tokio::spawn(std::future::pending::<()>());
        ListenerHandle::new(task.abort_handle())
    }

    #[tokio::test]
    async fn unsubscribe_cancels_every_listener() {
        let sub = Subscription::new();
        let (a, b) = (pending_listener(), pending_listener());
        let (a_probe, b_probe) = (a.is_finished(), b.is_finished());
        assert!(!a_probe && !b_probe);

        sub.attach(a);
        sub.attach(b);
        assert_eq!(sub.listener_count(), 2);

        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(sub.listener_count(), 0);
    }

    #[tokio::test]
    async fn attach_after_unsubscribe_cancels_immediately() {
        let sub = Subscription::new();
        sub.unsubscribe();

        let task = tokio::spawn(std::future::pending::<()>());
        let probe = task.abort_handle();
        sub.attach(ListenerHandle::new(task.abort_handle()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(probe.is_finished());
        assert_eq!(sub.listener_count(), 0);
    }
}
