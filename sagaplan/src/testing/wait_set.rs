use std::{future::Future, rc::Rc};

use tokio::sync::watch;

/// Counts the handles a run still waits on: the main task, forked tasks,
/// in-flight promises and pending deliveries.
///
/// [`idle`](WaitSet::idle) resolves once the count drops to zero. A handle
/// registered before that point re-arms the wait.
#[derive(Clone)]
pub(crate) struct WaitSet {
    pending: Rc<watch::Sender<usize>>,
}

impl WaitSet {
    pub(crate) fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            pending: Rc::new(pending),
        }
    }

    pub(crate) fn enter(&self) {
        self.pending.send_modify(|n| *n += 1);
    }

    pub(crate) fn exit(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Counts `future` until it completes. Must be called within a `LocalSet`.
    pub(crate) fn register<F>(&self, future: F)
    where
        F: Future + 'static,
    {
        self.enter();
        let this = self.clone();
        tokio::task::spawn_local(async move {
            future.await;
            this.exit();
        });
    }

    pub(crate) fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    pub(crate) async fn idle(&self) {
        let mut rx = self.pending.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}
