use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    future::Future,
    rc::{Rc, Weak},
    sync::atomic::{AtomicU64, Ordering},
};

use serde_json::Value;
use tokio::sync::oneshot;

/// How a [`Channel`] buffers messages nobody is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Buffer {
    /// Keep everything.
    Expanding,
    /// Keep the newest `n` messages.
    Sliding(usize),
    /// Keep the oldest `n` messages, drop new ones when full.
    Dropping(usize),
    /// Keep nothing.
    None,
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Buffer::Expanding => write!(f, "expanding"),
            Buffer::Sliding(n) => write!(f, "sliding({n})"),
            Buffer::Dropping(n) => write!(f, "dropping({n})"),
            Buffer::None => write!(f, "none"),
        }
    }
}

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct ChannelInner {
    id: u64,
    buffer: Buffer,
    queue: RefCell<VecDeque<Value>>,
    takers: RefCell<VecDeque<oneshot::Sender<Value>>>,
    closed: Cell<bool>,
}

/// A buffered message channel, created by `actionChannel` effects.
///
/// Cloning yields another handle to the same channel; handles compare equal
/// when they refer to the same channel.
#[derive(Clone)]
pub struct Channel {
    inner: Rc<ChannelInner>,
}

impl Channel {
    pub fn new(buffer: Buffer) -> Self {
        Self {
            inner: Rc::new(ChannelInner {
                id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
                buffer,
                queue: RefCell::new(VecDeque::new()),
                takers: RefCell::new(VecDeque::new()),
                closed: Cell::new(false),
            }),
        }
    }

    /// A channel connected to nothing. Takes on it never resolve unless
    /// someone puts to it by hand.
    pub fn detached() -> Self {
        Self::new(Buffer::None)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Deliver a message to the oldest waiting taker, or buffer it.
    pub fn put(&self, message: Value) {
        if self.is_closed() {
            return;
        }
        let mut message = message;
        loop {
            let Some(taker) = self.inner.takers.borrow_mut().pop_front() else {
                break;
            };
            match taker.send(message) {
                Ok(()) => return,
                Err(returned) => message = returned,
            }
        }

        let mut queue = self.inner.queue.borrow_mut();
        match self.inner.buffer {
            Buffer::Expanding => queue.push_back(message),
            Buffer::Sliding(limit) => {
                if limit == 0 {
                    return;
                }
                while queue.len() >= limit {
                    queue.pop_front();
                }
                queue.push_back(message);
            }
            Buffer::Dropping(limit) => {
                if queue.len() < limit {
                    queue.push_back(message);
                }
            }
            Buffer::None => {}
        }
    }

    /// Take the next message. Resolves with `None` once the channel is
    /// closed and drained.
    ///
    /// The taker is registered when this is called, not when the future is
    /// first polled.
    pub fn take(&self) -> impl Future<Output = Option<Value>> + use<> {
        let buffered = self.inner.queue.borrow_mut().pop_front();
        let waiting = match (&buffered, self.is_closed()) {
            (None, false) => {
                let (tx, rx) = oneshot::channel();
                self.inner.takers.borrow_mut().push_back(tx);
                Some(rx)
            }
            _ => None,
        };
        async move {
            if buffered.is_some() {
                return buffered;
            }
            match waiting {
                Some(rx) => rx.await.ok(),
                None => None,
            }
        }
    }

    /// Remove and return every buffered message.
    pub fn flush(&self) -> Vec<Value> {
        self.inner.queue.borrow_mut().drain(..).collect()
    }

    /// Close the channel. Pending takers resolve with `None`.
    pub fn close(&self) {
        self.inner.closed.set(true);
        self.inner.takers.borrow_mut().clear();
    }

    pub(crate) fn downgrade(&self) -> Weak<ChannelInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ChannelInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("buffer", &self.inner.buffer)
            .field("buffered", &self.inner.queue.borrow().len())
            .finish()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel#{}", self.inner.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_resolves_waiting_taker_first() {
        let channel = Channel::new(Buffer::Expanding);
        let first = channel.take();
        channel.put(json!(1));
        channel.put(json!(2));
        assert_eq!(first.await, Some(json!(1)));
        assert_eq!(channel.take().await, Some(json!(2)));
    }

    #[test]
    fn sliding_buffer_keeps_newest() {
        let channel = Channel::new(Buffer::Sliding(1));
        channel.put(json!(1));
        channel.put(json!(2));
        assert_eq!(channel.flush(), vec![json!(2)]);
    }

    #[test]
    fn dropping_buffer_keeps_oldest() {
        let channel = Channel::new(Buffer::Dropping(2));
        for n in 0..5 {
            channel.put(json!(n));
        }
        assert_eq!(channel.flush(), vec![json!(0), json!(1)]);
    }

    #[tokio::test]
    async fn close_releases_takers() {
        let channel = Channel::new(Buffer::Expanding);
        let pending = channel.take();
        channel.close();
        assert_eq!(pending.await, None);
        channel.put(json!(1));
        assert!(channel.flush().is_empty());
    }

    #[test]
    fn handles_compare_by_identity() {
        let a = Channel::detached();
        assert_eq!(a, a.clone());
        assert_ne!(a, Channel::detached());
    }
}
