//! Subscriber capability and handles.

use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::message::BusMessage;

/// Uniform callback capability: one async method receiving the payload and
/// its message id.
///
/// Returning an error (or panicking) is isolated by the bus: it is logged and
/// sibling subscribers of the same publish still run.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn on_message(&self, msg: BusMessage, msg_id: u64) -> Result<()>;
}

/// Shared handle to a subscriber.
///
/// Equality and hashing use pointer identity, so registering the same handle
/// under several matching keys still delivers once per publish. Clone the
/// handle to unsubscribe later.
#[derive(Clone)]
pub struct SubscriberRef(Arc<dyn Subscriber>);

impl SubscriberRef {
    pub fn new<S: Subscriber + 'static>(subscriber: S) -> Self {
        Self(Arc::new(subscriber))
    }

    pub fn from_arc(subscriber: Arc<dyn Subscriber>) -> Self {
        Self(subscriber)
    }

    /// Wrap an async closure `Fn(BusMessage, u64) -> Future<Output = Result<()>>`.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(BusMessage, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::new(FnSubscriber(f))
    }

    pub(crate) async fn call(&self, msg: BusMessage, msg_id: u64) -> Result<()> {
        self.0.on_message(msg, msg_id).await
    }

    #[inline]
    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for SubscriberRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for SubscriberRef {}

impl Hash for SubscriberRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl std::fmt::Debug for SubscriberRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SubscriberRef({:#x})", self.addr())
    }
}

/// Adapter turning an async closure into a [`Subscriber`].
struct FnSubscriber<F>(F);

#[async_trait]
impl<F, Fut> Subscriber for FnSubscriber<F>
where
    F: Fn(BusMessage, u64) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn on_message(&self, msg: BusMessage, msg_id: u64) -> Result<()> {
        (self.0)(msg, msg_id).await
    }
}
