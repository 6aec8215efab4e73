//! One-shot readiness signal with multi-waiter fan-out.
//!
//! # Design Decisions
//! - Built on `tokio::sync::watch`: every waiter sees the same settled value
//!   regardless of whether it subscribed before or after settlement
//! - The resolver only ever moves the value out of `Pending`; later settle
//!   attempts are ignored
//! - Dropping the resolver while pending wakes waiters with `Abandoned`

use std::future::IntoFuture;

use futures_util::future::BoxFuture;
use tokio::sync::watch;

use super::error::InitError;

/// Snapshot of the initialization outcome.
#[derive(Debug, Clone)]
pub enum Readiness<H> {
    /// Initialization has not settled yet.
    Pending,
    /// The handler is available.
    Ready(H),
    /// Initialization failed permanently.
    Failed(InitError),
}

impl<H: Clone> Readiness<H> {
    /// Whether initialization is still outstanding.
    pub fn is_pending(&self) -> bool {
        matches!(self, Readiness::Pending)
    }

    /// The settled outcome, or `None` while pending.
    pub fn outcome(&self) -> Option<Result<H, InitError>> {
        match self {
            Readiness::Pending => None,
            Readiness::Ready(handler) => Some(Ok(handler.clone())),
            Readiness::Failed(err) => Some(Err(err.clone())),
        }
    }
}

/// Create a linked resolver and signal, initially pending.
pub(crate) fn channel<H>() -> (Resolver<H>, ReadySignal<H>) {
    let (tx, rx) = watch::channel(Readiness::Pending);
    (Resolver { tx }, ReadySignal { rx })
}

/// Write side of the signal. Held by the proxy.
#[derive(Debug)]
pub(crate) struct Resolver<H> {
    tx: watch::Sender<Readiness<H>>,
}

impl<H> Resolver<H> {
    /// Settle the signal. Returns `false` if it had already settled.
    pub(crate) fn settle(&self, outcome: Result<H, InitError>) -> bool {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|current| {
            if !matches!(current, Readiness::Pending) {
                return false;
            }
            match outcome.take() {
                Some(Ok(handler)) => *current = Readiness::Ready(handler),
                Some(Err(err)) => *current = Readiness::Failed(err),
                None => return false,
            }
            true
        })
    }

    /// Whether the signal settled as a failure.
    pub(crate) fn is_failed(&self) -> bool {
        matches!(*self.tx.borrow(), Readiness::Failed(_))
    }

    /// A new read handle observing this resolver.
    pub(crate) fn subscribe(&self) -> ReadySignal<H> {
        ReadySignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of the signal: an awaitable, cloneable view of initialization.
///
/// `signal.await` (or [`ReadySignal::wait`]) resolves to the handler once
/// initialization succeeds, or to the [`InitError`] once it fails.
#[derive(Debug, Clone)]
pub struct ReadySignal<H> {
    rx: watch::Receiver<Readiness<H>>,
}

impl<H: Clone> ReadySignal<H> {
    /// Current state without waiting.
    pub fn readiness(&self) -> Readiness<H> {
        self.rx.borrow().clone()
    }

    /// Whether initialization has succeeded or failed.
    pub fn is_settled(&self) -> bool {
        !self.rx.borrow().is_pending()
    }

    /// Wait until initialization settles.
    pub async fn wait(&self) -> Result<H, InitError> {
        let mut rx = self.rx.clone();
        loop {
            if let Some(outcome) = rx.borrow_and_update().outcome() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().outcome().unwrap_or(Err(InitError::Abandoned));
            }
        }
    }
}

impl<H> IntoFuture for ReadySignal<H>
where
    H: Clone + Send + Sync + 'static,
{
    type Output = Result<H, InitError>;
    type IntoFuture = BoxFuture<'static, Result<H, InitError>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}
