//! The deferred handler proxy.
//!
//! # Responsibilities
//! - Hold the handler factory until the process owner triggers it
//! - Run the factory once, validate its output, publish the outcome
//! - Serve requests: immediately when the handler is known, otherwise after
//!   the readiness signal settles
//!
//! # State Machine
//! ```text
//! Uninitialized --init()--> Initializing --factory ok--> Ready
//!                                        --factory err--> Failed
//! ```

use std::any::Any;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::task::{Context, Poll};
use std::time::Instant;

use axum::http::Request;
use axum::response::{IntoResponse, Response};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::task::noop_waker_ref;
use tower::{Service, ServiceExt};

use super::contract::IntoRequestHandler;
use super::error::{BoxError, DeferredError, InitError};
use super::signal::{self, ReadySignal, Resolver};
use crate::observability::metrics;

type Factory<H> = Box<dyn FnOnce() -> BoxFuture<'static, Result<H, InitError>> + Send>;

/// Externally visible lifecycle of a [`DeferredHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// `init()` has not been called.
    Uninitialized,
    /// The factory is running.
    Initializing,
    /// Requests go straight to the resolved handler.
    Ready,
    /// Every request receives the initialization error.
    Failed,
}

impl HandlerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerState::Uninitialized => "uninitialized",
            HandlerState::Initializing => "initializing",
            HandlerState::Ready => "ready",
            HandlerState::Failed => "failed",
        }
    }
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request handler whose implementation arrives later.
///
/// Register it with the server before binding, bind, then call
/// [`DeferredHandler::init`]. Requests that arrive in between wait for the
/// factory; requests after it finishes are dispatched without waiting.
///
/// Clones share the same state.
pub struct DeferredHandler<H> {
    inner: Arc<Inner<H>>,
}

struct Inner<H> {
    /// Taken by the first `init()`.
    factory: Mutex<Option<Factory<H>>>,
    triggered: AtomicBool,
    /// Set before the signal is published as ready.
    handler: OnceLock<H>,
    resolver: Resolver<H>,
}

impl<H> Clone for DeferredHandler<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H> DeferredHandler<H>
where
    H: Clone + Send + Sync + 'static,
{
    /// Create a proxy around an asynchronous handler factory.
    ///
    /// The factory is not called here.
    pub fn new<F, Fut, T, E>(factory: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: IntoRequestHandler<Handler = H> + 'static,
        E: Into<BoxError> + 'static,
    {
        let factory: Factory<H> = Box::new(move || {
            async move {
                let produced = factory().await.map_err(InitError::factory)?;
                produced.into_request_handler()
            }
            .boxed()
        });
        let (resolver, _) = signal::channel();

        Self {
            inner: Arc::new(Inner {
                factory: Mutex::new(Some(factory)),
                triggered: AtomicBool::new(false),
                handler: OnceLock::new(),
                resolver,
            }),
        }
    }

    /// Create a proxy around a factory that produces its handler synchronously.
    pub fn from_sync<F, T, E>(factory: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: IntoRequestHandler<Handler = H> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        Self::new(move || std::future::ready(factory()))
    }

    /// Run the handler factory in the background and return the readiness
    /// signal.
    ///
    /// Only the first call runs the factory. Later calls log a warning and
    /// return a signal observing the same outcome.
    ///
    /// Outside of a Tokio runtime nothing is started: the factory stays in
    /// place, an error is logged, and a later call from inside a runtime
    /// still initializes the handler.
    pub fn init(&self) -> ReadySignal<H> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Deferred handler init() called outside of a Tokio runtime"
                );
                return self.ready_signal();
            }
        };

        let factory = {
            let mut slot = self
                .inner
                .factory
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let factory = slot.take();
            if factory.is_some() {
                self.inner.triggered.store(true, Ordering::Release);
            }
            factory
        };

        let Some(factory) = factory else {
            tracing::warn!(
                state = %self.state(),
                "Deferred handler already initialized, reusing readiness signal"
            );
            return self.ready_signal();
        };

        tracing::info!("Initializing deferred handler");
        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            let started = Instant::now();
            let outcome = match AssertUnwindSafe(factory()).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(InitError::Panicked(panic_message(payload.as_ref()))),
            };
            let elapsed = started.elapsed();

            match outcome {
                Ok(handler) => {
                    let _ = inner.handler.set(handler.clone());
                    inner.resolver.settle(Ok(handler));
                    metrics::record_init("ready", elapsed);
                    tracing::info!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Deferred handler ready"
                    );
                }
                Err(err) => {
                    inner.resolver.settle(Err(err.clone()));
                    metrics::record_init("failed", elapsed);
                    tracing::error!(
                        error = %err,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Deferred handler failed to initialize"
                    );
                }
            }
        });

        self.ready_signal()
    }

    /// The readiness signal. Valid before and after `init()`.
    pub fn ready_signal(&self) -> ReadySignal<H> {
        self.inner.resolver.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HandlerState {
        if self.inner.handler.get().is_some() {
            HandlerState::Ready
        } else if self.inner.resolver.is_failed() {
            HandlerState::Failed
        } else if self.inner.triggered.load(Ordering::Acquire) {
            HandlerState::Initializing
        } else {
            HandlerState::Uninitialized
        }
    }

    /// Adapt into a service that never errors, answering initialization and
    /// handler failures with an error response. This is the shape axum's
    /// `fallback_service` and `route_service` expect.
    pub fn into_axum_service(self) -> AxumService<H> {
        AxumService { inner: self }
    }
}

impl<H> fmt::Debug for DeferredHandler<H>
where
    H: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredHandler")
            .field("state", &self.state())
            .finish()
    }
}

impl<H, B> Service<Request<B>> for DeferredHandler<H>
where
    H: Service<Request<B>> + Clone + Send + Sync + 'static,
    H::Response: Send + 'static,
    H::Error: Into<BoxError>,
    H::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = H::Response;
    type Error = DeferredError;
    type Future = BoxFuture<'static, Result<H::Response, DeferredError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        if let Some(handler) = self.inner.handler.get() {
            metrics::record_dispatch("fast");
            return dispatch(handler.clone(), request);
        }

        metrics::record_dispatch("slow");
        tracing::debug!(
            method = %request.method(),
            path = %request.uri().path(),
            "Request waiting for deferred handler"
        );
        let signal = self.ready_signal();
        Box::pin(async move {
            let handler = {
                let _waiting = metrics::WaitingGuard::new();
                signal.wait().await?
            };
            dispatch(handler, request).await
        })
    }
}

/// Call the handler right away when it reports ready; otherwise let
/// `oneshot` drive its readiness.
fn dispatch<H, B>(
    mut handler: H,
    request: Request<B>,
) -> BoxFuture<'static, Result<H::Response, DeferredError>>
where
    H: Service<Request<B>> + Send + 'static,
    H::Response: Send + 'static,
    H::Error: Into<BoxError>,
    H::Future: Send + 'static,
    B: Send + 'static,
{
    let mut cx = Context::from_waker(noop_waker_ref());
    match handler.poll_ready(&mut cx) {
        Poll::Ready(Ok(())) => {
            let response = handler.call(request);
            Box::pin(async move {
                response
                    .await
                    .map_err(|e| DeferredError::Handler(e.into()))
            })
        }
        Poll::Ready(Err(e)) => {
            let err = DeferredError::Handler(e.into());
            Box::pin(async move { Err(err) })
        }
        Poll::Pending => Box::pin(async move {
            handler
                .oneshot(request)
                .await
                .map_err(|e| DeferredError::Handler(e.into()))
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A [`DeferredHandler`] whose errors are turned into responses.
pub struct AxumService<H> {
    inner: DeferredHandler<H>,
}

impl<H> Clone for AxumService<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H, B> Service<Request<B>> for AxumService<H>
where
    H: Service<Request<B>> + Clone + Send + Sync + 'static,
    H::Response: IntoResponse + Send + 'static,
    H::Error: Into<BoxError>,
    H::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let response = self.inner.call(request);
        Box::pin(async move {
            Ok(match response.await {
                Ok(response) => response.into_response(),
                Err(err) => err.into_response(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Response as HttpResponse, StatusCode};
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tower::service_fn;
    use tower::util::BoxCloneSyncService;

    type TestHandler = BoxCloneSyncService<Request<String>, HttpResponse<String>, Infallible>;

    /// Echoes the request path and counts calls at call time.
    fn echo(calls: Arc<AtomicUsize>) -> TestHandler {
        BoxCloneSyncService::new(service_fn(move |req: Request<String>| {
            calls.fetch_add(1, Ordering::SeqCst);
            let path = req.uri().path().to_string();
            async move { Ok::<_, Infallible>(HttpResponse::new(path)) }
        }))
    }

    fn request(path: &str) -> Request<String> {
        Request::builder().uri(path).body(String::new()).unwrap()
    }

    #[tokio::test]
    async fn factory_not_invoked_without_init() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let proxy = {
            let invoked = invoked.clone();
            let calls = calls.clone();
            DeferredHandler::from_sync(move || {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(echo(calls))
            })
        };
        assert_eq!(proxy.state(), HandlerState::Uninitialized);

        let mut svc = proxy.clone();
        let waited =
            tokio::time::timeout(Duration::from_millis(50), svc.call(request("/"))).await;
        assert!(waited.is_err(), "request must stay pending without init()");
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!proxy.ready_signal().is_settled());
    }

    #[tokio::test]
    async fn suspended_request_reaches_handler_once_ready() {
        let calls = Arc::new(AtomicUsize::new(0));
        let proxy = {
            let calls = calls.clone();
            DeferredHandler::from_sync(move || Ok::<_, Infallible>(echo(calls)))
        };

        let mut svc = proxy.clone();
        let pending = svc.call(request("/before"));
        proxy.init();

        let response = pending.await.unwrap();
        assert_eq!(response.body(), "/before");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(proxy.state(), HandlerState::Ready);
    }

    #[tokio::test]
    async fn ready_handler_invoked_synchronously() {
        let calls = Arc::new(AtomicUsize::new(0));
        let proxy = {
            let calls = calls.clone();
            DeferredHandler::from_sync(move || Ok::<_, Infallible>(echo(calls)))
        };
        proxy.init().await.unwrap();

        let mut svc = proxy.clone();
        let response = svc.call(request("/after"));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "handler runs inside call()");

        assert_eq!(response.await.unwrap().body(), "/after");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn waiting_requests_keep_their_own_requests() {
        let calls = Arc::new(AtomicUsize::new(0));
        let proxy = {
            let calls = calls.clone();
            DeferredHandler::new(move || async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, Infallible>(echo(calls))
            })
        };

        let waiting: Vec<_> = (0..10)
            .map(|i| {
                let mut svc = proxy.clone();
                let path = format!("/page/{}", i);
                tokio::spawn(async move {
                    let response = svc.call(request(&path)).await.unwrap();
                    (path, response.into_body())
                })
            })
            .collect();

        tokio::task::yield_now().await;
        proxy.init();

        for result in futures_util::future::join_all(waiting).await {
            let (path, body) = result.unwrap();
            assert_eq!(path, body);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn async_factory_settles_after_its_work() {
        let proxy = DeferredHandler::new(|| async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, Infallible>(echo(Arc::new(AtomicUsize::new(0))))
        });

        let signal = proxy.init();
        assert!(!signal.is_settled());
        assert_eq!(proxy.state(), HandlerState::Initializing);

        let handler = signal.await.unwrap();
        let response = handler.oneshot(request("/x")).await.unwrap();
        assert_eq!(response.body(), "/x");
        assert_eq!(proxy.state(), HandlerState::Ready);
    }

    #[tokio::test]
    async fn non_handler_value_rejects_init() {
        let proxy: DeferredHandler<TestHandler> =
            DeferredHandler::from_sync(|| Ok::<Option<TestHandler>, Infallible>(None));

        let err = proxy.init().await.err().expect("init should fail");
        assert!(matches!(err, InitError::Contract { .. }));
        assert!(err.to_string().contains("Router"));

        let err = proxy.ready_signal().await.err().expect("signal should fail");
        assert!(matches!(err, InitError::Contract { .. }));
        assert_eq!(proxy.state(), HandlerState::Failed);
    }

    #[tokio::test]
    async fn factory_error_replayed_to_every_request() {
        let proxy: DeferredHandler<TestHandler> = DeferredHandler::new(|| async {
            Err::<TestHandler, _>(io::Error::new(io::ErrorKind::Other, "prepare failed"))
        });

        let mut svc = proxy.clone();
        let before = svc.call(request("/before"));
        let err = proxy.init().await.err().expect("init should fail");
        assert_eq!(err.to_string(), "prepare failed");

        let before = before.await.unwrap_err();
        assert_eq!(
            before.init_error().map(|e| e.to_string()).as_deref(),
            Some("prepare failed")
        );

        let after = svc.call(request("/after")).await.unwrap_err();
        assert!(matches!(after, DeferredError::Init(InitError::Factory(_))));
        assert_eq!(after.to_string(), "prepare failed");
        assert_eq!(proxy.state(), HandlerState::Failed);
    }

    #[tokio::test]
    async fn repeated_init_runs_factory_once() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let proxy = {
            let invoked = invoked.clone();
            DeferredHandler::from_sync(move || {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(echo(Arc::new(AtomicUsize::new(0))))
            })
        };

        let first = proxy.init();
        let second = proxy.init();
        assert!(first.await.is_ok());
        assert!(second.await.is_ok());
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_factory_rejects() {
        let proxy: DeferredHandler<TestHandler> = DeferredHandler::new(|| async {
            if true {
                panic!("asset compiler crashed");
            }
            Ok::<TestHandler, Infallible>(echo(Arc::new(AtomicUsize::new(0))))
        });

        match proxy.init().await {
            Err(InitError::Panicked(msg)) => assert!(msg.contains("asset compiler crashed")),
            other => panic!("expected panic error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn init_without_runtime_keeps_factory_for_later() {
        let calls = Arc::new(AtomicUsize::new(0));
        let proxy = {
            let calls = calls.clone();
            DeferredHandler::from_sync(move || Ok::<_, Infallible>(echo(calls)))
        };

        let signal = proxy.init();
        assert_eq!(proxy.state(), HandlerState::Uninitialized);
        assert!(!signal.is_settled());

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let settled = runtime.block_on(async {
            let retried = proxy.init();
            tokio::time::timeout(Duration::from_millis(300), retried.wait()).await
        });
        assert!(matches!(settled, Ok(Ok(_))), "init inside a runtime must settle");
        assert!(signal.is_settled());
        assert_eq!(proxy.state(), HandlerState::Ready);

        let mut svc = proxy.clone();
        let response = runtime.block_on(svc.call(request("/later"))).unwrap();
        assert_eq!(response.into_body(), "/later");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_proxy_abandons_waiters() {
        let proxy: DeferredHandler<TestHandler> = DeferredHandler::from_sync(|| {
            Ok::<TestHandler, Infallible>(echo(Arc::new(AtomicUsize::new(0))))
        });
        let signal = proxy.ready_signal();
        drop(proxy);
        assert!(matches!(signal.await, Err(InitError::Abandoned)));
    }

    #[tokio::test]
    async fn axum_service_maps_failure_to_503() {
        let proxy: DeferredHandler<TestHandler> = DeferredHandler::new(|| async {
            Err::<TestHandler, _>(io::Error::new(io::ErrorKind::Other, "build failed"))
        });
        let _ = proxy.init().await;

        let response = proxy
            .into_axum_service()
            .oneshot(request("/"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
