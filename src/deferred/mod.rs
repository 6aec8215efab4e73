//! Deferred request handling.
//!
//! # Data Flow
//! ```text
//! Process owner                     Server framework
//!     │ new(factory)                    │
//!     │ register proxy ────────────────▶│ call(request)
//!     │ bind listener                   │   ├─ handler set?   → dispatch now   (fast path)
//!     │ init() ──▶ spawn factory        │   └─ otherwise      → await signal   (slow path)
//!     │              │                  │
//!     │              ▼                  │
//!     │      contract.rs (validate)     │
//!     │              │                  │
//!     │              ▼                  │
//!     │      proxy.rs (store handler)   │
//!     │              │                  │
//!     │              ▼                  │
//!     └◀──── signal.rs (Ready / Failed) ┴──▶ waiting requests resume
//! ```
//!
//! # Design Decisions
//! - The handler is write-once; there is no reload
//! - Failures are never retried; every waiter and every later request gets
//!   the same error through the service's error channel
//! - The factory is `FnOnce`: repeat `init()` calls observe the first run

pub mod contract;
pub mod error;
pub mod proxy;
pub mod signal;

pub use contract::IntoRequestHandler;
pub use error::{BoxError, DeferredError, InitError};
pub use proxy::{AxumService, DeferredHandler, HandlerState};
pub use signal::{ReadySignal, Readiness};
