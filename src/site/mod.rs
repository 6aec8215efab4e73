//! Static site application: the slow "prepare" step served through the
//! deferred handler.
//!
//! # Data Flow
//! ```text
//! site_dir on disk
//!     → builder.rs (walk, read every file, index by route)
//!     → pages.rs (route + content type per file)
//!     → axum Router (in-memory lookup per request)
//! ```
//!
//! # Design Decisions
//! - Everything is loaded up front, so the router never touches the disk
//! - An empty site yields no router; the deferred handler treats that as a
//!   failed initialization rather than serving 404s forever

pub mod builder;
pub mod pages;

pub use builder::{prepare, SiteError, SiteOptions};
pub use pages::Page;
