//! API layer
//!
//! HTTP handlers for:
//! - Protected routes behind the OAuth1 gate
//! - Public login, failure and logout pages
//! - Metrics (Prometheus)

mod account;
pub mod metrics;
mod pages;

pub use account::protected_router;
pub use metrics::metrics_router;
pub use pages::auth_pages_router;
