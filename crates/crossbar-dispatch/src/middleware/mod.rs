//! Built-in pipeline middlewares.
//!
//! Inbound, in execution order: timeout (−50) → permission (−25) →
//! rate limit (−10) → unwrap (100, last before the handler). Outbound:
//! wrap (100, first after the handler). The order constants are stable
//! across releases; user middlewares slot in between by picking orders
//! around them.

mod permission;
mod rate_limit;
mod timeout;
mod unwrap;
mod wrap;

pub use permission::PermissionMiddleware;
pub use rate_limit::RateLimitMiddleware;
pub use timeout::TimeoutMiddleware;
pub use unwrap::UnwrapMiddleware;
pub use wrap::WrapMiddleware;

/// Timeout stage order.
pub const TIMEOUT_ORDER: i32 = -50;
/// Permission stage order.
pub const PERMISSION_ORDER: i32 = -25;
/// Rate-limit stage order.
pub const RATE_LIMIT_ORDER: i32 = -10;
/// Unwrap stage order (runs last before the handler).
pub const UNWRAP_ORDER: i32 = 100;
/// Wrap stage order (runs first after the handler).
pub const WRAP_ORDER: i32 = 100;
