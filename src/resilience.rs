//! Per-connection circuit breakers, per-bucket rate limiting, and retry backoff.
//!
//! Both stateful pieces are pure state machines over an injected [`Clock`](crate::clock::Clock):
//! they never perform I/O, and only the executor reports outcomes into them. Each breaker and
//! each bucket sits behind its own lock, so one organization's traffic never contends with
//! another's.

pub mod backoff;
pub mod breaker;
pub mod limiter;

pub use backoff::*;
pub use breaker::*;
pub use limiter::*;
