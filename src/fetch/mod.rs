//! Polite network access: per-source rate limiting plus bounded retries

mod http;
mod limiter;
mod retry;

pub use http::{FetchError, FetchResult, HttpClient, HttpConfig, PoliteClient};
pub use limiter::{Cancelled, RateLimiter, interval_for};
pub use retry::{ErrorClass, RetryError, RetryPolicy};
