//! HTTP transport for the CRM source
//!
//! A reqwest client with per-request timeouts, bounded retries with backoff
//! for throttling and server errors, and a governor token bucket in front of
//! every attempt.

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, RequestConfig};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
