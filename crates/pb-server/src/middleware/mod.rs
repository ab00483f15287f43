//! HTTP middleware: trace ID, authentication, and rate limiting.

pub mod auth;
pub mod rate_limit;
pub mod trace_id;
