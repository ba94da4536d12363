//! # Middleware Module
//!
//! Rate limiting and other middleware for the Paceline HTTP API.
//!
//! ## Configuration
//!
//! Rate limiting is configured via environment variable or config file:
//! - `PACELINE_RATE_LIMIT`: Requests per second (default: 100)
//! - the `rate_limit` key in the TOML config file (env wins)

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Default rate limit: 100 requests per second.
const DEFAULT_RPS: NonZeroU32 = NonZeroU32::new(100).unwrap();

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Global rate limiter type alias.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a new global rate limiter.
///
/// # Arguments
/// * `requests_per_second` - Maximum requests per second
///
/// # Returns
/// A thread-safe rate limiter wrapped in Arc.
pub fn create_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(DEFAULT_RPS);
    let quota = Quota::per_second(rps);
    Arc::new(RateLimiter::direct(quota))
}

/// Resolve the effective rate limit.
///
/// `PACELINE_RATE_LIMIT` overrides the config file value; 100 is the
/// fallback when neither is set. A value of 0 disables rate limiting.
pub fn resolve_rate_limit(config_value: Option<u32>) -> u32 {
    std::env::var("PACELINE_RATE_LIMIT")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(config_value)
        .unwrap_or(100)
}

/// Rate limiting middleware.
///
/// Checks the global rate limiter before allowing requests through.
/// Returns 429 Too Many Requests if the limit is exceeded.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    match limiter.check() {
        Ok(_) => Ok(next.run(request).await),
        Err(_) => {
            tracing::warn!("Rate limit exceeded");
            Err((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rate_limiter() {
        let limiter = create_rate_limiter(50);
        // Should allow first request
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_create_rate_limiter_zero_defaults() {
        let limiter = create_rate_limiter(0);
        // Should use default of 100
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_resolve_rate_limit_prefers_config_when_env_unset() {
        // SAFETY: This is a unit test running in isolation.
        unsafe { std::env::remove_var("PACELINE_RATE_LIMIT") };
        assert_eq!(resolve_rate_limit(Some(25)), 25);
        assert_eq!(resolve_rate_limit(None), 100);
    }
}
