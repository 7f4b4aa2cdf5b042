use crate::auth::TokenVerifier;
use crate::rate_limit::RateLimiter;
use matchmaker::Coordinator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub rate_limiter: Arc<RateLimiter>,
    pub tokens: Arc<TokenVerifier>,
}

impl AppState {
    pub fn new(coordinator: Coordinator, jwt_secret: &str) -> Self {
        Self {
            coordinator,
            rate_limiter: Arc::new(RateLimiter::new()),
            tokens: Arc::new(TokenVerifier::new(jwt_secret)),
        }
    }
}
