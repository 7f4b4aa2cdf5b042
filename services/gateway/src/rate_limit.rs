use crate::error::AppError;
use dashmap::DashMap;
use std::time::Instant;
use types::ids::UserId;

/// Bucket shape for one kind of traffic
#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    pub name: &'static str,
    pub capacity: u32,
    /// Tokens added per second
    pub refill_rate: f64,
}

/// WebSocket handshakes per user
pub const WS_CONNECT: RatePolicy = RatePolicy {
    name: "ws_connections",
    capacity: 10,
    refill_rate: 1.0,
};

/// Inbound frames per user
pub const WS_MESSAGE: RatePolicy = RatePolicy {
    name: "ws_messages",
    capacity: 20,
    refill_rate: 5.0,
};

#[derive(Clone)]
struct Bucket {
    capacity: u32,
    tokens: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl Bucket {
    fn new(policy: &RatePolicy) -> Self {
        Self {
            capacity: policy.capacity,
            tokens: policy.capacity as f64,
            refill_rate: policy.refill_rate,
            last_update: Instant::now(),
        }
    }

    fn allow_request(&mut self, tokens: u32) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = f64::min(self.capacity as f64, self.tokens + elapsed * self.refill_rate);
        self.last_update = now;

        if self.tokens >= tokens as f64 {
            self.tokens -= tokens as f64;
            true
        } else {
            false
        }
    }
}

/// Per-user token buckets keyed by `"{user}:{policy}"`
#[derive(Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, user: &UserId, policy: &RatePolicy) -> Result<(), AppError> {
        let key = format!("{}:{}", user, policy.name);
        let mut bucket = self.buckets.entry(key).or_insert_with(|| Bucket::new(policy));

        if bucket.allow_request(1) {
            Ok(())
        } else {
            Err(AppError::RateLimitExceeded(format!("{} for {}", policy.name, user)))
        }
    }

    /// Drop buckets that have refilled completely
    pub fn prune(&self) {
        let now = Instant::now();
        self.buckets.retain(|_, bucket| {
            let elapsed = now.duration_since(bucket.last_update).as_secs_f64();
            bucket.tokens + elapsed * bucket.refill_rate < bucket.capacity as f64
        });
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }
}
