use std::time::Instant;

/// Route-prefix classification used to pick which (R, B) pair applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Auth,
    Appointment,
    Doctor,
    Default,
}

impl EndpointClass {
    pub fn classify(path: &str) -> Self {
        if path.starts_with("/api/v1/auth") {
            EndpointClass::Auth
        } else if path.starts_with("/api/v1/appointments") {
            EndpointClass::Appointment
        } else if path.starts_with("/api/v1/doctors") || path.starts_with("/api/v1/specialties") {
            EndpointClass::Doctor
        } else {
            EndpointClass::Default
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Auth => "auth",
            EndpointClass::Appointment => "appointment",
            EndpointClass::Doctor => "doctor",
            EndpointClass::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BucketConfig {
    pub requests_per_second: u32,
    pub burst: u32,
}

/// A single token bucket keyed by (client ip, endpoint class). Refills continuously at
/// `requests_per_second`, capped at `burst`.
#[derive(Debug)]
pub struct TokenBucket {
    pub tokens: f64,
    pub capacity: f64,
    pub refill_per_sec: f64,
    pub last_refill: Instant,
    pub last_seen: Instant,
}

impl TokenBucket {
    pub fn new(config: BucketConfig) -> Self {
        let now = Instant::now();
        Self {
            tokens: config.burst as f64,
            capacity: config.burst as f64,
            refill_per_sec: config.requests_per_second as f64,
            last_refill: now,
            last_seen: now,
        }
    }

    pub fn try_consume(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        self.last_seen = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn remaining(&self) -> u32 {
        self.tokens.floor().max(0.0) as u32
    }

    pub fn idle_for(&self, threshold: std::time::Duration) -> bool {
        self.last_seen.elapsed() > threshold
    }
}
