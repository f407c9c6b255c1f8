pub mod limiter;
pub mod middleware;
pub mod models;

pub use limiter::RateLimiter;
pub use middleware::rate_limit_middleware;
pub use models::EndpointClass;
