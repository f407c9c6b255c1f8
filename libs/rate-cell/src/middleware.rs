use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::limiter::RateLimiter;
use crate::models::EndpointClass;

const CLIENT_IP_HEADER: &str = "x-forwarded-for";

fn client_ip<B>(req: &Request<B>, connect_info: Option<&SocketAddr>) -> String {
    req.headers()
        .get(CLIENT_IP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| connect_info.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let class = EndpointClass::classify(req.uri().path());
    let ip = client_ip(&req, connect_info.as_ref().map(|ci| &ci.0));

    let decision = limiter.check(&ip, class).await;

    if !decision.allowed {
        warn!("rate limit exceeded for {} on {} class", ip, class.as_str());
        let mut response = shared_models::error::AppError::RateLimited {
            retry_after_secs: 1,
        }
        .into_response();
        apply_headers(&mut response, &decision, class);
        return response;
    }

    let mut response = next.run(req).await;
    apply_headers(&mut response, &decision, class);
    response
}

fn apply_headers(
    response: &mut Response,
    decision: &crate::limiter::RateLimitDecision,
    class: EndpointClass,
) {
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str("60") {
        headers.insert("x-ratelimit-reset", v);
    }
    if let Ok(v) = HeaderValue::from_str(class.as_str()) {
        headers.insert("x-ratelimit-type", v);
    }
}
