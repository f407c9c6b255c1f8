use std::sync::Arc;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            redis_addr: String::new(),
            redis_password: None,
            cache_default_ttl_secs: 900,
            rate_limit_enabled: false,
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            allowed_origins: vec![],
            port: 8080,
            environment: "test".to_string(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({ "alg": "HS256", "typ": "JWT" });
        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp() as u64,
            "exp": exp.timestamp() as u64,
            "aud": "authenticated"
        });

        let header_encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap());
        let payload_encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap());
        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("invalid JWT secret");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}.{}", header_encoded, payload_encoded, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser, _secret: &str) -> String {
        let header = json!({ "alg": "HS256", "typ": "JWT" });
        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": Utc::now().timestamp(),
            "exp": (Utc::now() + Duration::hours(24)).timestamp()
        });

        let header_encoded = URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = URL_SAFE_NO_PAD.encode(payload.to_string());
        let invalid_signature = URL_SAFE_NO_PAD.encode("invalid_signature");

        format!("{}.{}.{}", header_encoded, payload_encoded, invalid_signature)
    }
}

/// Canned PostgREST-shaped JSON bodies for `wiremock` fixtures in the scheduling cells' tests.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn specialty_response(id: Uuid, name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "description": null,
            "is_active": true,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    pub fn doctor_response(id: Uuid, specialty_id: Uuid, name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "specialty_id": specialty_id,
            "is_active": true,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    pub fn appointment_response(
        id: Uuid,
        user_id: &str,
        doctor_id: Uuid,
        start: &str,
        end: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": user_id,
            "doctor_id": doctor_id,
            "start_time": start,
            "end_time": end,
            "duration_minutes": 30,
            "status": "scheduled",
            "appointment_type": "general",
            "notes": null,
            "reminder_type": "email",
            "reminder_lead_minutes": 60,
            "reminder_sent": false,
            "confirmed_at": null,
            "cancelled_at": null,
            "cancelled_by": null,
            "cancellation_reason": null,
            "rescheduled_from_id": null,
            "rescheduled_to_id": null,
            "reschedule_count": 0,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    pub fn time_slot_response(
        id: Uuid,
        doctor_id: Uuid,
        date: &str,
        start: &str,
        end: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "doctor_id": doctor_id,
            "date": date,
            "start": start,
            "end": end,
            "duration_minutes": 30,
            "status": status,
            "appointment_id": null,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({ "error": { "message": message, "code": code } })
    }
}
