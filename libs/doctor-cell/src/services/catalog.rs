use chrono::Utc;
use shared_database::SupabaseClient;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::models::{
    CreateDoctorRequest, CreateSpecialtyRequest, Doctor, DoctorError, PaginatedDoctors, Specialty,
    UpdateDoctorRequest,
};

/// Catalog half of the Calendar Store: specialties and doctors. Time slots / breaks live in
/// `SlotGeneratorService`; appointments live in `appointment-cell`.
pub struct CatalogService {
    db: SupabaseClient,
}

impl CatalogService {
    pub fn new(db: SupabaseClient) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_specialty(&self, req: CreateSpecialtyRequest) -> Result<Specialty, DoctorError> {
        if req.name.trim().is_empty() {
            return Err(DoctorError::Validation("specialty name must not be empty".into()));
        }

        let now = Utc::now();
        let row = serde_json::json!({
            "id": Uuid::new_v4(),
            "name": req.name,
            "description": req.description,
            "is_active": true,
            "created_at": now,
            "updated_at": now,
        });

        self.db
            .insert("specialties", &row)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_specialty(&self, id: Uuid) -> Result<Specialty, DoctorError> {
        let filter = format!("id=eq.{}", id);
        let rows: Vec<Specialty> = self
            .db
            .select("specialties", &filter)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))?;
        rows.into_iter().next().ok_or(DoctorError::SpecialtyNotFound)
    }

    #[instrument(skip(self))]
    pub async fn list_specialties(&self, active_only: bool) -> Result<Vec<Specialty>, DoctorError> {
        let filter = if active_only { "is_active=eq.true" } else { "" };
        self.db
            .select("specialties", filter)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn deactivate_specialty(&self, id: Uuid) -> Result<(), DoctorError> {
        let filter = format!("id=eq.{}", id);
        let patch = serde_json::json!({ "is_active": false, "updated_at": Utc::now() });
        let _: Vec<Specialty> = self
            .db
            .patch("specialties", &filter, &patch)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn create_doctor(&self, req: CreateDoctorRequest) -> Result<Doctor, DoctorError> {
        if req.name.trim().chars().count() < 2 {
            return Err(DoctorError::Validation("doctor name must be at least 2 characters".into()));
        }

        let specialty = self.get_specialty(req.specialty_id).await?;
        if !specialty.is_active {
            return Err(DoctorError::SpecialtyNotFound);
        }

        let now = Utc::now();
        let row = serde_json::json!({
            "id": Uuid::new_v4(),
            "name": req.name,
            "specialty_id": req.specialty_id,
            "is_active": true,
            "created_at": now,
            "updated_at": now,
        });

        let doctor: Doctor = self
            .db
            .insert("doctors", &row)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))?;

        debug!(doctor_id = %doctor.id, "doctor created");
        Ok(doctor)
    }

    #[instrument(skip(self))]
    pub async fn update_doctor(&self, id: Uuid, req: UpdateDoctorRequest) -> Result<Doctor, DoctorError> {
        if let Some(specialty_id) = req.specialty_id {
            let specialty = self.get_specialty(specialty_id).await?;
            if !specialty.is_active {
                return Err(DoctorError::SpecialtyNotFound);
            }
        }

        let mut patch = serde_json::Map::new();
        if let Some(name) = &req.name {
            if name.trim().chars().count() < 2 {
                return Err(DoctorError::Validation("doctor name must be at least 2 characters".into()));
            }
            patch.insert("name".into(), serde_json::json!(name));
        }
        if let Some(specialty_id) = req.specialty_id {
            patch.insert("specialty_id".into(), serde_json::json!(specialty_id));
        }
        if let Some(is_active) = req.is_active {
            patch.insert("is_active".into(), serde_json::json!(is_active));
        }
        patch.insert("updated_at".into(), serde_json::json!(Utc::now()));

        let filter = format!("id=eq.{}", id);
        let rows: Vec<Doctor> = self
            .db
            .patch("doctors", &filter, &serde_json::Value::Object(patch))
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))?;

        rows.into_iter().next().ok_or(DoctorError::NotFound)
    }

    #[instrument(skip(self))]
    pub async fn delete_doctor(&self, id: Uuid) -> Result<Doctor, DoctorError> {
        let doctor = self.get_doctor(id).await?;
        let filter = format!("id=eq.{}", id);
        self.db
            .delete("doctors", &filter)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))?;
        Ok(doctor)
    }

    #[instrument(skip(self))]
    pub async fn get_doctor(&self, id: Uuid) -> Result<Doctor, DoctorError> {
        let filter = format!("id=eq.{}", id);
        let rows: Vec<Doctor> = self
            .db
            .select("doctors", &filter)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))?;
        rows.into_iter().next().ok_or(DoctorError::NotFound)
    }

    #[instrument(skip(self))]
    pub async fn list_doctors(&self, specialty_id: Option<Uuid>) -> Result<Vec<Doctor>, DoctorError> {
        let filter = match specialty_id {
            Some(id) => format!("specialty_id=eq.{}&order=name.asc", id),
            None => "order=name.asc".to_string(),
        };
        self.db
            .select("doctors", &filter)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn list_doctors_paginated(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<PaginatedDoctors, DoctorError> {
        let limit = limit.clamp(1, 100);
        let offset = offset.max(0);

        if offset > 0 {
            warn!(offset, "paginated doctor listing requested with non-zero offset");
        }

        let filter = format!("order=name.asc&limit={}&offset={}", limit, offset);
        let data: Vec<Doctor> = self
            .db
            .select("doctors", &filter)
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))?;

        let all: Vec<Doctor> = self
            .db
            .select("doctors", "")
            .await
            .map_err(|e| DoctorError::Storage(e.to_string()))?;
        let total = all.len() as i64;
        let total_pages = if limit > 0 { (total + limit - 1) / limit } else { 0 };
        let current_page = if limit > 0 { offset / limit + 1 } else { 1 };

        Ok(PaginatedDoctors {
            data,
            total,
            limit,
            offset,
            total_pages,
            current_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_config::AppConfig;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn service_against(server: &MockServer) -> CatalogService {
        let config = AppConfig {
            supabase_url: server.uri(),
            supabase_anon_key: "anon".into(),
            supabase_jwt_secret: "secret".into(),
            redis_addr: String::new(),
            redis_password: None,
            cache_default_ttl_secs: 900,
            rate_limit_enabled: false,
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            allowed_origins: vec![],
            port: 8080,
            environment: "test".into(),
        };
        CatalogService::new(SupabaseClient::new(&config))
    }

    #[tokio::test]
    async fn create_doctor_rejects_short_name() {
        let server = MockServer::start().await;
        let svc = service_against(&server).await;

        let err = svc
            .create_doctor(CreateDoctorRequest {
                name: "A".into(),
                specialty_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DoctorError::Validation(_)));
    }

    #[tokio::test]
    async fn create_doctor_rejects_unknown_specialty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/specialties"))
            .and(query_param("id", "eq.00000000-0000-0000-0000-000000000000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<Specialty>::new()))
            .mount(&server)
            .await;

        let svc = service_against(&server).await;
        let err = svc
            .create_doctor(CreateDoctorRequest {
                name: "Jane Doe".into(),
                specialty_id: Uuid::nil(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DoctorError::SpecialtyNotFound));
    }
}
