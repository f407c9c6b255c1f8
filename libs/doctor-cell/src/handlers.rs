use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::error::AppError;
use uuid::Uuid;

use cache_cell::CacheService;

use crate::models::{
    BlockSlotsRequest, CreateBreakRequest, CreateDoctorRequest, CreateSpecialtyRequest,
    CreateWeeklyScheduleRequest, Doctor, DoctorAvailabilityResponse, DoctorError, SlotStatus,
    UpdateDoctorRequest,
};
use crate::services::{CatalogService, SlotGeneratorService};

impl From<DoctorError> for AppError {
    fn from(e: DoctorError) -> Self {
        match e {
            DoctorError::NotFound => AppError::NotFound("doctor not found".into()),
            DoctorError::SpecialtyNotFound => AppError::NotFound("specialty not found".into()),
            DoctorError::Validation(msg) => AppError::ValidationError(msg),
            DoctorError::SlotOverlap => AppError::Conflict("slots already exist for this window".into()),
            DoctorError::Storage(msg) => AppError::Database(msg),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListDoctorsQuery {
    pub specialty_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListSpecialtiesQuery {
    pub active_only: Option<bool>,
}

fn catalog(config: &AppConfig) -> CatalogService {
    CatalogService::new(SupabaseClient::new(config))
}

fn slot_generator(config: &AppConfig) -> SlotGeneratorService {
    SlotGeneratorService::new(SupabaseClient::new(config))
}

#[axum::debug_handler]
pub async fn create_specialty(
    State(config): State<Arc<AppConfig>>,
    Json(req): Json<CreateSpecialtyRequest>,
) -> Result<Json<Value>, AppError> {
    let specialty = catalog(&config).create_specialty(req).await?;
    Ok(Json(json!({ "message": "specialty created", "data": specialty })))
}

#[axum::debug_handler]
pub async fn list_specialties(
    State(config): State<Arc<AppConfig>>,
    Query(query): Query<ListSpecialtiesQuery>,
) -> Result<Json<Value>, AppError> {
    let specialties = catalog(&config)
        .list_specialties(query.active_only.unwrap_or(false))
        .await?;
    Ok(Json(json!(specialties)))
}

fn doctor_key(id: Uuid) -> String {
    format!("doctor:{}", id)
}

fn doctors_by_specialty_key(specialty_id: Uuid) -> String {
    format!("doctors:specialty:{}", specialty_id)
}

const DOCTORS_ALL_KEY: &str = "doctors:all";

#[axum::debug_handler]
pub async fn create_doctor(
    State(config): State<Arc<AppConfig>>,
    State(cache): State<Arc<CacheService>>,
    Json(req): Json<CreateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let specialty_id = req.specialty_id;
    let doctor = catalog(&config).create_doctor(req).await?;

    cache.put(&doctor_key(doctor.id), &doctor).await;
    cache.invalidate(&doctors_by_specialty_key(specialty_id)).await;
    cache.invalidate(DOCTORS_ALL_KEY).await;

    Ok(Json(json!({ "message": "doctor created", "data": doctor })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(config): State<Arc<AppConfig>>,
    State(cache): State<Arc<CacheService>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let key = doctor_key(doctor_id);
    if let Some(doctor) = cache.get::<Doctor>(&key).await {
        return Ok(Json(json!({ "message": "ok", "data": doctor })));
    }

    let doctor = catalog(&config).get_doctor(doctor_id).await?;
    cache.put(&key, &doctor).await;
    Ok(Json(json!({ "message": "ok", "data": doctor })))
}

#[axum::debug_handler]
pub async fn list_doctors(
    State(config): State<Arc<AppConfig>>,
    State(cache): State<Arc<CacheService>>,
    Query(query): Query<ListDoctorsQuery>,
) -> Result<Json<Value>, AppError> {
    if query.limit.is_some() || query.page.is_some() {
        let limit = query.limit.unwrap_or(20);
        let offset = query
            .offset
            .unwrap_or_else(|| query.page.map(|p| (p.max(1) - 1) * limit).unwrap_or(0));
        let page = catalog(&config).list_doctors_paginated(limit, offset).await?;
        return Ok(Json(json!(page)));
    }

    let key = query
        .specialty_id
        .map(doctors_by_specialty_key)
        .unwrap_or_else(|| DOCTORS_ALL_KEY.to_string());

    if let Some(doctors) = cache.get::<Vec<Doctor>>(&key).await {
        return Ok(Json(json!(doctors)));
    }

    let doctors = catalog(&config).list_doctors(query.specialty_id).await?;
    cache.put(&key, &doctors).await;
    Ok(Json(json!(doctors)))
}

#[axum::debug_handler]
pub async fn update_doctor(
    State(config): State<Arc<AppConfig>>,
    State(cache): State<Arc<CacheService>>,
    Path(doctor_id): Path<Uuid>,
    Json(req): Json<UpdateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let old = catalog(&config).get_doctor(doctor_id).await?;
    let new_specialty_id = req.specialty_id;
    let updated = catalog(&config).update_doctor(doctor_id, req).await?;

    cache.invalidate(&doctor_key(doctor_id)).await;
    cache.invalidate(&doctors_by_specialty_key(old.specialty_id)).await;
    if let Some(new_id) = new_specialty_id {
        if new_id != old.specialty_id {
            cache.invalidate(&doctors_by_specialty_key(new_id)).await;
        }
    }
    cache.invalidate(DOCTORS_ALL_KEY).await;
    cache.put(&doctor_key(doctor_id), &updated).await;

    Ok(Json(json!({ "message": "doctor updated", "data": updated })))
}

#[axum::debug_handler]
pub async fn delete_doctor(
    State(config): State<Arc<AppConfig>>,
    State(cache): State<Arc<CacheService>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let deleted = catalog(&config).delete_doctor(doctor_id).await?;

    cache.invalidate(&doctor_key(doctor_id)).await;
    cache.invalidate(&doctors_by_specialty_key(deleted.specialty_id)).await;
    cache.invalidate(DOCTORS_ALL_KEY).await;

    Ok(Json(json!({ "message": "doctor deleted" })))
}

#[axum::debug_handler]
pub async fn create_weekly_schedule(
    State(config): State<Arc<AppConfig>>,
    Json(req): Json<CreateWeeklyScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let schedule = slot_generator(&config).create_weekly_schedule(req).await?;
    Ok(Json(json!({ "message": "schedule created", "data": schedule })))
}

#[axum::debug_handler]
pub async fn generate_week_slots(
    State(config): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let start_day = body
        .get("start_day")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| AppError::ValidationError("start_day must be an ISO date".into()))?;

    let slots = slot_generator(&config).generate_week_slots(doctor_id, start_day).await;
    Ok(Json(json!({ "message": "slots generated", "count": slots.len(), "data": slots })))
}

#[axum::debug_handler]
pub async fn get_availability(
    State(config): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<std::collections::HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let date = query
        .get("date")
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| AppError::ValidationError("date query param is required".into()))?;

    let slots = slot_generator(&config).slots_for_day(doctor_id, date).await?;
    let total_slots = slots.len() as i64;
    let booked_count = slots.iter().filter(|s| s.status == SlotStatus::Booked).count() as i64;
    let available_slots = slots
        .into_iter()
        .filter(|s| s.status == SlotStatus::Available)
        .collect::<Vec<_>>();

    Ok(Json(json!(DoctorAvailabilityResponse {
        doctor_id,
        date,
        available_slots,
        total_slots,
        booked_count,
    })))
}

#[axum::debug_handler]
pub async fn create_break(
    State(config): State<Arc<AppConfig>>,
    Json(req): Json<CreateBreakRequest>,
) -> Result<Json<Value>, AppError> {
    let created = slot_generator(&config).create_break(req).await?;
    Ok(Json(json!({ "message": "break created", "data": created })))
}

#[axum::debug_handler]
pub async fn block_slots(
    State(config): State<Arc<AppConfig>>,
    Json(req): Json<BlockSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    slot_generator(&config).block_slots(req.doctor_id, req.start, req.end).await?;
    Ok(Json(json!({ "message": "slots blocked" })))
}

#[axum::debug_handler]
pub async fn unblock_slots(
    State(config): State<Arc<AppConfig>>,
    Json(req): Json<BlockSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    slot_generator(&config).unblock_slots(req.doctor_id, req.start, req.end).await?;
    Ok(Json(json!({ "message": "slots unblocked" })))
}
