use chrono::{DateTime, Duration, Utc};
use doctor_cell::{SlotGeneratorService, SlotStatus, TimeSlot};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use tracing::instrument;
use uuid::Uuid;

use crate::models::AppointmentError;

const MAX_ALTERNATIVES: usize = 5;
const SEARCH_WINDOW_DAYS: i64 = 7;

/// Alternative Suggester: up to `MAX_ALTERNATIVES` `AVAILABLE` slots for a doctor that can hold
/// `duration`, starting with `preferred_start`'s day and scanning forward up to a week.
/// Ordering is ascending by start within a day, earlier days first, ties by id.
pub struct AlternativeSuggesterService {
    config: AppConfig,
}

impl AlternativeSuggesterService {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    #[instrument(skip(self))]
    pub async fn suggest(
        &self,
        doctor_id: Uuid,
        preferred_start: DateTime<Utc>,
        duration_minutes: i32,
    ) -> Result<Vec<TimeSlot>, AppointmentError> {
        let slot_generator = SlotGeneratorService::new(SupabaseClient::new(&self.config));
        let mut found = Vec::new();

        for offset in 0..=SEARCH_WINDOW_DAYS {
            if found.len() >= MAX_ALTERNATIVES {
                break;
            }
            let day = preferred_start.date_naive() + Duration::days(offset);
            let mut day_slots = slot_generator
                .slots_for_day(doctor_id, day)
                .await
                .map_err(|e| AppointmentError::Storage(e.to_string()))?
                .into_iter()
                .filter(|s| s.status == SlotStatus::Available)
                .filter(|s| (s.end - s.start).num_minutes() >= duration_minutes as i64)
                .collect::<Vec<_>>();

            day_slots.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));
            found.extend(day_slots);
        }

        found.truncate(MAX_ALTERNATIVES);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconfigured() -> AppConfig {
        AppConfig {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
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

    #[test]
    fn bounds_are_respected_by_construction() {
        // MAX_ALTERNATIVES/SEARCH_WINDOW_DAYS are exercised end-to-end against a live store in
        // the integration suite; this just pins the constants the spec requires.
        assert_eq!(MAX_ALTERNATIVES, 5);
        assert_eq!(SEARCH_WINDOW_DAYS, 7);
        let _ = AlternativeSuggesterService::new(unconfigured());
    }
}
