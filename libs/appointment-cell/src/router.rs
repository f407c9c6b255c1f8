use std::sync::Arc;

use axum::extract::FromRef;
use axum::routing::{delete, get, post, put};
use axum::{middleware, Router};

use notification_cell::ReminderScheduler;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

/// Routes for the booking engine and calendar reads under `/appointments`. Every route requires
/// authentication, the same way the teacher gated its appointment surface behind one
/// `auth_middleware` layer; generalized over the composite state type so `apps/api` can merge
/// this with the other cells' routers.
pub fn appointment_routes<S>(state: S) -> Router
where
    S: Clone + Send + Sync + 'static,
    Arc<AppConfig>: FromRef<S>,
    Arc<ReminderScheduler>: FromRef<S>,
{
    let config = Arc::<AppConfig>::from_ref(&state);

    // Booking/cancellation/reschedule/patient-scoped reads need the caller's identity; calendar
    // reads (availability, a doctor's day, the plain conflict check) don't.
    let protected = Router::new()
        .route("/appointments/book", post(handlers::book_appointment))
        .route("/appointments/{id}/cancel", delete(handlers::cancel_appointment))
        .route("/appointments/{id}/reschedule", put(handlers::reschedule_appointment))
        .route("/appointments/patient", get(handlers::list_patient_appointments))
        .route("/appointments/upcoming", get(handlers::list_upcoming_appointments))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    let public = Router::new()
        .route("/appointments/availability", get(handlers::get_availability))
        .route("/appointments/doctor/{id}", get(handlers::list_doctor_appointments))
        .route("/appointments/check-availability", get(handlers::check_availability));

    Router::new().merge(protected).merge(public).with_state(state)
}
