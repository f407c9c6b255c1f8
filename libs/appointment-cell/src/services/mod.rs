pub mod booking;
pub mod conflict;
pub mod store;
pub mod suggester;

pub use booking::BookingEngine;
pub use conflict::ConflictDetectionService;
pub use store::CalendarStoreService;
pub use suggester::AlternativeSuggesterService;
