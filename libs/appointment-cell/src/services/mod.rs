pub mod availability;
pub mod booking;
pub mod clock;
pub mod conflict;
pub mod lifecycle;
pub mod snapshot;
pub mod store;

pub use availability::{compute_available_slots, OpeningHours};
pub use booking::AppointmentBookingService;
pub use clock::{ClinicClock, Clock, FixedClock};
pub use conflict::{find_conflict, validate_no_conflict, ConflictDetectionService};
pub use lifecycle::{is_past, AppointmentLifecycleService};
pub use snapshot::{ClinicSnapshot, SnapshotCache};
pub use store::{AppointmentStore, MemoryAppointmentStore, SupabaseAppointmentStore};
