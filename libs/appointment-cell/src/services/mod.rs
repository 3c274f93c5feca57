pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod locks;
pub mod slots;
pub mod store;

pub use booking::{AppointmentBookingService, CancellationPolicy};
pub use locks::ProviderLocks;
pub use store::{AppointmentStore, SupabaseAppointmentStore};
