pub mod handlers;
pub mod router;
pub mod models;
pub mod services;

pub use models::{Appointment, AppointmentError, AppointmentStatus, TimeSlot};
pub use services::{AppointmentBookingService, AppointmentStore, ProviderLocks};
