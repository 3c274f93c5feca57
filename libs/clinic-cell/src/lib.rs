pub mod handlers;
pub mod router;
pub mod models;
pub mod services;

pub use models::{ClinicError, OperatingHours, OperatingWindow, UpsertOperatingHoursRequest};
pub use services::OperatingHoursService;
