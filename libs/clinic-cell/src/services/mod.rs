pub mod operating_hours;

pub use operating_hours::OperatingHoursService;
