pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{NotificationSettings, PoolSettings, Settings, SweepIntervals, normalize_address};
pub use telemetry::LogFormat;
pub use error::AppError;
