pub mod metrics;
pub mod metrics_export;
pub mod session_log;
