//! REST API endpoint modules.

pub mod deliveries;
pub mod jobs;
pub mod status;
pub mod webhooks;
