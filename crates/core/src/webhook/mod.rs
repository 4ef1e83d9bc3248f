//! Webhook notification decoding and interpretation.
//!
//! A notification arrives in one of two shapes (push or pull request). It is
//! decoded once into a typed [`Notification`], then each repository
//! reference in it is resolved into a [`ChangeEvent`]. Downstream components
//! only ever see change events and never need to know which shape produced
//! them.

pub mod events;
pub mod interpreter;
pub mod payload;

pub use events::{ChangeEvent, ChangeKind};
pub use interpreter::{interpret, interpret_notification, Interpretation};
pub use payload::{extract_payload, Notification};
