//! Policy derivation and operation admission.
//!
//! `engine` folds snapshots into throttling policies with hysteresis;
//! `admission` answers "may I do X?" for a single operation.

pub mod admission;
pub mod engine;

pub use admission::{Admission, DenyReason};
pub use engine::PolicyEngine;
