//! Contact Prediction Library
//!
//! Turns propagated satellite states and ground-station geometry into
//! achievable data rates and open/close contact-window events.

use thiserror::Error;

pub mod link_budget;
pub mod prediction;
pub mod tracker;
pub mod visibility;

pub use link_budget::{LinkAssessment, LinkBudget, LinkBudgetBreakdown, RfBand};
pub use prediction::{predict_windows, PredictedWindow};
pub use tracker::{ActiveContact, ContactEvent, ContactKind, ContactSample, ContactTracker, ContactWindow};
pub use visibility::{assess, isl_contact, Visibility, VisibilitySample};

/// Default inter-satellite-link range threshold, km.
pub const DEFAULT_ISL_RANGE_KM: f64 = 5000.0;

#[derive(Error, Debug)]
pub enum ContactError {
    #[error("Unknown RF band: {0}")]
    UnknownBand(String),
}

pub type Result<T> = std::result::Result<T, ContactError>;
