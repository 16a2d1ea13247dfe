use crate::types::{BookingStatus, CampaignStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub type FleetResult<T> = Result<T, FleetError>;

/// A booking window that blocks a requested slot.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConflictWindow {
    pub booking_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Booking conflict: {} overlapping window(s)", conflicts.len())]
    BookingConflict { conflicts: Vec<ConflictWindow> },

    #[error("Payment verification failed: {0}")]
    PaymentVerification(String),

    #[error("Invalid transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Invalid campaign transition: {from:?} -> {to:?}")]
    InvalidCampaignTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },

    #[error("Alert state error: {0}")]
    AlertState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
