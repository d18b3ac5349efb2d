use std::fmt;

use thiserror::Error;

/// Filter field a validation failure is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterField {
    Temperature,
    DateRange,
    TimeSlot(usize),
    TimeSlots,
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterField::Temperature => write!(f, "temperature"),
            FilterField::DateRange => write!(f, "date range"),
            FilterField::TimeSlot(idx) => write!(f, "time slot {}", idx + 1),
            FilterField::TimeSlots => write!(f, "time slots"),
        }
    }
}

/// Local, pre-request rejection of the filter state. Never sent to the server.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: FilterField,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: FilterField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Outcome of a failed call made by one of the fetch workers.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{0}")]
    Transport(String),
    #[error("access denied (HTTP {0})")]
    Forbidden(u16),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("access denied")]
    Forbidden,
    #[error("run a search before exporting")]
    NoPriorSearch,
}

impl SearchError {
    /// Transport failures can be retried by re-triggering the same action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::Transport(_))
    }
}

impl From<FetchError> for SearchError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Transport(message) => SearchError::Transport(message),
            FetchError::Forbidden(_) => SearchError::Forbidden,
        }
    }
}

/// A bin with no points reached the aggregation engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("cannot aggregate an empty bin")]
pub struct EmptyBin;
