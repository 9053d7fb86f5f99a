//! Fetch slots - Last-known-good data with an in-flight guard

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::backend::BackendError;

/// Returned when a fetch is requested while another one is outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a fetch for this slot is already in flight")]
pub struct AlreadyInFlight;

/// Cached result of one kind of periodic fetch
///
/// The value is only ever replaced wholesale by a successful fetch. A failed
/// fetch records the error and keeps whatever was there before.
#[derive(Debug, Clone)]
pub struct FetchSlot<T> {
    value: Option<T>,
    in_flight: bool,
    last_error: Option<BackendError>,
    last_updated: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
}

impl<T> Default for FetchSlot<T> {
    fn default() -> Self {
        Self {
            value: None,
            in_flight: false,
            last_error: None,
            last_updated: None,
            last_attempt: None,
        }
    }
}

impl<T> FetchSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the slot as fetching. Rejected if a fetch is already outstanding.
    pub fn begin_fetch(&mut self) -> Result<(), AlreadyInFlight> {
        if self.in_flight {
            return Err(AlreadyInFlight);
        }
        self.in_flight = true;
        self.last_attempt = Some(Utc::now());
        Ok(())
    }

    pub fn commit_success(&mut self, value: T) {
        self.value = Some(value);
        self.last_error = None;
        self.in_flight = false;
        self.last_updated = Some(Utc::now());
    }

    pub fn commit_failure(&mut self, error: BackendError) {
        self.last_error = Some(error);
        self.in_flight = false;
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn last_error(&self) -> Option<&BackendError> {
        self.last_error.as_ref()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.last_attempt
    }
}
