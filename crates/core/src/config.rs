//! Engine runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into
//! the engine. The intent is to avoid reading process-wide environment
//! variables during polling or request handling, which can lead to
//! inconsistent behaviour in multi-threaded runtimes and test harnesses.

use crate::{QueueError, QueueResult};
use capdq_types::NonEmptyText;
use std::time::Duration;

/// Interval between automatic queue refreshes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// How many slots a skipped patient is pushed back by.
pub const DEFAULT_SKIP_POSITIONS: u32 = 5;

/// Engine configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    backend_base_url: String,
    bearer_token: NonEmptyText,
    clinic_name: NonEmptyText,
    poll_interval: Duration,
    skip_positions: u32,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Validation` if the backend base URL is not an
    /// http(s) URL, or if the poll interval or skip distance is zero.
    pub fn new(
        backend_base_url: String,
        bearer_token: NonEmptyText,
        clinic_name: NonEmptyText,
        poll_interval: Duration,
        skip_positions: u32,
    ) -> QueueResult<Self> {
        let backend_base_url = backend_base_url.trim().trim_end_matches('/').to_string();
        if !backend_base_url.starts_with("http://") && !backend_base_url.starts_with("https://") {
            return Err(QueueError::validation(
                "backend base URL must start with http:// or https://",
            ));
        }

        if poll_interval.is_zero() {
            return Err(QueueError::validation("poll interval cannot be zero"));
        }

        if skip_positions == 0 {
            return Err(QueueError::validation("skip distance cannot be zero"));
        }

        Ok(Self {
            backend_base_url,
            bearer_token,
            clinic_name,
            poll_interval,
            skip_positions,
        })
    }

    pub fn backend_base_url(&self) -> &str {
        &self.backend_base_url
    }

    pub fn bearer_token(&self) -> &NonEmptyText {
        &self.bearer_token
    }

    pub fn clinic_name(&self) -> &NonEmptyText {
        &self.clinic_name
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn skip_positions(&self) -> u32 {
        self.skip_positions
    }
}
