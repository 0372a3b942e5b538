#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("invalid queue operation: {0}")]
    Validation(String),
    #[error("queue snapshot raced a local change and was discarded")]
    StaleData,
    #[error("clinical data unavailable for patient {patient_id}")]
    ClinicalDataUnavailable { patient_id: i64 },
}

impl QueueError {
    /// Wraps a transport or backend failure, keeping the service-provided
    /// message when there is one.
    pub fn service(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            QueueError::ServiceUnavailable("the queue service could not be reached".into())
        } else {
            QueueError::ServiceUnavailable(message)
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        QueueError::Validation(message.into())
    }

    /// True for failures that leave local state untouched and are safe to
    /// retry by resubmission.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueueError::ServiceUnavailable(_) | QueueError::StaleData
        )
    }
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;
