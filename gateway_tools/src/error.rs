use thiserror::Error;

use crate::ProcessorErrorBody;

#[derive(Debug, Error)]
pub enum ProcessorApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Request could not be delivered: {0}")]
    Transport(String),
    #[error("Request timed out before the processor responded")]
    Timeout,
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Processor returned error {status}. {}", .body.message.as_deref().unwrap_or("No message"))]
    ProcessorError { status: u16, body: ProcessorErrorBody },
    #[error("Invalid request parameters: {0}")]
    InvalidParameters(String),
}

impl ProcessorApiError {
    /// The processor's machine-readable error code, if the processor answered with an error envelope.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::ProcessorError { body, .. } => body.code.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ProcessorError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
