use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned by the hosted REST and storage endpoints.
///
/// The REST layer reports `code`/`details`/`hint`, the storage layer reports
/// `error`/`statusCode`; every field is optional so both shapes decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendErrorBody {
    #[serde(default, alias = "msg", alias = "error_description")]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Error)]
#[error("backend returned {status}: {message}")]
pub struct BackendError {
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
}

impl BackendError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
        }
    }

    pub fn from_body(status: u16, raw: &str) -> Self {
        match serde_json::from_str::<BackendErrorBody>(raw) {
            Ok(body) => {
                let message = body
                    .message
                    .or(body.error)
                    .or(body.details)
                    .unwrap_or_else(|| raw.trim().to_string());
                Self {
                    status,
                    code: body.code,
                    message,
                }
            }
            Err(_) => Self::new(status, raw.trim()),
        }
    }
}
