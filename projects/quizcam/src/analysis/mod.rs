pub mod client;
pub mod progress;
pub mod response;

use serde::Serialize;

use crate::core::errors::{AnalysisError, AnalysisErrorKind};

pub use client::AnalysisClient;
pub use progress::{AnalysisStage, LogProgress, ProgressObserver};

/// What the UI shows once an analysis finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisResult {
    Success { text: String },
    Failure { kind: AnalysisErrorKind, message: String },
}

impl From<Result<String, AnalysisError>> for AnalysisResult {
    fn from(result: Result<String, AnalysisError>) -> Self {
        match result {
            Ok(text) => Self::Success { text },
            Err(err) => Self::Failure {
                kind: err.kind(),
                message: err.user_message(),
            },
        }
    }
}
