use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Failures reported while acquiring a camera stream.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("camera capture is not supported: {0}")]
    DeviceUnsupported(String),
    #[error("camera constraints cannot be satisfied: {0}")]
    ConstraintUnsatisfiable(String),
    #[error("camera error: {0}")]
    Unknown(String),
}

impl DeviceError {
    pub fn is_constraint(&self) -> bool {
        matches!(self, Self::ConstraintUnsatisfiable(_))
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "Allow camera access for this user and try again.",
            Self::DeviceNotFound(_) => "No camera device was found. Check the connection.",
            Self::DeviceUnsupported(_) => "Camera capture is not supported on this system.",
            Self::ConstraintUnsatisfiable(_) => {
                "The camera does not support the requested settings."
            }
            Self::Unknown(_) => "The camera failed for an unknown reason.",
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no active camera session")]
    NotActive,
    #[error("video source is not ready ({width}x{height})")]
    SourceNotReady { width: u32, height: u32 },
    #[error("failed to read the current frame: {0}")]
    Frame(String),
    #[error("failed to encode still image: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no analysis endpoint is reachable (tried {})", .tried.join(", "))]
    NoEndpointReachable { tried: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisErrorKind {
    NoImage,
    ImageTooLarge,
    NoEndpointReachable,
    AuthError,
    RateLimited,
    PayloadTooLarge,
    UpstreamUnavailable,
    GenericRequestFailed,
    MalformedResponse,
    ConnectivityFailure,
}

impl AnalysisErrorKind {
    /// Maps a non-success HTTP status to the kind shown to the user.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::AuthError,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            StatusCode::PAYLOAD_TOO_LARGE => Self::PayloadTooLarge,
            status if status.is_server_error() => Self::UpstreamUnavailable,
            _ => Self::GenericRequestFailed,
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::NoImage => "There is no image to analyze. Take or upload a photo first.",
            Self::ImageTooLarge => "The image is too large. Use an image under 4 MB.",
            Self::NoEndpointReachable => {
                "Neither the primary nor the fallback analysis server is reachable."
            }
            Self::AuthError => "The analysis service rejected the API key.",
            Self::RateLimited => "Too many requests. Wait a moment and try again.",
            Self::PayloadTooLarge => "The image file is too large for the server. Try a smaller image.",
            Self::UpstreamUnavailable => {
                "The analysis service is temporarily unavailable. Try again shortly."
            }
            Self::GenericRequestFailed => "The analysis request failed.",
            Self::MalformedResponse => "No valid answer was found in the service response.",
            Self::ConnectivityFailure => {
                "Could not reach the analysis server. The server will be re-detected on the next try."
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no image to analyze")]
    NoImage,
    #[error("image payload is {size} bytes, limit is {limit} bytes")]
    ImageTooLarge { size: usize, limit: usize },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("{url} answered {status}: {detail}")]
    Status {
        kind: AnalysisErrorKind,
        status: StatusCode,
        url: String,
        detail: String,
    },
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },
    #[error("could not reach {url}: {source}")]
    Connectivity {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl AnalysisError {
    pub fn kind(&self) -> AnalysisErrorKind {
        match self {
            Self::NoImage => AnalysisErrorKind::NoImage,
            Self::ImageTooLarge { .. } => AnalysisErrorKind::ImageTooLarge,
            Self::Resolve(ResolveError::NoEndpointReachable { .. }) => {
                AnalysisErrorKind::NoEndpointReachable
            }
            Self::Status { kind, .. } => *kind,
            Self::MalformedResponse { .. } => AnalysisErrorKind::MalformedResponse,
            Self::Connectivity { .. } => AnalysisErrorKind::ConnectivityFailure,
        }
    }

    /// True when the request never produced an HTTP response.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Status {
                kind: AnalysisErrorKind::GenericRequestFailed,
                status,
                ..
            } => format!("The analysis request failed ({}).", status.as_u16()),
            other => other.kind().user_message().to_owned(),
        }
    }
}
