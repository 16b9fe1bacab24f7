//! Failures surfaced by the registry client and the version editor.

use thiserror::Error;
use url::Url;

pub type ApiResult<T> = Result<T, ApiError>;

/// Every failure the tool reports to the user.
///
/// Each variant renders as a single human readable line. HTTP failures carry the
/// detail the server sent back, if any.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A credential or setting is missing or malformed.
    #[error("{0}")]
    Configuration(String),

    #[error("Failed to connect to {url}. Please check your network connection and the server URL.")]
    Connection { url: Url },

    #[error("Request to {url} timed out. Please try again.")]
    Timeout { url: Url },

    /// Any other transport level failure (TLS, malformed response, ...)
    #[error("Request failed: {message}")]
    Transport { message: String },

    #[error("Authentication failed. Please check your credentials.{}", with_error(.detail))]
    Authentication { detail: Option<String> },

    #[error("Permission denied. You don't have access to this resource.{}", with_error(.detail))]
    Permission { detail: Option<String> },

    #[error("Resource not found. Please check the URL and try again.{}", with_error(.detail))]
    NotFound { detail: Option<String> },

    #[error("Request failed (Status: {status}){}", with_colon(.detail))]
    ClientRequest { status: u16, detail: Option<String> },

    #[error("Server error occurred (Status: {status}){}. Please try again later.", with_colon(.detail))]
    Server { status: u16, detail: Option<String> },

    /// The response body could not be decoded as JSON.
    #[error("Invalid response body: {0}")]
    Json(#[from] serde_json::Error),

    /// A fetched document does not have the layout the server normally returns.
    #[error("Unexpected response layout: {0}")]
    UnexpectedShape(String),

    #[error("Extendable {0} not found")]
    ExtendableNotFound(String),

    /// The edited text is not valid JSON.
    #[error("Invalid JSON: {0}")]
    Validation(String),

    /// The user aborted the editor or declined the confirmation.
    #[error("{0}")]
    Cancelled(String),

    /// The editing surface itself failed (editor missing, crashed, io error).
    #[error("Editor failed: {0}")]
    Editor(String),

    /// Wraps anything that went wrong while loading and preparing the version.
    #[error("Error getting current version: {source}")]
    Fetch {
        #[source]
        source: Box<ApiError>,
    },
}

impl ApiError {
    /// Maps a failed HTTP status to its error kind.
    ///
    /// Returns `None` for statuses below 400.
    pub fn from_status(status: u16, detail: Option<String>) -> Option<Self> {
        let err = match status {
            0..=399 => return None,
            401 => Self::Authentication { detail },
            403 => Self::Permission { detail },
            404 => Self::NotFound { detail },
            400..=499 => Self::ClientRequest { status, detail },
            _ => Self::Server { status, detail },
        };
        Some(err)
    }

    pub fn fetch(source: ApiError) -> Self {
        Self::Fetch {
            source: Box::new(source),
        }
    }
}

fn with_error(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(" Error: {d}"))
        .unwrap_or_default()
}

fn with_colon(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}
