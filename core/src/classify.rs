//! Turning request errors into something a screen can show.
//!
//! Servers may explain a failure with a `{"message": "..."}` body. Anything
//! else falls back to the error's own `Display` text. None of these
//! functions inspect more than the top-level `message` field, and none of
//! them fail.

use crate::error::RequestError;

/// Returns the server-supplied message of an API error, if its body is a JSON
/// object with a string `message` field.
pub fn extract_message(error: &RequestError) -> Option<String> {
    let body = error.api()?.body.as_ref()?;
    body.as_object()?
        .get("message")?
        .as_str()
        .map(str::to_owned)
}

/// The server message when there is one, the error's description otherwise.
pub fn error_message(error: &RequestError) -> String {
    extract_message(error).unwrap_or_else(|| error.to_string())
}

/// Which panel renders a failed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorPanel {
    /// The requested record does not exist.
    NotFound { message: String },
    Generic { message: String },
}

impl ErrorPanel {
    /// List failures always use the generic panel.
    pub fn for_list(error: &RequestError) -> Self {
        ErrorPanel::Generic {
            message: error_message(error),
        }
    }

    /// Detail failures get a dedicated panel for 404.
    pub fn for_detail(error: &RequestError) -> Self {
        let message = error_message(error);
        if error.is_not_found() {
            ErrorPanel::NotFound { message }
        } else {
            ErrorPanel::Generic { message }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ErrorPanel::NotFound { message } | ErrorPanel::Generic { message } => message,
        }
    }
}
