//! Helpers that turn raw GitHub responses into [`GitHubError`] values.

use http::StatusCode;

use super::error::GitHubError;

/// Checks if a GitHub status indicates rejected credentials.
pub(crate) const fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED)
}

/// Builds the error for a non-success response to `operation`.
pub(crate) fn map_http_error(operation: &str, status: StatusCode, body: &str) -> GitHubError {
    let message = extract_github_message(body).unwrap_or_else(|| "unknown error".to_owned());
    if is_auth_failure(status) {
        GitHubError::Authentication {
            message: format!("{operation} failed: GitHub returned {status} {message}"),
        }
    } else {
        GitHubError::Api {
            status: status.as_u16(),
            message: format!("{operation} failed: {message}"),
        }
    }
}

/// Maps a transport failure from `reqwest` into a network error.
pub(crate) fn map_transport_error(operation: &str, error: &reqwest::Error) -> GitHubError {
    GitHubError::Network {
        message: format!("{operation} failed: {error}"),
    }
}

/// Reads the `message` field GitHub includes in JSON error bodies.
pub(crate) fn extract_github_message(body: &str) -> Option<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return None;
    };
    value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
}
