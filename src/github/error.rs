//! Error types exposed by the GitHub access layer.

use thiserror::Error;

/// Errors surfaced while minting credentials or communicating with GitHub.
///
/// Authorization denials are deliberately absent: a denial is a normal value
/// (see [`crate::permissions::Authorization`]) and never travels through this
/// type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GitHubError {
    /// Signing an app assertion or exchanging it for a tenant token failed.
    #[error("credential error: {message}")]
    Credential {
        /// Detail from the signer or the token exchange response.
        message: String,
    },

    /// GitHub refused to issue a token for the installation.
    ///
    /// This means the app lost access to the tenant.
    #[error("installation {installation_id} is forbidden for this app")]
    InstallationForbidden {
        /// Installation that rejected the token exchange.
        installation_id: u64,
    },

    /// GitHub rejected the tenant token again after one regeneration.
    #[error("GitHub rejected the credentials: {message}")]
    Authentication {
        /// GitHub error message returned with the 401 response.
        message: String,
    },

    /// GitHub returned a non-success status.
    #[error("GitHub API error ({status}): {message}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// Networking failed while calling GitHub.
    #[error("network error talking to GitHub: {message}")]
    Network {
        /// Transport-level error detail.
        message: String,
    },

    /// A response body did not have the expected shape.
    #[error("unexpected response from GitHub: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },

    /// A repository policy document could not be fetched or parsed.
    #[error("policy document unavailable: {message}")]
    PolicyFetch {
        /// Description of the fetch or parse failure.
        message: String,
    },

    /// A repository reference was not of the form `owner/name`.
    #[error("invalid repository reference: {0}")]
    InvalidRepository(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {message}")]
    Configuration {
        /// Details about the configuration failure.
        message: String,
    },

    /// A local git operation failed.
    #[error("git error: {message}")]
    Git {
        /// Error detail reported by libgit2.
        message: String,
    },

    /// Local I/O operation failed.
    #[error("I/O error: {message}")]
    Io {
        /// Error detail from the underlying I/O operation.
        message: String,
    },

    /// A background job could not be scheduled or did not finish.
    #[error("worker pool error: {message}")]
    WorkerPool {
        /// Details about the scheduling failure.
        message: String,
    },
}

impl GitHubError {
    /// Returns true for failures that invalidate the current dispatch.
    ///
    /// These are the credential class of errors: they are propagated instead
    /// of being folded into an authorization denial.
    #[must_use]
    pub const fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::Credential { .. } | Self::InstallationForbidden { .. } | Self::Authentication { .. }
        )
    }

    /// Returns true when GitHub answered with `404 Not Found`.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

impl From<git2::Error> for GitHubError {
    fn from(error: git2::Error) -> Self {
        Self::Git {
            message: error.message().to_owned(),
        }
    }
}

impl From<std::io::Error> for GitHubError {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
