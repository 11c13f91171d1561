//! Identity wrappers for repositories, installations, and the API base URL.

use std::fmt;

use url::Url;

use super::error::GitHubError;

/// Repository owner wrapper to avoid stringly typed parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryOwner(String);

impl RepositoryOwner {
    /// Validates that the owner login is non-empty and free of separators.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::InvalidRepository`] for an empty or nested value.
    pub fn new(value: &str) -> Result<Self, GitHubError> {
        if !is_path_segment(value) {
            return Err(GitHubError::InvalidRepository(value.to_owned()));
        }
        Ok(Self(value.to_owned()))
    }

    /// Borrow the owner value.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Repository name wrapper to prevent parameter mix-ups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryName(String);

impl RepositoryName {
    /// Validates that the repository name is non-empty and free of separators.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::InvalidRepository`] for an empty or nested value.
    pub fn new(value: &str) -> Result<Self, GitHubError> {
        if !is_path_segment(value) {
            return Err(GitHubError::InvalidRepository(value.to_owned()));
        }
        Ok(Self(value.to_owned()))
    }

    /// Borrow the repository name.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && !value.contains('/')
        && !value.chars().any(char::is_whitespace)
        && value != "."
        && value != ".."
}

/// A repository addressed as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositorySlug {
    owner: RepositoryOwner,
    name: RepositoryName,
}

impl RepositorySlug {
    /// Builds a slug from already validated parts.
    #[must_use]
    pub const fn new(owner: RepositoryOwner, name: RepositoryName) -> Self {
        Self { owner, name }
    }

    /// Parses `owner/name`, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::InvalidRepository`] unless the input has exactly
    /// two non-empty segments.
    ///
    /// # Example
    ///
    /// ```
    /// use butler::github::RepositorySlug;
    ///
    /// let slug = RepositorySlug::parse("octo/hello").expect("valid slug");
    /// assert_eq!(slug.owner().as_str(), "octo");
    /// assert!(RepositorySlug::parse("octo/hello/extra").is_err());
    /// ```
    pub fn parse(value: &str) -> Result<Self, GitHubError> {
        let trimmed = value.trim();
        let (owner, name) = trimmed
            .split_once('/')
            .ok_or_else(|| GitHubError::InvalidRepository(trimmed.to_owned()))?;
        let invalid = |_| GitHubError::InvalidRepository(trimmed.to_owned());
        Ok(Self {
            owner: RepositoryOwner::new(owner).map_err(invalid)?,
            name: RepositoryName::new(name).map_err(invalid)?,
        })
    }

    /// Returns the owning account.
    #[must_use]
    pub const fn owner(&self) -> &RepositoryOwner {
        &self.owner
    }

    /// Returns the repository name.
    #[must_use]
    pub const fn name(&self) -> &RepositoryName {
        &self.name
    }

    /// Returns `owner/name` lower-cased for case-insensitive comparisons.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string().to_lowercase()
    }
}

impl fmt::Display for RepositorySlug {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}", self.owner.as_str(), self.name.as_str())
    }
}

/// Numeric identifier of one app installation (tenant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstallationId(u64);

impl InstallationId {
    /// Wraps a raw installation id.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstallationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Root of the GitHub REST API that every endpoint path is joined onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBase(Url);

impl ApiBase {
    /// Parses an absolute API root such as `https://api.github.com`.
    ///
    /// A trailing slash is added so relative joins keep any path prefix
    /// (GitHub Enterprise serves the API under `/api/v3`).
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when the URL cannot be parsed or
    /// cannot act as a base.
    pub fn parse(raw: &str) -> Result<Self, GitHubError> {
        let normalised = if raw.ends_with('/') {
            raw.to_owned()
        } else {
            format!("{raw}/")
        };
        let url = Url::parse(&normalised).map_err(|error| GitHubError::Configuration {
            message: format!("invalid API base {raw}: {error}"),
        })?;
        if url.cannot_be_a_base() {
            return Err(GitHubError::Configuration {
                message: format!("API base {raw} cannot be used as a base URL"),
            });
        }
        Ok(Self(url))
    }

    /// Joins an endpoint path (without a leading slash) onto the base.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url, GitHubError> {
        self.0
            .join(path.trim_start_matches('/'))
            .map_err(|error| GitHubError::Configuration {
                message: format!("invalid endpoint {path}: {error}"),
            })
    }

    /// Joins a path below a repository, e.g. `issues/3/comments`.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when the joined URL is invalid.
    pub fn repository_endpoint(
        &self,
        repository: &RepositorySlug,
        path: &str,
    ) -> Result<Url, GitHubError> {
        let suffix = path.trim_start_matches('/');
        if suffix.is_empty() {
            self.endpoint(&format!("repos/{repository}"))
        } else {
            self.endpoint(&format!("repos/{repository}/{suffix}"))
        }
    }

    /// Borrows the underlying URL.
    #[must_use]
    pub const fn as_url(&self) -> &Url {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{ApiBase, RepositorySlug};
    use crate::github::GitHubError;

    #[rstest]
    #[case::missing_slash("octo")]
    #[case::empty_owner("/repo")]
    #[case::empty_name("octo/")]
    #[case::too_many_segments("octo/repo/more")]
    #[case::inner_whitespace("octo/my repo")]
    fn rejects_malformed_slugs(#[case] input: &str) {
        let result = RepositorySlug::parse(input);
        assert!(
            matches!(result, Err(GitHubError::InvalidRepository(_))),
            "expected InvalidRepository for {input:?}, got {result:?}"
        );
    }

    #[rstest]
    fn slug_key_is_case_insensitive() {
        let slug = RepositorySlug::parse("  Octo/Hello-World ").expect("slug should parse");
        assert_eq!(slug.to_string(), "Octo/Hello-World");
        assert_eq!(slug.key(), "octo/hello-world");
    }

    #[rstest]
    #[case::public("https://api.github.com", "https://api.github.com/repos/o/r/labels")]
    #[case::enterprise(
        "https://ghe.example.com/api/v3",
        "https://ghe.example.com/api/v3/repos/o/r/labels"
    )]
    fn endpoints_keep_base_path(#[case] base: &str, #[case] expected: &str) {
        let api = ApiBase::parse(base).expect("base should parse");
        let slug = RepositorySlug::parse("o/r").expect("slug should parse");

        let url = api
            .repository_endpoint(&slug, "/labels")
            .expect("endpoint should join");

        assert_eq!(url.as_str(), expected);
    }
}
