//! Shared vocabulary for talking to the GitHub REST API.
//!
//! This module owns the outbound transport seam, the error type every other
//! component returns, `Link`-header pagination, rate-limit headers, identity
//! newtypes, payload models, and typed endpoint helpers built on top of a
//! tenant session.

pub mod api;
pub mod error;
pub(crate) mod error_mapping;
pub mod locator;
pub mod models;
pub mod pagination;
pub mod rate_limit;
pub mod transport;

pub use api::{ForkedRepository, IssueState, RepositoryClient};
pub use error::GitHubError;
pub use locator::{ApiBase, InstallationId, RepositoryName, RepositoryOwner, RepositorySlug};
pub use models::{PullRequestDetail, WebhookEvent};
pub use rate_limit::RateLimitInfo;
pub use transport::{ApiRequest, ApiResponse, ApiTransport, Authorization, ReqwestTransport};

#[cfg(test)]
pub use transport::MockApiTransport;
