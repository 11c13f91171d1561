//! Butler: a multi-tenant GitHub App that runs commands from mentions.
//!
//! The library holds the authorization core of the bot. It mints app
//! credentials and caches one session per installation, keeps a directory of
//! which installation can act on which repository, decides whether a user may
//! run a command, parses mentions out of comments, and dispatches the
//! resulting invocations. Commands that need a second repository suspend
//! once and are resumed with a session for that repository or a denial.

pub mod auth;
pub mod commands;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod github;
pub mod permissions;
pub mod service;
pub mod telemetry;
pub mod webhook;

pub use auth::{AppIdentity, CredentialIssuer, SessionCache, TenantSession};
pub use commands::{CommandRegistry, CommandSpec, MentionParser};
pub use config::ButlerConfig;
pub use directory::TenantDirectory;
pub use dispatch::{Dispatcher, EventRouter};
pub use github::{GitHubError, ReqwestTransport};
pub use permissions::{Authorization, PermissionEvaluator, PermissionLevel};
pub use service::Service;
