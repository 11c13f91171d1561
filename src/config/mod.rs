//! Service configuration loaded from CLI, environment, and files.
//!
//! [`ButlerConfig`] merges its values with ortho-config's layered approach.
//!
//! # Precedence
//!
//! Configuration values are loaded with the following precedence (lowest to
//! highest):
//!
//! 1. **Defaults** – Built-in service defaults
//! 2. **Configuration file** – `.butler.toml` in the current directory, home
//!    directory, or `butler.toml` in the XDG config directory
//! 3. **Environment variables** – `BUTLER_APP_ID`, `BUTLER_PRIVATE_KEY`,
//!    `BUTLER_WEBHOOK_SECRET`, and so on
//! 4. **Command-line arguments** – `--app-id`, `--bot-name`, ...
//!
//! # Configuration File
//!
//! ```toml
//! app_id = 4242
//! private_key_path = "/etc/butler/app.pem"
//! bot_name = "butler"
//! webhook_secret = "change-me"
//! bind_address = "0.0.0.0:5000"
//! personal_account_name = "butler-bot"
//! personal_account_token = "ghp_example"
//! user_denylist = "spammer,other-bot"
//! ```

use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

use ortho_config::OrthoConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::auth::identity::decode_base64_pem;
use crate::auth::{AppIdentity, PersonalAccount};
use crate::dispatch::DEFAULT_POOL_SIZE;
use crate::github::{ApiBase, GitHubError};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:5000";
const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_POLICY_PATH: &str = ".butler.yml";
const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 5;
const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 128;
const PEM_HEADER: &str = "-----BEGIN";
const PEM_KEY_MARKER: &str = "PRIVATE KEY-----";

/// Service configuration supporting CLI, environment, and file sources.
///
/// # Example
///
/// ```no_run
/// use butler::ButlerConfig;
/// use ortho_config::OrthoConfig;
///
/// let config = ButlerConfig::load().expect("failed to load configuration");
/// let identity = config.app_identity().expect("app identity required");
/// assert!(identity.app_id() > 0);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(
    prefix = "BUTLER",
    discovery(
        dotfile_name = ".butler.toml",
        config_file_name = "butler.toml",
        app_name = "butler"
    )
)]
pub struct ButlerConfig {
    /// Numeric GitHub App id.
    ///
    /// Can be provided via:
    /// - CLI: `--app-id <ID>`
    /// - Environment: `BUTLER_APP_ID`
    /// - Config file: `app_id = 4242`
    #[ortho_config()]
    pub app_id: Option<u64>,

    /// Base64-wrapped PEM of the app's RSA private key.
    ///
    /// Takes precedence over `private_key_path` when both are set.
    #[ortho_config()]
    pub private_key: Option<String>,

    /// Path to a PEM file holding the app's RSA private key.
    #[ortho_config()]
    pub private_key_path: Option<String>,

    /// Login the bot answers to. A leading `@` is ignored.
    ///
    /// Can be provided via:
    /// - CLI: `--bot-name <NAME>` or `-b <NAME>`
    /// - Environment: `BUTLER_BOT_NAME`
    /// - Config file: `bot_name = "..."`
    #[ortho_config(cli_short = 'b')]
    pub bot_name: Option<String>,

    /// Shared secret GitHub signs webhook deliveries with.
    #[ortho_config()]
    pub webhook_secret: Option<String>,

    /// Socket address the webhook server binds.
    #[ortho_config()]
    pub bind_address: String,

    /// Root of the GitHub REST API.
    #[ortho_config()]
    pub api_base: String,

    /// Login of the helper account used for forks and cross-fork pull
    /// requests.
    #[ortho_config()]
    pub personal_account_name: Option<String>,

    /// Token of the helper account.
    #[ortho_config()]
    pub personal_account_token: Option<String>,

    /// Comma-separated logins whose events are always ignored.
    #[ortho_config()]
    pub user_denylist: Option<String>,

    /// Repository path of the policy document.
    #[ortho_config()]
    pub policy_path: String,

    /// Maximum number of background jobs running at once.
    #[ortho_config()]
    pub worker_pool_size: usize,

    /// Seconds background jobs get to finish after shutdown is requested.
    #[ortho_config()]
    pub shutdown_grace_seconds: u64,

    /// Deliveries held while the event loop is busy before the webhook
    /// answers `503`.
    #[ortho_config()]
    pub event_queue_capacity: usize,

    /// Writes telemetry events as JSON lines on stderr instead of tracing
    /// records.
    ///
    /// Note: `ortho_config` does not load boolean values from the
    /// environment, so this is a CLI flag or a config file entry.
    #[ortho_config()]
    pub telemetry_jsonl: bool,
}

impl Default for ButlerConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            private_key: None,
            private_key_path: None,
            bot_name: None,
            webhook_secret: None,
            bind_address: DEFAULT_BIND_ADDRESS.to_owned(),
            api_base: DEFAULT_API_BASE.to_owned(),
            personal_account_name: None,
            personal_account_token: None,
            user_denylist: None,
            policy_path: DEFAULT_POLICY_PATH.to_owned(),
            worker_pool_size: DEFAULT_POOL_SIZE,
            shutdown_grace_seconds: DEFAULT_SHUTDOWN_GRACE_SECONDS,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            telemetry_jsonl: false,
        }
    }
}

impl ButlerConfig {
    /// Returns the app id or an error if missing.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when no app id is configured.
    pub fn require_app_id(&self) -> Result<u64, GitHubError> {
        self.app_id.filter(|id| *id > 0).ok_or_else(|| GitHubError::Configuration {
            message: "app id is required (use --app-id or BUTLER_APP_ID)".to_owned(),
        })
    }

    /// Returns the bot login without a leading `@`.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when the name is missing or
    /// blank.
    pub fn require_bot_name(&self) -> Result<&str, GitHubError> {
        self.bot_name
            .as_deref()
            .map(|name| name.trim().trim_start_matches('@'))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| GitHubError::Configuration {
                message: "bot name is required (use --bot-name or -b)".to_owned(),
            })
    }

    /// Returns the webhook secret.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when no secret is configured.
    pub fn require_webhook_secret(&self) -> Result<SecretString, GitHubError> {
        self.webhook_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .map(|secret| SecretString::from(secret.to_owned()))
            .ok_or_else(|| GitHubError::Configuration {
                message: "webhook secret is required to accept deliveries".to_owned(),
            })
    }

    /// Resolves the app's private key to PEM text.
    ///
    /// The inline base64 form wins over the file path.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when neither source is set, the
    /// inline value is not base64, the file cannot be read, or the result
    /// does not look like a PEM private key.
    pub fn resolve_private_key(&self) -> Result<SecretString, GitHubError> {
        let pem: SecretString = match (&self.private_key, &self.private_key_path) {
            (Some(encoded), _) => decode_base64_pem(&SecretString::from(encoded.clone()))?,
            (None, Some(path)) => {
                fs::read_to_string(path)
                    .map(SecretString::from)
                    .map_err(|error| GitHubError::Configuration {
                        message: format!("cannot read private key file {path}: {error}"),
                    })?
            }
            (None, None) => {
                return Err(GitHubError::Configuration {
                    message: "app private key is required (use --private-key or --private-key-path)"
                        .to_owned(),
                });
            }
        };
        let text = pem.expose_secret();
        if !(text.contains(PEM_HEADER) && text.contains(PEM_KEY_MARKER)) {
            return Err(GitHubError::Configuration {
                message: "app private key is not a PEM private key".to_owned(),
            });
        }
        Ok(pem)
    }

    /// Builds the app identity from the app id and private key.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`Self::require_app_id`] and
    /// [`Self::resolve_private_key`], and rejects keys that are not RSA.
    pub fn app_identity(&self) -> Result<AppIdentity, GitHubError> {
        AppIdentity::from_pem(self.require_app_id()?, &self.resolve_private_key()?)
    }

    /// Returns the helper account when both of its settings are present.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when only one of the pair is
    /// set.
    pub fn personal_account(&self) -> Result<Option<PersonalAccount>, GitHubError> {
        let name = self.personal_account_name.as_deref().map(str::trim);
        let token = self.personal_account_token.as_deref().map(str::trim);
        match (name, token) {
            (Some(login), Some(secret)) if !login.is_empty() && !secret.is_empty() => {
                Ok(Some(PersonalAccount::new(
                    login.to_owned(),
                    SecretString::from(secret.to_owned()),
                )))
            }
            (None, None) => Ok(None),
            _ => Err(GitHubError::Configuration {
                message: "personal_account_name and personal_account_token must be set together"
                    .to_owned(),
            }),
        }
    }

    /// Parses the configured API root.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] for a relative or malformed URL.
    pub fn parsed_api_base(&self) -> Result<ApiBase, GitHubError> {
        ApiBase::parse(self.api_base.trim())
    }

    /// Parses the address the webhook server binds.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when the value is not a socket
    /// address.
    pub fn socket_address(&self) -> Result<SocketAddr, GitHubError> {
        self.bind_address
            .trim()
            .parse()
            .map_err(|error| GitHubError::Configuration {
                message: format!("invalid bind address {}: {error}", self.bind_address),
            })
    }

    /// Denylisted logins, lower-cased, blanks dropped.
    #[must_use]
    pub fn denylisted_logins(&self) -> Vec<String> {
        self.user_denylist
            .as_deref()
            .map(|list| {
                list.split(',')
                    .map(|login| login.trim().to_lowercase())
                    .filter(|login| !login.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Grace period for background jobs at shutdown.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

#[cfg(test)]
mod tests;
