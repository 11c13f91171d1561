//! Per-repository policy document.
//!
//! The document is YAML kept in the repository itself, so maintainers can
//! grant extra commands without touching collaborator settings:
//!
//! ```yaml
//! usr_denylist: [mallory]
//! users:
//!   alice:
//!     can: [tag, merge]
//!     config:
//!       tag: { only: [bug, docs] }
//! special:
//!   everyone:
//!     can: [tag]
//! ```

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::github::GitHubError;

const EVERYONE: &str = "everyone";

/// Per-command configuration attached to a grant.
///
/// A block may carry a single map or a list of maps; for a list only the
/// first entry is consulted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GrantConfig {
    /// `config: { tag: {...} }`
    Single(HashMap<String, Value>),
    /// `config: [{ tag: {...} }, ...]`
    Many(Vec<HashMap<String, Value>>),
}

impl GrantConfig {
    fn for_command(&self, command: &str) -> Option<Value> {
        let map = match self {
            Self::Single(map) => Some(map),
            Self::Many(maps) => maps.first(),
        }?;
        map.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(command))
            .map(|(_, value)| value.clone())
            .filter(|value| !value.is_null())
    }
}

/// Grants for one user or for `everyone`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PolicyBlock {
    /// Commands the block allows.
    #[serde(default)]
    pub can: Vec<String>,
    /// Optional per-command configuration.
    #[serde(default)]
    pub config: Option<GrantConfig>,
}

impl PolicyBlock {
    fn allows(&self, command: &str) -> bool {
        self.can
            .iter()
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(command))
    }
}

/// Outcome of consulting the policy document.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyDecision {
    /// The requester is on the document's denylist.
    Denylisted,
    /// A block grants the command.
    Granted {
        /// Configuration for the command from the granting block.
        local_config: Option<Value>,
    },
    /// Nothing in the document mentions the command for this requester.
    NoGrant,
}

/// Parsed policy document. The default value is the empty policy.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PolicyDocument {
    /// Logins refused regardless of other grants.
    #[serde(default)]
    pub usr_denylist: Vec<String>,
    /// Grants keyed by login.
    #[serde(default)]
    pub users: HashMap<String, PolicyBlock>,
    /// Special buckets; only `everyone` is recognised.
    #[serde(default)]
    pub special: HashMap<String, PolicyBlock>,
}

impl PolicyDocument {
    /// Parses a YAML document. Blank input is the empty policy.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::PolicyFetch`] when the YAML does not have the
    /// expected shape.
    pub fn parse(source: &str) -> Result<Self, GitHubError> {
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed: Option<Self> =
            serde_yaml::from_str(source).map_err(|error| GitHubError::PolicyFetch {
                message: format!("policy document is malformed: {error}"),
            })?;
        Ok(parsed.unwrap_or_default())
    }

    /// Decides whether `login` may run `command` under this document.
    ///
    /// The denylist wins outright. A user-specific grant is preferred over the
    /// `everyone` bucket.
    #[must_use]
    pub fn decide(&self, login: &str, command: &str) -> PolicyDecision {
        if self
            .usr_denylist
            .iter()
            .any(|denied| denied.eq_ignore_ascii_case(login))
        {
            return PolicyDecision::Denylisted;
        }

        let user_block = self
            .users
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(login))
            .map(|(_, block)| block);
        let everyone = self.special.get(EVERYONE);

        [user_block, everyone]
            .into_iter()
            .flatten()
            .find(|block| block.allows(command))
            .map_or(PolicyDecision::NoGrant, |block| PolicyDecision::Granted {
                local_config: block
                    .config
                    .as_ref()
                    .and_then(|config| config.for_command(command)),
            })
    }
}
