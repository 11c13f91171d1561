//! Who may run which command where.
//!
//! A decision combines three sources, checked in order: the requester's
//! collaborator permission against the command's minimum scope, the
//! pull-request author override, and the repository's policy document.

mod evaluator;
mod policy;

use std::fmt;

pub use evaluator::{
    Authorization, AuthorizationRequest, DenialReason, GrantRule, PermissionEvaluator,
    PullRequestContext,
};
pub use policy::{GrantConfig, PolicyBlock, PolicyDecision, PolicyDocument};

/// Collaborator permission, ordered by strength.
///
/// # Example
///
/// ```
/// use butler::permissions::PermissionLevel;
///
/// assert!(PermissionLevel::Admin > PermissionLevel::Write);
/// assert_eq!(PermissionLevel::from_github("maintain"), PermissionLevel::Write);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PermissionLevel {
    /// No access.
    None = 0,
    /// Read access.
    Read = 1,
    /// Push access.
    Write = 2,
    /// Full control.
    Admin = 4,
}

impl PermissionLevel {
    /// Maps GitHub's permission string, folding `maintain` into write and
    /// `triage` into read. Anything unrecognised is `None`.
    #[must_use]
    pub fn from_github(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Self::Admin,
            "maintain" | "write" => Self::Write,
            "triage" | "read" => Self::Read,
            _ => Self::None,
        }
    }

    /// Underlying numeric value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::None => "none",
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::PermissionLevel;

    #[rstest]
    #[case::admin("admin", PermissionLevel::Admin)]
    #[case::maintain("maintain", PermissionLevel::Write)]
    #[case::write("write", PermissionLevel::Write)]
    #[case::triage("triage", PermissionLevel::Read)]
    #[case::read("READ", PermissionLevel::Read)]
    #[case::none("none", PermissionLevel::None)]
    #[case::unknown("superuser", PermissionLevel::None)]
    fn maps_github_strings(#[case] raw: &str, #[case] expected: PermissionLevel) {
        assert_eq!(PermissionLevel::from_github(raw), expected);
    }

    #[rstest]
    fn ordering_follows_numeric_value() {
        let levels = [
            PermissionLevel::None,
            PermissionLevel::Read,
            PermissionLevel::Write,
            PermissionLevel::Admin,
        ];

        for pair in levels.windows(2) {
            let [lower, higher] = pair else { continue };
            assert!(lower < higher, "{lower} should be below {higher}");
            assert!(lower.value() < higher.value());
        }
        assert_eq!(PermissionLevel::Admin.value(), 4);
    }
}
