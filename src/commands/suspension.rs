//! The single suspension point of a multi-phase command.
//!
//! A multi-phase command's `start` either finishes or returns one
//! [`SuspensionRequest`] naming a second repository. The dispatcher turns the
//! request into a [`SuspensionToken`], negotiates access, and hands both back
//! to `resume`. `resume` returns a plain result, so a second suspension cannot
//! be expressed.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::auth::TenantSession;
use crate::github::RepositorySlug;
use crate::permissions::DenialReason;

/// Outcome of the first phase.
#[derive(Debug)]
pub enum Phase {
    /// The command finished without needing another repository.
    Done,
    /// The command needs access to another repository before continuing.
    Suspend(SuspensionRequest),
}

/// Request for a session on a second repository.
pub struct SuspensionRequest {
    target: String,
    state: Option<Box<dyn Any + Send + Sync>>,
}

impl SuspensionRequest {
    /// Requests access to `target`, expected as `owner/name`.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            state: None,
        }
    }

    /// Carries command state across the suspension.
    #[must_use]
    pub fn with_state<T: Any + Send + Sync>(mut self, state: T) -> Self {
        self.state = Some(Box::new(state));
        self
    }

    /// The raw requested target.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Converts the request into the token passed to `resume`.
    ///
    /// The target is parsed here; an unparsable target leaves the token
    /// without a repository.
    pub(crate) fn into_token(self) -> SuspensionToken {
        let repository = RepositorySlug::parse(self.target.trim()).ok();
        SuspensionToken {
            target: self.target,
            repository,
            state: self.state,
        }
    }
}

impl fmt::Debug for SuspensionRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SuspensionRequest")
            .field("target", &self.target)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}

/// Proof of one suspension, consumed by `resume`. Deliberately neither
/// `Clone` nor `Copy`.
pub struct SuspensionToken {
    target: String,
    repository: Option<RepositorySlug>,
    state: Option<Box<dyn Any + Send + Sync>>,
}

impl SuspensionToken {
    /// The raw requested target.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The parsed target, absent when it was not `owner/name`.
    #[must_use]
    pub const fn repository(&self) -> Option<&RepositorySlug> {
        self.repository.as_ref()
    }

    /// Takes the state stored by [`SuspensionRequest::with_state`], if it has
    /// type `T`.
    pub fn take_state<T: Any>(&mut self) -> Option<T> {
        let boxed = self.state.take()?;
        match boxed.downcast::<T>() {
            Ok(state) => Some(*state),
            Err(other) => {
                self.state = Some(other);
                None
            }
        }
    }
}

impl fmt::Debug for SuspensionToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SuspensionToken")
            .field("target", &self.target)
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

/// What a suspended command receives on resume.
#[derive(Debug, Clone)]
pub enum SecondaryGrant {
    /// A live session on the requested repository.
    Session(Arc<TenantSession>),
    /// The deny marker: access was not granted. Not an error.
    Denied(DenialReason),
}

impl SecondaryGrant {
    /// True for the deny marker.
    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::SuspensionRequest;

    #[derive(Debug, PartialEq)]
    struct Progress {
        issue: u64,
    }

    #[rstest]
    #[case::plain("octo/other", Some("octo/other"))]
    #[case::padded(" octo/other ", Some("octo/other"))]
    #[case::missing_name("octo", None)]
    #[case::too_many_parts("a/b/c", None)]
    #[case::empty("", None)]
    fn parses_target_into_token(#[case] target: &str, #[case] expected: Option<&str>) {
        let token = SuspensionRequest::new(target).into_token();

        assert_eq!(token.target(), target);
        assert_eq!(
            token.repository().map(ToString::to_string).as_deref(),
            expected
        );
    }

    #[rstest]
    fn state_survives_the_suspension_once() {
        let mut token = SuspensionRequest::new("octo/other")
            .with_state(Progress { issue: 4 })
            .into_token();

        assert_eq!(token.take_state::<String>(), None, "wrong type leaves state");
        assert_eq!(token.take_state::<Progress>(), Some(Progress { issue: 4 }));
        assert_eq!(token.take_state::<Progress>(), None, "state is taken once");
    }
}
