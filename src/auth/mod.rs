//! App credentials and per-installation sessions.
//!
//! The [`CredentialIssuer`] signs short-lived app assertions and trades them
//! for installation tokens. A [`TenantSession`] caches one installation's
//! token and regenerates it on expiry or rejection, and the [`SessionCache`]
//! hands out one session per installation for the lifetime of the process.

pub mod cache;
pub mod clock;
pub mod identity;
pub mod issuer;
pub mod session;
pub mod token;

pub use cache::SessionCache;
pub use clock::{Clock, SystemClock};
pub use identity::AppIdentity;
pub use issuer::CredentialIssuer;
pub use session::{PersonalAccount, TenantSession};
pub use token::{Assertion, TenantToken};

#[cfg(any(test, feature = "test-support"))]
pub use clock::ManualClock;
