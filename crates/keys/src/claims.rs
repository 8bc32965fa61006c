//! Token claims, roles, and the grants an issuer may sign.
//!
//! Every token carries the same four claims on the wire:
//!
//! ```json
//! {
//!   "sub": "42",
//!   "iss": "auth-server",
//!   "iat": 1700000000,
//!   "exp": 1700000900,
//!   "ROLE": "USER"
//! }
//! ```
//!
//! `sub` is either a decimal user id or [`PRIVILEGED_SUBJECT`]. The pairing
//! of subject and role is fixed by [`Grant`], so a privileged token with a
//! user subject cannot be constructed.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Numeric identifier of an end user.
pub type UserId = u64;

/// Subject carried by privileged (service-to-service) tokens.
///
/// Real user ids are unsigned, so this value can never collide with one.
pub const PRIVILEGED_SUBJECT: &str = "-1";

/// Authorization role carried in the `ROLE` claim.
///
/// Roles are compared by exact equality; there is no hierarchy, so a
/// `Privileged` token does not satisfy a `User` requirement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// An end user acting on their own resources.
    User,
    /// A trusted internal service.
    Privileged,
}

impl Role {
    /// Returns the wire name of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Privileged => "PRIVILEGED",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Self::User),
            "PRIVILEGED" => Ok(Self::Privileged),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

/// A subject/role pair the issuer is allowed to sign.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grant {
    /// A user token scoped to one user id.
    User(UserId),
    /// A service token carrying [`PRIVILEGED_SUBJECT`].
    Privileged,
}

impl Grant {
    /// The `sub` claim this grant produces.
    #[must_use]
    pub fn subject(&self) -> String {
        match self {
            Self::User(id) => id.to_string(),
            Self::Privileged => PRIVILEGED_SUBJECT.to_owned(),
        }
    }

    /// The `ROLE` claim this grant produces.
    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            Self::User(_) => Role::User,
            Self::Privileged => Role::Privileged,
        }
    }
}

/// Claims carried by every issued token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: a decimal user id or [`PRIVILEGED_SUBJECT`].
    pub sub: String,
    /// Issuer name.
    pub iss: String,
    /// Issued at (seconds since epoch).
    #[serde(default)]
    pub iat: u64,
    /// Expiration time (seconds since epoch).
    pub exp: u64,
    /// Authorization role.
    #[serde(rename = "ROLE")]
    pub role: Role,
}

impl Claims {
    /// Builds the claims for `grant`, valid from `issued_at` for `ttl_secs`.
    #[must_use]
    pub fn for_grant(grant: Grant, issuer: impl Into<String>, issued_at: u64, ttl_secs: u64) -> Self {
        Self {
            sub: grant.subject(),
            iss: issuer.into(),
            iat: issued_at,
            exp: issued_at.saturating_add(ttl_secs),
            role: grant.role(),
        }
    }

    /// Returns `true` when the token is still valid at `now` (seconds since epoch).
    ///
    /// Expiry is strict: a token whose `exp` equals `now` is already expired.
    #[must_use]
    pub fn is_live_at(&self, now: u64) -> bool {
        self.exp > now
    }

    /// Returns `true` for tokens carrying the privileged sentinel subject.
    #[must_use]
    pub fn is_privileged_subject(&self) -> bool {
        self.sub == PRIVILEGED_SUBJECT
    }

    /// Expiration as a timestamp, if representable.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.exp).ok().and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Current time in whole seconds since the epoch.
#[must_use]
pub fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}
