//! Session-backed authentication and tenant-scoped authorization.
//!
//! Authentication state lives in the session under [`USER_KEY`] and
//! [`TENANT_KEY`]. It is re-derived from the session on every call; nothing
//! is cached across requests. Anything that does not decode cleanly is
//! anonymous.

use std::fmt;
use std::str::FromStr;

use tracing::info;

use crate::error::{BoxError, Error};
use crate::session::Session;

pub const USER_KEY: &str = "user_id";
pub const TENANT_KEY: &str = "tenant_id";

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UserId(pub u64);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TenantId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// Ids are positive integers. Zero, signs and whitespace are rejected.
fn parse_id(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok().filter(|id| *id > 0)
}

// ── PermissionKey ─────────────────────────────────────────────────────────────

/// A `resource:action` permission, e.g. `config:manage_positions`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PermissionKey(String);

impl PermissionKey {
    pub fn as_str(&self) -> &str { &self.0 }

    pub fn resource(&self) -> &str {
        self.0.split_once(':').map_or("", |(r, _)| r)
    }

    pub fn action(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, a)| a)
    }
}

impl FromStr for PermissionKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.split_once(':').is_some_and(|(resource, action)| {
            !resource.is_empty()
                && !action.is_empty()
                && !action.contains(':')
                && !s.chars().any(char::is_whitespace)
        });
        if valid {
            Ok(Self(s.to_owned()))
        } else {
            Err(Error::InvalidPermissionKey(s.to_owned()))
        }
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ── AuthState ─────────────────────────────────────────────────────────────────

/// Who is making the current request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthState {
    Anonymous,
    /// `tenant_id` is `None` for a user who has not selected a tenant; such a
    /// user holds no tenant-scoped permissions.
    Authenticated { user_id: UserId, tenant_id: Option<TenantId> },
}

impl AuthState {
    pub fn from_session(session: &Session) -> Self {
        let Some(user_id) = session.get(USER_KEY).and_then(parse_id) else {
            return Self::Anonymous;
        };
        let tenant_id = session.get(TENANT_KEY).and_then(parse_id).map(TenantId);
        Self::Authenticated { user_id: UserId(user_id), tenant_id }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

// ── Collaborators ─────────────────────────────────────────────────────────────

/// A login attempt.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// The identity a successful login resolves to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Principal {
    pub user_id: UserId,
    pub tenant_id: TenantId,
}

/// Verifies login credentials.
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` for wrong credentials; `Err` only when verification itself
    /// could not be performed.
    fn verify(&self, credentials: &Credentials) -> Result<Option<Principal>, BoxError>;
}

/// Answers whether a user holds a permission within a tenant.
pub trait PermissionResolver: Send + Sync {
    fn is_granted(
        &self,
        user: UserId,
        tenant: TenantId,
        key: &PermissionKey,
    ) -> Result<bool, BoxError>;
}

// ── AuthGate ──────────────────────────────────────────────────────────────────

/// Read-only authentication and authorization queries for one request.
pub struct AuthGate<'a> {
    session: &'a Session,
    permissions: &'a dyn PermissionResolver,
}

impl<'a> AuthGate<'a> {
    pub fn new(session: &'a Session, permissions: &'a dyn PermissionResolver) -> Self {
        Self { session, permissions }
    }

    pub fn state(&self) -> AuthState {
        AuthState::from_session(self.session)
    }

    /// True iff the session carries a valid user id.
    pub fn check(&self) -> bool {
        self.state().is_authenticated()
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self.state() {
            AuthState::Authenticated { user_id, .. } => Some(user_id),
            AuthState::Anonymous => None,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        match self.state() {
            AuthState::Authenticated { tenant_id, .. } => tenant_id,
            AuthState::Anonymous => None,
        }
    }

    /// Default-deny permission check.
    ///
    /// Anonymous visitors and users without a tenant are denied without
    /// consulting the resolver. A resolver failure is an error, never a grant.
    pub fn has_permission(&self, key: &PermissionKey) -> Result<bool, Error> {
        let AuthState::Authenticated { user_id, tenant_id: Some(tenant_id) } = self.state() else {
            return Ok(false);
        };
        self.permissions
            .is_granted(user_id, tenant_id, key)
            .map_err(|source| Error::Permission { key: key.to_string(), source })
    }
}

// ── Transitions ───────────────────────────────────────────────────────────────

/// Anonymous → Authenticated.
///
/// On success the session id is regenerated before the identity is written.
/// Wrong credentials leave the session untouched and return `Ok(None)`.
pub fn login(
    session: &mut Session,
    store: &dyn CredentialStore,
    credentials: &Credentials,
) -> Result<Option<Principal>, Error> {
    let Some(principal) = store.verify(credentials).map_err(Error::Credentials)? else {
        info!(email = %credentials.email, "login rejected");
        return Ok(None);
    };
    session.regenerate()?;
    session.set(USER_KEY, principal.user_id.to_string())?;
    session.set(TENANT_KEY, principal.tenant_id.to_string())?;
    info!(user_id = %principal.user_id, tenant_id = %principal.tenant_id, "login succeeded");
    Ok(Some(principal))
}

/// Authenticated → Anonymous. Destroys the session, CSRF token included.
pub fn logout(session: &mut Session) -> Result<(), Error> {
    let user = session.get(USER_KEY).map(str::to_owned);
    session.invalidate()?;
    info!(user_id = user.as_deref().unwrap_or("-"), "logged out");
    Ok(())
}
