//! In-memory credential and permission directory.
//!
//! Backs the demo binary and the test suite. Production deployments plug a
//! database-backed [`CredentialStore`] / [`PermissionResolver`] in instead.

use std::collections::HashSet;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::auth::{
    CredentialStore, Credentials, PermissionKey, PermissionResolver, Principal, TenantId, UserId,
};
use crate::error::BoxError;

struct Account {
    principal: Principal,
    email: String,
    password_hash: String,
}

/// Users, their home tenant, and per-tenant permission grants.
#[derive(Default)]
pub struct MemoryDirectory {
    accounts: Vec<Account>,
    grants: HashSet<(UserId, TenantId, String)>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account, hashing `password` with Argon2id.
    pub fn with_user(
        mut self,
        principal: Principal,
        email: &str,
        password: &str,
    ) -> Result<Self, BoxError> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| format!("hashing password for {email}: {e}"))?
            .to_string();
        self.accounts.push(Account {
            principal,
            email: email.to_ascii_lowercase(),
            password_hash,
        });
        Ok(self)
    }

    pub fn grant(mut self, user: UserId, tenant: TenantId, key: &PermissionKey) -> Self {
        self.grants.insert((user, tenant, key.as_str().to_owned()));
        self
    }
}

impl CredentialStore for MemoryDirectory {
    fn verify(&self, credentials: &Credentials) -> Result<Option<Principal>, BoxError> {
        let email = credentials.email.trim().to_ascii_lowercase();
        let Some(account) = self.accounts.iter().find(|a| a.email == email) else {
            return Ok(None);
        };
        let parsed = PasswordHash::new(&account.password_hash)
            .map_err(|e| format!("stored hash for {email} is unreadable: {e}"))?;
        let matches = Argon2::default()
            .verify_password(credentials.password.as_bytes(), &parsed)
            .is_ok();
        Ok(matches.then_some(account.principal))
    }
}

impl PermissionResolver for MemoryDirectory {
    fn is_granted(
        &self,
        user: UserId,
        tenant: TenantId,
        key: &PermissionKey,
    ) -> Result<bool, BoxError> {
        Ok(self.grants.contains(&(user, tenant, key.as_str().to_owned())))
    }
}
