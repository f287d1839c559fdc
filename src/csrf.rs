//! CSRF token lifecycle.
//!
//! One token per session, generated lazily and kept until the session ends
//! or a validation fails. Tokens are not rotated after a successful check.

use std::fmt;

use subtle::ConstantTimeEq;

use crate::error::Error;
use crate::session::{Session, random_token};

/// Session key holding the token.
pub const CSRF_SESSION_KEY: &str = "csrf_token";
/// Form field the token is submitted in.
pub const CSRF_FORM_FIELD: &str = "csrf_token";
/// Header alternative for non-form clients.
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

const TOKEN_BYTES: usize = 32;

/// Hidden form input carrying the current token. `Display` renders the
/// HTML element; the token alphabet is URL-safe base64 and needs no escaping.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CsrfField {
    pub name: &'static str,
    pub value: String,
}

impl fmt::Display for CsrfField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r#"<input type="hidden" name="{}" value="{}">"#, self.name, self.value)
    }
}

/// CSRF operations over the request's session.
pub struct CsrfGuard<'a> {
    session: &'a mut Session,
}

impl<'a> CsrfGuard<'a> {
    pub fn new(session: &'a mut Session) -> Self {
        Self { session }
    }

    /// Returns the session's token, generating one first if none exists.
    pub fn init(&mut self) -> Result<String, Error> {
        if let Some(token) = self.token() {
            return Ok(token.to_owned());
        }
        let token = random_token(TOKEN_BYTES);
        self.session.set(CSRF_SESSION_KEY, token.clone())?;
        Ok(token)
    }

    /// The stored token, if any.
    pub fn token(&self) -> Option<&str> {
        self.session.get(CSRF_SESSION_KEY).filter(|t| !t.is_empty())
    }

    /// Constant-time comparison of `submitted` against the stored token.
    /// A missing token on either side never validates.
    pub fn validate(&self, submitted: Option<&str>) -> bool {
        match (self.token(), submitted) {
            (Some(stored), Some(submitted)) => {
                stored.as_bytes().ct_eq(submitted.as_bytes()).into()
            }
            _ => false,
        }
    }

    pub fn destroy(&mut self) -> Result<(), Error> {
        self.session.unset(CSRF_SESSION_KEY)
    }

    /// Form marker for the rendering layer, `None` until `init` has run.
    pub fn field(&self) -> Option<CsrfField> {
        self.token().map(|t| CsrfField { name: CSRF_FORM_FIELD, value: t.to_owned() })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::session::MemorySessionStore;

    fn session() -> Session {
        let store = Arc::new(MemorySessionStore::new(Duration::from_secs(60)));
        Session::open(store, None).unwrap()
    }

    #[test]
    fn init_is_idempotent() {
        let mut session = session();
        let mut csrf = CsrfGuard::new(&mut session);
        let first = csrf.init().unwrap();
        let second = csrf.init().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 43);
    }

    #[test]
    fn init_after_destroy_issues_a_new_token() {
        let mut session = session();
        let mut csrf = CsrfGuard::new(&mut session);
        let first = csrf.init().unwrap();
        csrf.destroy().unwrap();
        assert_eq!(csrf.token(), None);
        assert_ne!(csrf.init().unwrap(), first);
    }

    #[test]
    fn validate_requires_exact_match() {
        let mut session = session();
        let mut csrf = CsrfGuard::new(&mut session);
        let token = csrf.init().unwrap();

        assert!(csrf.validate(Some(&token)));
        assert!(!csrf.validate(Some(&token[..token.len() - 1])));
        assert!(!csrf.validate(Some("forged")));
        assert!(!csrf.validate(Some("")));
        assert!(!csrf.validate(None));
    }

    #[test]
    fn nothing_validates_without_a_stored_token() {
        let mut session = session();
        let csrf = CsrfGuard::new(&mut session);
        assert!(!csrf.validate(Some("")));
        assert!(!csrf.validate(None));
    }

    #[test]
    fn field_renders_hidden_input() {
        let mut session = session();
        let mut csrf = CsrfGuard::new(&mut session);
        assert_eq!(csrf.field(), None);

        let token = csrf.init().unwrap();
        let html = csrf.field().unwrap().to_string();
        assert_eq!(html, format!(r#"<input type="hidden" name="csrf_token" value="{token}">"#));
    }
}
