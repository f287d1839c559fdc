//! Request-scoped state handed through the pipeline.

use std::str::FromStr;
use std::sync::Arc;

use http::StatusCode;

use crate::auth::{self, AuthGate, AuthState, CredentialStore, Credentials, PermissionResolver, Principal};
use crate::csrf::CsrfGuard;
use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::responder::{ErrorResponder, Renderer};
use crate::response::Response;
use crate::session::{Session, SessionStore};

/// External collaborators the core talks to.
#[derive(Clone)]
pub struct Services {
    pub sessions: Arc<dyn SessionStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub permissions: Arc<dyn PermissionResolver>,
    pub renderer: Arc<dyn Renderer>,
}

/// Everything one request may touch: the request itself, its session, and
/// access to auth, CSRF and rendering. Owned by exactly one worker for the
/// lifetime of the request.
pub struct RequestContext {
    request: Request,
    session: Session,
    credentials: Arc<dyn CredentialStore>,
    permissions: Arc<dyn PermissionResolver>,
    responder: ErrorResponder,
}

impl RequestContext {
    pub fn new(request: Request, session: Session, services: &Services) -> Self {
        Self {
            request,
            session,
            credentials: Arc::clone(&services.credentials),
            permissions: Arc::clone(&services.permissions),
            responder: ErrorResponder::new(Arc::clone(&services.renderer)),
        }
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn method(&self) -> Method { self.request.method() }
    pub fn path(&self) -> &str { self.request.path() }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    /// Path parameter parsed as `T`. `None` if absent or unparsable.
    pub fn param_as<T: FromStr>(&self, name: &str) -> Option<T> {
        self.param(name)?.parse().ok()
    }

    pub fn form(&self, field: &str) -> Option<String> {
        self.request.form(field)
    }

    pub fn session(&self) -> &Session { &self.session }
    pub fn session_mut(&mut self) -> &mut Session { &mut self.session }

    pub fn auth(&self) -> AuthGate<'_> {
        AuthGate::new(&self.session, self.permissions.as_ref())
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState::from_session(&self.session)
    }

    pub fn csrf(&mut self) -> CsrfGuard<'_> {
        CsrfGuard::new(&mut self.session)
    }

    pub fn login(&mut self, credentials: &Credentials) -> Result<Option<Principal>, Error> {
        auth::login(&mut self.session, self.credentials.as_ref(), credentials)
    }

    pub fn logout(&mut self) -> Result<(), Error> {
        auth::logout(&mut self.session)
    }

    /// Terminal error page for the current visitor.
    pub fn respond(&self, status: StatusCode, message: &str) -> Response {
        self.responder.respond(self.auth_state(), status, message)
    }

    /// Wraps handler markup in the visitor's layout.
    pub fn render(&self, title: &str, body: &str) -> Response {
        self.responder.renderer().page(title, body, &self.auth_state())
    }

    pub(crate) fn request_mut(&mut self) -> &mut Request { &mut self.request }
}
