use crate::context::RequestContext;
use crate::error::Error;
use crate::middleware::{Middleware, Outcome};
use crate::response::Response;

/// Sends anonymous visitors to the login page.
pub struct RequireAuth {
    login_path: String,
}

impl RequireAuth {
    pub fn new(login_path: &str) -> Self {
        Self { login_path: login_path.to_owned() }
    }
}

impl Middleware for RequireAuth {
    fn name(&self) -> &'static str { "auth" }

    fn execute(&self, ctx: &mut RequestContext) -> Result<Outcome, Error> {
        if ctx.auth().check() {
            Ok(Outcome::Continue)
        } else {
            Ok(Outcome::Terminal(Response::redirect(&self.login_path)))
        }
    }
}

/// Keeps signed-in users off guest-only pages such as the login form.
pub struct RedirectIfAuthenticated {
    home_path: String,
}

impl RedirectIfAuthenticated {
    pub fn new(home_path: &str) -> Self {
        Self { home_path: home_path.to_owned() }
    }
}

impl Middleware for RedirectIfAuthenticated {
    fn name(&self) -> &'static str { "guest" }

    fn execute(&self, ctx: &mut RequestContext) -> Result<Outcome, Error> {
        if ctx.auth().check() {
            Ok(Outcome::Terminal(Response::redirect(&self.home_path)))
        } else {
            Ok(Outcome::Continue)
        }
    }
}
