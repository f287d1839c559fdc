use http::StatusCode;
use tracing::error;

use crate::context::RequestContext;
use crate::csrf::{CSRF_FORM_FIELD, CSRF_HEADER_NAME};
use crate::error::Error;
use crate::middleware::{Middleware, Outcome};

/// Requires a matching CSRF token on state-changing requests.
///
/// Safe methods only make sure a token exists for the forms they render.
/// A mismatch destroys the stored token and ends the request with 403.
pub struct VerifyCsrf;

impl Middleware for VerifyCsrf {
    fn name(&self) -> &'static str { "csrf" }

    fn execute(&self, ctx: &mut RequestContext) -> Result<Outcome, Error> {
        if ctx.method().is_safe() {
            ctx.csrf().init()?;
            return Ok(Outcome::Continue);
        }

        let submitted = ctx.form(CSRF_FORM_FIELD)
            .or_else(|| ctx.request().header(CSRF_HEADER_NAME).map(str::to_owned));
        if ctx.csrf().validate(submitted.as_deref()) {
            return Ok(Outcome::Continue);
        }

        ctx.csrf().destroy()?;
        let user = ctx.auth().user_id().map_or_else(|| "-".to_owned(), |u| u.to_string());
        error!(
            severity = "alert",
            method = %ctx.method(),
            path = ctx.path(),
            user_id = %user,
            token_present = submitted.is_some(),
            "csrf validation failed",
        );
        Ok(Outcome::Terminal(ctx.respond(
            StatusCode::FORBIDDEN,
            "Your form has expired. Reload the page and try again.",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csrf::CSRF_SESSION_KEY;
    use crate::method::Method;
    use crate::middleware::tests::context;
    use crate::request::Request;

    #[test]
    fn safe_methods_pass_and_issue_a_token() {
        let mut ctx = context(Request::new(Method::Get, "/positions").with_form(&[("csrf_token", "junk")]));
        assert!(matches!(VerifyCsrf.execute(&mut ctx).unwrap(), Outcome::Continue));
        assert!(ctx.session().get(CSRF_SESSION_KEY).is_some());
    }

    #[test]
    fn matching_form_token_passes_and_is_kept() {
        let mut ctx = context(Request::new(Method::Get, "/"));
        let token = ctx.csrf().init().unwrap();

        *ctx.request_mut() = Request::new(Method::Post, "/positions/update/1")
            .with_form(&[("csrf_token", token.as_str())]);
        assert!(matches!(VerifyCsrf.execute(&mut ctx).unwrap(), Outcome::Continue));
        assert_eq!(ctx.csrf().token(), Some(token.as_str()));
    }

    #[test]
    fn header_token_is_accepted() {
        let mut ctx = context(Request::new(Method::Get, "/"));
        let token = ctx.csrf().init().unwrap();

        *ctx.request_mut() = Request::new(Method::Delete, "/positions/1")
            .with_header("X-CSRF-Token", &token);
        assert!(matches!(VerifyCsrf.execute(&mut ctx).unwrap(), Outcome::Continue));
    }

    #[test]
    fn mismatch_is_forbidden_and_clears_the_token() {
        let mut ctx = context(Request::new(Method::Get, "/"));
        ctx.csrf().init().unwrap();

        *ctx.request_mut() = Request::new(Method::Post, "/positions/update/1")
            .with_form(&[("csrf_token", "forged")]);
        let Outcome::Terminal(res) = VerifyCsrf.execute(&mut ctx).unwrap() else {
            panic!("expected terminal");
        };
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ctx.csrf().token(), None);
    }

    #[test]
    fn missing_token_is_forbidden() {
        let mut ctx = context(Request::new(Method::Post, "/logout"));
        let Outcome::Terminal(res) = VerifyCsrf.execute(&mut ctx).unwrap() else {
            panic!("expected terminal");
        };
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    }
}
