//! Per-request orchestration and the top-level failure boundary.
//!
//! ```text
//! open session ─▶ resolve route ─▶ build pipeline ─▶ run ─▶ handler
//!                      │                              │
//!                      ▼                              ▼
//!                     404                   Terminal response as-is
//!
//! any Err or panic in the above ─▶ one critical log ─▶ generic 500
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use cookie::{Cookie, SameSite};
use http::StatusCode;
use tracing::{error, info};

use crate::auth::AuthState;
use crate::config::Config;
use crate::context::{RequestContext, Services};
use crate::error::Error;
use crate::method::Method;
use crate::middleware::{MiddlewareRegistry, Outcome, Pipeline};
use crate::request::Request;
use crate::responder::ErrorResponder;
use crate::response::Response;
use crate::router::Router;
use crate::session::Session;

const NOT_FOUND_MESSAGE: &str = "The page you are looking for does not exist.";
const FAILURE_MESSAGE: &str = "Something went wrong on our side. Please try again later.";

/// The single entry point for every request.
pub struct Dispatcher {
    router: Router,
    registry: MiddlewareRegistry,
    services: Services,
    responder: ErrorResponder,
    cookie_name: String,
    cookie_secure: bool,
}

impl Dispatcher {
    /// Fails if any route names middleware the registry cannot build.
    pub fn new(
        router: Router,
        registry: MiddlewareRegistry,
        services: Services,
        config: &Config,
    ) -> Result<Self, Error> {
        for route in router.routes() {
            Pipeline::build(&registry, route.middleware())?;
        }
        Ok(Self {
            router,
            registry,
            responder: ErrorResponder::new(Arc::clone(&services.renderer)),
            services,
            cookie_name: config.session_cookie.clone(),
            cookie_secure: config.cookie_secure,
        })
    }

    /// Produces exactly one response for `request`. Never panics and never
    /// returns an error: every failure becomes a 500.
    pub fn handle(&self, request: Request) -> Response {
        let method = request.method();
        let path = request.path().to_owned();

        let mut slot: Option<RequestContext> = None;
        let mut location: Option<String> = None;

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.dispatch(request, &mut slot, &mut location)
        }));
        let failure = match result {
            Ok(Ok(mut response)) => {
                if method == Method::Head {
                    response.body.clear();
                }
                return self.finish(response, slot.as_ref());
            }
            Ok(Err(err)) => err.to_string(),
            Err(payload) => format!("panic: {}", panic_message(payload.as_ref())),
        };

        error!(
            severity = "critical",
            %method,
            path = %path,
            route = location.as_deref().unwrap_or("-"),
            error = %failure,
            "request failed",
        );
        let auth = slot.as_ref().map_or(AuthState::Anonymous, RequestContext::auth_state);
        let response = self.responder.respond(auth, StatusCode::INTERNAL_SERVER_ERROR, FAILURE_MESSAGE);
        self.finish(response, slot.as_ref())
    }

    fn dispatch(
        &self,
        request: Request,
        slot: &mut Option<RequestContext>,
        location: &mut Option<String>,
    ) -> Result<Response, Error> {
        let session = Session::open(
            Arc::clone(&self.services.sessions),
            request.cookie(&self.cookie_name).as_deref(),
        )?;
        let ctx = slot.insert(RequestContext::new(request, session, &self.services));

        let Some(matched) = self.router.resolve(ctx.method(), ctx.path()) else {
            info!(method = %ctx.method(), path = ctx.path(), "no route matched");
            return Ok(ctx.respond(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE));
        };
        *location = Some(matched.route.pattern().to_owned());
        ctx.request_mut().set_params(matched.params);

        let pipeline = Pipeline::build(&self.registry, matched.route.middleware())?;
        match pipeline.run(ctx)? {
            Outcome::Terminal(response) => Ok(response),
            Outcome::Continue => matched.route.handler().call(ctx),
        }
    }

    /// Hands the session id to the client when it does not have it yet.
    fn finish(&self, mut response: Response, ctx: Option<&RequestContext>) -> Response {
        let Some(session) = ctx.map(RequestContext::session) else {
            return response;
        };
        if session.is_issued() {
            let cookie = Cookie::build((self.cookie_name.as_str(), session.id().as_str()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .secure(self.cookie_secure)
                .build();
            response.push_header("set-cookie", cookie.to_string());
        }
        response
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload.downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
