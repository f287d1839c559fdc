use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use http::StatusCode;
use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

use paydesk::{
    BoxError, Config, CredentialStore, Credentials, Dispatcher, Error, HtmlRenderer,
    MemorySessionStore, Method, MiddlewareRegistry, PermissionKey, PermissionResolver, Principal,
    Request, RequestContext, Response, RouteTable, Router, Services, SessionData, SessionId,
    SessionStore, TenantId, UserId,
};

const COOKIE: &str = "paydesk_session";
const SIGNED_IN: &str = "sess-7";
const TOKEN: &str = "tok-123";
const EDIT: &str = "/positions/update/42";

// ── Collaborators ─────────────────────────────────────────────────────────────

struct NoUsers;

impl CredentialStore for NoUsers {
    fn verify(&self, _: &Credentials) -> Result<Option<Principal>, BoxError> {
        Ok(None)
    }
}

enum Resolver {
    Grant,
    Deny,
    Fail,
    Panic,
}

impl PermissionResolver for Resolver {
    fn is_granted(&self, _: UserId, _: TenantId, _: &PermissionKey) -> Result<bool, BoxError> {
        match self {
            Self::Grant => Ok(true),
            Self::Deny => Ok(false),
            Self::Fail => Err("permission backend unreachable".into()),
            Self::Panic => panic!("permission backend exploded"),
        }
    }
}

// ── Harness ───────────────────────────────────────────────────────────────────

struct Harness {
    dispatcher: Dispatcher,
    sessions: Arc<MemorySessionStore>,
    hits: Arc<AtomicUsize>,
}

impl Harness {
    fn new(resolver: Resolver) -> Self {
        let config = Config::default();
        let sessions = Arc::new(MemorySessionStore::new(Duration::from_secs(600)));
        let hits = Arc::new(AtomicUsize::new(0));

        let guarded = ["auth", "csrf", "permission:config:manage_positions"];
        let (get_hits, post_hits, home_hits) = (hits.clone(), hits.clone(), hits.clone());
        let table = RouteTable::new()
            .route(Method::Get, "/", ["auth"], move |_: &mut RequestContext| -> Result<&'static str, Error> {
                home_hits.fetch_add(1, Ordering::SeqCst);
                Ok("dashboard")
            })
            .route(Method::Get, "/positions/update/{id:digits}", guarded, move |ctx: &mut RequestContext| -> Result<String, Error> {
                get_hits.fetch_add(1, Ordering::SeqCst);
                Ok(format!("editing position {}", ctx.param("id").unwrap_or("-")))
            })
            .route(Method::Post, "/positions/update/{id:digits}", guarded, move |ctx: &mut RequestContext| -> Result<Response, Error> {
                post_hits.fetch_add(1, Ordering::SeqCst);
                Ok(Response::text(format!("saved {}", ctx.form("title").unwrap_or_default())))
            })
            .on(Method::Get, "/boom", |_: &mut RequestContext| -> Result<&'static str, Error> {
                panic!("handler exploded")
            });

        let services = Services {
            sessions: sessions.clone(),
            credentials: Arc::new(NoUsers),
            permissions: Arc::new(resolver),
            renderer: Arc::new(HtmlRenderer::new("Paydesk", &config.login_path)),
        };
        let dispatcher = Dispatcher::new(
            Router::compile(table).unwrap(),
            MiddlewareRegistry::with_defaults(&config),
            services,
            &config,
        )
        .unwrap();

        let mut data = SessionData::new();
        data.insert("user_id".into(), "7".into());
        data.insert("tenant_id".into(), "3".into());
        data.insert("csrf_token".into(), TOKEN.into());
        sessions.save(&SessionId::from(SIGNED_IN), &data).unwrap();

        Self { dispatcher, sessions, hits }
    }

    fn send(&self, request: Request) -> Response {
        self.dispatcher.handle(request)
    }

    fn signed_in(&self, method: Method, path: &str) -> Request {
        Request::new(method, path).with_cookie(COOKIE, SIGNED_IN)
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn stored_token(&self) -> Option<String> {
        self.sessions
            .load(&SessionId::from(SIGNED_IN))
            .unwrap()
            .and_then(|data| data.get("csrf_token").cloned())
    }
}

// ── Log capture ───────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter(self.0.clone())
    }
}

impl Capture {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

/// Runs `f` with every event on this thread written to the returned capture.
fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, Capture) {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .without_time()
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, capture)
}

// ── Authentication ────────────────────────────────────────────────────────────

#[test]
fn requests_without_a_session_never_reach_protected_handlers() {
    let h = Harness::new(Resolver::Grant);

    for request in [
        Request::new(Method::Get, "/"),
        Request::new(Method::Get, EDIT),
        Request::new(Method::Get, EDIT).with_cookie(COOKIE, "unknown-session"),
    ] {
        let res = h.send(request);
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert_eq!(res.header("location"), Some("/login"));
        assert_eq!(res.header("set-cookie"), None);
    }
    assert_eq!(h.hits(), 0);
    assert_eq!(h.sessions.len(), 1);
}

#[test]
fn quoted_session_cookie_is_recognised() {
    let h = Harness::new(Resolver::Grant);

    let res = h.send(Request::new(Method::Get, EDIT).with_header("cookie", &format!("{COOKIE}=\"{SIGNED_IN}\"")));
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(h.hits(), 1);
}

#[test]
fn requests_that_never_write_leave_no_session_behind() {
    let h = Harness::new(Resolver::Grant);

    for path in ["/missing", "/", "/boom"] {
        let res = h.send(Request::new(Method::Get, path));
        assert_eq!(res.header("set-cookie"), None, "{path}");
    }
    assert_eq!(h.sessions.len(), 1);
}

#[test]
fn signed_in_user_with_permission_reaches_the_handler() {
    let h = Harness::new(Resolver::Grant);

    let res = h.send(h.signed_in(Method::Get, EDIT));
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body_text(), "editing position 42");
    assert_eq!(res.header("set-cookie"), None);
    assert_eq!(h.hits(), 1);
}

// ── Authorization ─────────────────────────────────────────────────────────────

#[test]
fn permission_denial_is_403_without_handler_side_effects() {
    let h = Harness::new(Resolver::Deny);

    let res = h.send(h.signed_in(Method::Get, EDIT));
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert!(res.body_text().contains("layout-app"));
    assert_eq!(h.hits(), 0);

    let res = h.send(h.signed_in(Method::Post, EDIT).with_form(&[("csrf_token", TOKEN), ("title", "x")]));
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(h.hits(), 0);
}

#[test]
fn permission_denial_logs_exactly_one_warning() {
    let h = Harness::new(Resolver::Deny);

    let (res, logs) = capture_logs(|| h.send(h.signed_in(Method::Get, EDIT)));
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);

    let warnings: Vec<_> = logs.lines().into_iter().filter(|l| l.contains("WARN")).collect();
    assert_eq!(warnings.len(), 1, "{warnings:#?}");
    assert!(warnings[0].contains("permission=config:manage_positions"), "{}", warnings[0]);
    assert!(warnings[0].contains("user_id=7"), "{}", warnings[0]);
    assert!(warnings[0].contains("tenant_id=3"), "{}", warnings[0]);
}

#[test]
fn resolver_failure_is_500_without_handler_invocation() {
    for resolver in [Resolver::Fail, Resolver::Panic] {
        let h = Harness::new(resolver);

        let (res, logs) = capture_logs(|| h.send(h.signed_in(Method::Get, EDIT)));
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!res.body_text().contains("permission backend"));
        assert_eq!(h.hits(), 0);

        let errors: Vec<_> = logs.lines().into_iter().filter(|l| l.contains("ERROR")).collect();
        assert_eq!(errors.len(), 1, "{errors:#?}");
        assert!(errors[0].contains("critical"), "{}", errors[0]);
        assert!(errors[0].contains("permission backend"), "{}", errors[0]);
    }
}

#[test]
fn handler_panic_is_a_generic_500() {
    let h = Harness::new(Resolver::Grant);

    let res = h.send(Request::new(Method::Get, "/boom"));
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.body_text().contains("layout-minimal"));
    assert!(!res.body_text().contains("exploded"));
}

// ── CSRF ──────────────────────────────────────────────────────────────────────

#[test]
fn safe_requests_keep_the_existing_token() {
    let h = Harness::new(Resolver::Grant);

    h.send(h.signed_in(Method::Get, EDIT));
    h.send(h.signed_in(Method::Get, EDIT));
    assert_eq!(h.stored_token().as_deref(), Some(TOKEN));
}

#[test]
fn safe_methods_succeed_with_any_token() {
    let h = Harness::new(Resolver::Grant);

    let res = h.send(
        h.signed_in(Method::Get, EDIT)
            .with_header("X-CSRF-Token", "garbage")
            .with_form(&[("csrf_token", "also-garbage")]),
    );
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(h.hits(), 1);
    assert_eq!(h.stored_token().as_deref(), Some(TOKEN));
}

#[test]
fn csrf_mismatch_is_403_and_clears_the_token() {
    let h = Harness::new(Resolver::Grant);

    let (res, logs) = capture_logs(|| {
        h.send(h.signed_in(Method::Post, EDIT).with_form(&[("csrf_token", "forged"), ("title", "x")]))
    });
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(h.hits(), 0);
    assert_eq!(h.stored_token(), None);
    assert!(logs.lines().iter().any(|l| l.contains("ERROR") && l.contains("alert")));

    // The old token is gone for good.
    let res = h.send(h.signed_in(Method::Post, EDIT).with_form(&[("csrf_token", TOKEN)]));
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(h.hits(), 0);
}

#[test]
fn matching_token_lets_the_post_through() {
    let h = Harness::new(Resolver::Grant);

    let res = h.send(h.signed_in(Method::Post, EDIT).with_form(&[("csrf_token", TOKEN), ("title", "Clerk")]));
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body_text(), "saved Clerk");
    assert_eq!(h.hits(), 1);

    let res = h.send(h.signed_in(Method::Post, EDIT).with_header("x-csrf-token", TOKEN));
    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(h.hits(), 2);
}

// ── Routing ───────────────────────────────────────────────────────────────────

#[test]
fn digit_placeholders_only_match_digits() {
    let h = Harness::new(Resolver::Grant);

    assert_eq!(h.send(h.signed_in(Method::Get, "/positions/update/7")).status_code(), StatusCode::OK);
    for path in ["/positions/update/abc", "/positions/update/4a", "/positions/update/", "/positions/update/1/2"] {
        let res = h.send(h.signed_in(Method::Get, path));
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND, "{path}");
    }
    assert_eq!(h.hits(), 1);
}

#[test]
fn head_is_served_by_the_get_route_without_a_body() {
    let h = Harness::new(Resolver::Grant);

    let res = h.send(h.signed_in(Method::Head, EDIT));
    assert_eq!(res.status_code(), StatusCode::OK);
    assert!(res.body().is_empty());
    assert_eq!(h.hits(), 1);
}

#[test]
fn unmatched_method_is_404() {
    let h = Harness::new(Resolver::Grant);

    let res = h.send(h.signed_in(Method::Delete, "/"));
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert!(res.body_text().contains("layout-app"));
}

#[test]
fn unknown_middleware_is_rejected_at_startup() {
    let config = Config::default();
    let table = RouteTable::new().route(Method::Get, "/", ["auth", "audit"], |_: &mut RequestContext| -> Result<&'static str, Error> {
        Ok("")
    });
    let services = Services {
        sessions: Arc::new(MemorySessionStore::new(Duration::from_secs(60))),
        credentials: Arc::new(NoUsers),
        permissions: Arc::new(Resolver::Deny),
        renderer: Arc::new(HtmlRenderer::new("Paydesk", "/login")),
    };
    let result = Dispatcher::new(
        Router::compile(table).unwrap(),
        MiddlewareRegistry::with_defaults(&config),
        services,
        &config,
    );
    assert!(matches!(result, Err(Error::UnknownMiddleware(name)) if name == "audit"));
}
