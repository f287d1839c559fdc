//! Terminal responses and the page layouts they are rendered into.
//!
//! | Visitor | Layout |
//! |---|---|
//! | anonymous | minimal: status, title, message, sign-in link |
//! | authenticated | full application chrome around the same payload |

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use http::StatusCode;

use crate::auth::AuthState;
use crate::response::Response;

/// Payload shared by both layouts.
#[derive(Clone, Copy, Debug)]
pub struct ErrorPage<'a> {
    pub status: StatusCode,
    pub title: &'a str,
    pub message: &'a str,
    pub auth: AuthState,
}

/// Turns page payloads into responses. The templating engine behind it is
/// not the core's concern.
pub trait Renderer: Send + Sync {
    fn error_page(&self, page: &ErrorPage<'_>) -> Response;

    /// Wraps handler-produced `body` markup in the layout matching `auth`.
    fn page(&self, title: &str, body: &str, auth: &AuthState) -> Response;
}

/// Escapes text for HTML element and attribute content.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Built-in HTML layouts.
pub struct HtmlRenderer {
    app_name: String,
    login_path: String,
}

impl HtmlRenderer {
    pub fn new(app_name: &str, login_path: &str) -> Self {
        Self { app_name: app_name.to_owned(), login_path: login_path.to_owned() }
    }

    fn minimal(&self, title: &str, content: &str) -> String {
        format!(
            "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">\
             <title>{title} · {app}</title></head>\
             <body class=\"layout-minimal\"><main>{content}</main></body></html>",
            title = escape(title),
            app = escape(&self.app_name),
        )
    }

    fn full(&self, title: &str, content: &str, auth: &AuthState) -> String {
        let who = match auth {
            AuthState::Authenticated { user_id, tenant_id: Some(t) } => {
                format!("user {user_id} · tenant {t}")
            }
            AuthState::Authenticated { user_id, tenant_id: None } => format!("user {user_id}"),
            AuthState::Anonymous => String::new(),
        };
        format!(
            "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">\
             <title>{title} · {app}</title></head>\
             <body class=\"layout-app\"><header><a href=\"/\">{app}</a>\
             <nav><a href=\"/\">Dashboard</a> <a href=\"/positions\">Positions</a></nav>\
             <span class=\"who\">{who}</span></header><main>{content}</main></body></html>",
            title = escape(title),
            app = escape(&self.app_name),
        )
    }
}

impl Renderer for HtmlRenderer {
    fn error_page(&self, page: &ErrorPage<'_>) -> Response {
        let content = format!(
            "<h1>{} {}</h1><p>{}</p>",
            page.status.as_u16(),
            escape(page.title),
            escape(page.message),
        );
        let html = if page.auth.is_authenticated() {
            self.full(page.title, &content, &page.auth)
        } else {
            let sign_in = format!(r#"<p><a href="{}">Sign in</a></p>"#, escape(&self.login_path));
            self.minimal(page.title, &(content + &sign_in))
        };
        Response::builder()
            .status(page.status)
            .header("cache-control", "no-store")
            .html(html)
    }

    fn page(&self, title: &str, body: &str, auth: &AuthState) -> Response {
        let html = if auth.is_authenticated() {
            self.full(title, body, auth)
        } else {
            self.minimal(title, body)
        };
        Response::html(html)
    }
}

/// Produces the response that ends a request early.
#[derive(Clone)]
pub struct ErrorResponder {
    renderer: Arc<dyn Renderer>,
}

impl ErrorResponder {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self { renderer }
    }

    /// Renders `status` with a safe, user-facing `message`.
    ///
    /// Never fails: if the renderer panics, a plain-text body with the same
    /// status is returned instead.
    pub fn respond(&self, auth: AuthState, status: StatusCode, message: &str) -> Response {
        let title = status.canonical_reason().unwrap_or("Error");
        let page = ErrorPage { status, title, message, auth };
        panic::catch_unwind(AssertUnwindSafe(|| self.renderer.error_page(&page)))
            .unwrap_or_else(|_| {
                Response::builder()
                    .status(status)
                    .text(format!("{} {title}", status.as_u16()))
            })
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{TenantId, UserId};

    fn responder() -> ErrorResponder {
        ErrorResponder::new(Arc::new(HtmlRenderer::new("Paydesk", "/login")))
    }

    fn signed_in() -> AuthState {
        AuthState::Authenticated { user_id: UserId(7), tenant_id: Some(TenantId(3)) }
    }

    #[test]
    fn anonymous_visitors_get_the_minimal_layout() {
        let res = responder().respond(AuthState::Anonymous, StatusCode::NOT_FOUND, "No such page.");
        let body = res.body_text();
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert!(body.contains("layout-minimal"));
        assert!(body.contains("404 Not Found"));
        assert!(body.contains(r#"href="/login""#));
        assert!(!body.contains("<nav>"));
    }

    #[test]
    fn authenticated_visitors_get_the_full_layout() {
        let res = responder().respond(signed_in(), StatusCode::FORBIDDEN, "Not allowed.");
        let body = res.body_text();
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
        assert!(body.contains("layout-app"));
        assert!(body.contains("403 Forbidden"));
        assert!(body.contains("user 7 · tenant 3"));
    }

    #[test]
    fn messages_are_escaped() {
        let res = responder().respond(AuthState::Anonymous, StatusCode::BAD_REQUEST, "<script>x</script>");
        let body = res.body_text();
        assert!(!body.contains("<script>"));
        assert!(body.contains("&lt;script&gt;"));
    }

    struct Exploding;

    impl Renderer for Exploding {
        fn error_page(&self, _: &ErrorPage<'_>) -> Response {
            panic!("template missing")
        }

        fn page(&self, _: &str, _: &str, _: &AuthState) -> Response {
            panic!("template missing")
        }
    }

    #[test]
    fn renderer_panic_degrades_to_plain_text() {
        let responder = ErrorResponder::new(Arc::new(Exploding));
        let res = responder.respond(AuthState::Anonymous, StatusCode::INTERNAL_SERVER_ERROR, "x");
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body_text(), "500 Internal Server Error");
    }
}
