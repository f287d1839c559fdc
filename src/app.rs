//! The payroll back office route table.
//!
//! | Method | Path | Middleware |
//! |---|---|---|
//! | GET | `/healthz`, `/readyz` | none |
//! | GET, POST | `/login` | `guest`, `csrf` |
//! | POST | `/logout` | `auth`, `csrf` |
//! | GET | `/` | `auth` |
//! | GET | `/positions` | `auth`, `permission:config:manage_positions` |
//! | GET, POST | `/positions/update/{id:digits}` | `auth`, `csrf`, `permission:config:manage_positions` |

use std::collections::BTreeMap;
use std::sync::Arc;

use http::StatusCode;
use parking_lot::RwLock;

use crate::auth::{Credentials, TenantId};
use crate::context::RequestContext;
use crate::error::Error;
use crate::health;
use crate::method::Method;
use crate::responder::escape;
use crate::response::Response;
use crate::router::RouteTable;

pub const MANAGE_POSITIONS: &str = "permission:config:manage_positions";

const LOGIN_FLASH: &str = "login";
const POSITIONS_FLASH: &str = "positions";

/// A job position on a tenant's payroll.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Position {
    pub id: u64,
    pub title: String,
}

/// Positions per tenant. A tenant never sees another tenant's rows.
#[derive(Default)]
pub struct PositionBook {
    rows: RwLock<BTreeMap<(TenantId, u64), String>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant: TenantId, id: u64, title: &str) {
        self.rows.write().insert((tenant, id), title.to_owned());
    }

    pub fn list(&self, tenant: TenantId) -> Vec<Position> {
        self.rows.read()
            .range((tenant, 0)..=(tenant, u64::MAX))
            .map(|((_, id), title)| Position { id: *id, title: title.clone() })
            .collect()
    }

    pub fn get(&self, tenant: TenantId, id: u64) -> Option<Position> {
        self.rows.read()
            .get(&(tenant, id))
            .map(|title| Position { id, title: title.clone() })
    }

    /// Returns `false` if the position does not exist in `tenant`.
    pub fn rename(&self, tenant: TenantId, id: u64, title: &str) -> bool {
        match self.rows.write().get_mut(&(tenant, id)) {
            Some(row) => {
                *row = title.to_owned();
                true
            }
            None => false,
        }
    }
}

/// Builds the application's routes over `positions`.
pub fn routes(positions: Arc<PositionBook>) -> RouteTable {
    let list = Arc::clone(&positions);
    let edit = Arc::clone(&positions);
    let update = positions;

    RouteTable::new()
        .on(Method::Get, "/healthz", health::liveness)
        .on(Method::Get, "/readyz", health::readiness)
        .route(Method::Get, "/login", ["guest", "csrf"], login_form)
        .route(Method::Post, "/login", ["guest", "csrf"], login_submit)
        .route(Method::Post, "/logout", ["auth", "csrf"], logout)
        .route(Method::Get, "/", ["auth"], dashboard)
        .route(Method::Get, "/positions", ["auth", MANAGE_POSITIONS], move |ctx: &mut RequestContext| {
            list_positions(&list, ctx)
        })
        .route(
            Method::Get,
            "/positions/update/{id:digits}",
            ["auth", "csrf", MANAGE_POSITIONS],
            move |ctx: &mut RequestContext| edit_position(&edit, ctx),
        )
        .route(
            Method::Post,
            "/positions/update/{id:digits}",
            ["auth", "csrf", MANAGE_POSITIONS],
            move |ctx: &mut RequestContext| update_position(&update, ctx),
        )
}

// ── Handlers ──────────────────────────────────────────────────────────────────

fn csrf_input(ctx: &mut RequestContext) -> Result<String, Error> {
    ctx.csrf().init()?;
    Ok(ctx.csrf().field().map(|f| f.to_string()).unwrap_or_default())
}

fn notice(message: Option<String>) -> String {
    message
        .map(|m| format!(r#"<p class="notice">{}</p>"#, escape(&m)))
        .unwrap_or_default()
}

fn login_form(ctx: &mut RequestContext) -> Result<Response, Error> {
    let flash = ctx.session_mut().take_flash(LOGIN_FLASH)?;
    let body = format!(
        r#"<h1>Sign in</h1>{notice}<form method="post" action="/login">{csrf}
<label>Email <input type="email" name="email" required></label>
<label>Password <input type="password" name="password" required></label>
<button type="submit">Sign in</button></form>"#,
        notice = notice(flash),
        csrf = csrf_input(ctx)?,
    );
    Ok(ctx.render("Sign in", &body))
}

fn login_submit(ctx: &mut RequestContext) -> Result<Response, Error> {
    let credentials = Credentials {
        email: ctx.form("email").unwrap_or_default(),
        password: ctx.form("password").unwrap_or_default(),
    };
    if ctx.login(&credentials)?.is_some() {
        return Ok(Response::redirect("/"));
    }
    ctx.session_mut().flash(LOGIN_FLASH, "Those credentials do not match our records.")?;
    Ok(Response::redirect("/login"))
}

fn logout(ctx: &mut RequestContext) -> Result<Response, Error> {
    ctx.logout()?;
    Ok(Response::redirect("/login"))
}

fn dashboard(ctx: &mut RequestContext) -> Result<Response, Error> {
    let body = format!(
        r#"<h1>Dashboard</h1><form method="post" action="/logout">{}<button type="submit">Sign out</button></form>"#,
        csrf_input(ctx)?,
    );
    Ok(ctx.render("Dashboard", &body))
}

/// The tenant the permission middleware already checked. Its absence after
/// that check is a broken invariant, not a user error.
fn tenant(ctx: &RequestContext) -> Result<TenantId, Error> {
    ctx.auth()
        .tenant_id()
        .ok_or(Error::Invariant("permission-gated route reached without a tenant"))
}

fn list_positions(book: &PositionBook, ctx: &mut RequestContext) -> Result<Response, Error> {
    let tenant = tenant(ctx)?;
    let flash = ctx.session_mut().take_flash(POSITIONS_FLASH)?;
    let rows: String = book.list(tenant)
        .iter()
        .map(|p| {
            format!(
                r#"<li>{} <a href="/positions/update/{}">Edit</a></li>"#,
                escape(&p.title),
                p.id,
            )
        })
        .collect();
    Ok(ctx.render("Positions", &format!("<h1>Positions</h1>{}<ul>{rows}</ul>", notice(flash))))
}

fn edit_position(book: &PositionBook, ctx: &mut RequestContext) -> Result<Response, Error> {
    let tenant = tenant(ctx)?;
    let Some(position) = ctx.param_as::<u64>("id").and_then(|id| book.get(tenant, id)) else {
        return Ok(ctx.respond(StatusCode::NOT_FOUND, "That position does not exist."));
    };
    let body = format!(
        r#"<h1>Edit position</h1><form method="post" action="/positions/update/{id}">{csrf}
<label>Title <input name="title" value="{title}" required></label>
<button type="submit">Save</button></form>"#,
        id = position.id,
        csrf = csrf_input(ctx)?,
        title = escape(&position.title),
    );
    Ok(ctx.render("Edit position", &body))
}

fn update_position(book: &PositionBook, ctx: &mut RequestContext) -> Result<Response, Error> {
    let tenant = tenant(ctx)?;
    let Some(id) = ctx.param_as::<u64>("id") else {
        return Ok(ctx.respond(StatusCode::NOT_FOUND, "That position does not exist."));
    };
    let title = ctx.form("title").map(|t| t.trim().to_owned()).unwrap_or_default();
    if title.is_empty() {
        return Ok(ctx.respond(StatusCode::UNPROCESSABLE_ENTITY, "A position needs a title."));
    }
    if !book.rename(tenant, id, &title) {
        return Ok(ctx.respond(StatusCode::NOT_FOUND, "That position does not exist."));
    }
    ctx.session_mut().flash(POSITIONS_FLASH, format!("Saved \"{title}\"."))?;
    Ok(Response::redirect("/positions"))
}
