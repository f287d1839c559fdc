//! # paydesk
//!
//! The request-dispatch core of a multi-tenant payroll back office.
//!
//! ## The contract
//!
//! Every request gets exactly one response. Between arrival and response it
//! passes through one fixed sequence:
//!
//! - **Route resolution**: method and path to a route, in declaration order
//! - **Middleware pipeline**: named guards (`auth`, `guest`, `csrf`,
//!   `permission:resource:action`) run in the order the route lists them
//! - **Handler**: only reached when every guard continued
//!
//! Authorization is fail-closed. An unknown user, a missing tenant, a
//! resolver error and a panic all end in denial or a generic 500, never in
//! the handler running.
//!
//! What the core deliberately leaves to its collaborators:
//!
//! - **Where sessions live**: [`SessionStore`]
//! - **Who users are**: [`CredentialStore`]
//! - **What they may do**: [`PermissionResolver`]
//! - **How pages look**: [`Renderer`]
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use paydesk::{
//!     Config, Dispatcher, HtmlRenderer, MemoryDirectory, MemorySessionStore, Method,
//!     MiddlewareRegistry, RequestContext, RouteTable, Router, Server, Services, Error,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let directory = Arc::new(MemoryDirectory::new());
//!
//!     let table = RouteTable::new()
//!         .route(Method::Get, "/", ["auth"], dashboard)
//!         .route(
//!             Method::Get,
//!             "/positions/update/{id:digits}",
//!             ["auth", "csrf", "permission:config:manage_positions"],
//!             edit_position,
//!         );
//!
//!     let services = Services {
//!         sessions: Arc::new(MemorySessionStore::new(config.session_ttl)),
//!         credentials: directory.clone(),
//!         permissions: directory,
//!         renderer: Arc::new(HtmlRenderer::new("Paydesk", &config.login_path)),
//!     };
//!     let dispatcher = Dispatcher::new(
//!         Router::compile(table)?,
//!         MiddlewareRegistry::with_defaults(&config),
//!         services,
//!         &config,
//!     )?;
//!
//!     Server::bind(config.addr).serve(dispatcher).await?;
//!     Ok(())
//! }
//!
//! fn dashboard(ctx: &mut RequestContext) -> Result<paydesk::Response, Error> {
//!     Ok(ctx.render("Dashboard", "<h1>Welcome back</h1>"))
//! }
//!
//! fn edit_position(ctx: &mut RequestContext) -> Result<String, Error> {
//!     let id: u64 = ctx.param_as("id").unwrap_or_default();
//!     Ok(format!("editing position {id}"))
//! }
//! ```

pub mod app;
mod auth;
mod config;
mod context;
mod csrf;
mod directory;
mod dispatcher;
mod error;
mod handler;
pub mod health;
mod method;
pub mod middleware;
mod request;
mod responder;
mod response;
mod router;
mod server;
mod session;

pub use auth::{
    AuthGate, AuthState, CredentialStore, Credentials, PermissionKey, PermissionResolver,
    Principal, TENANT_KEY, TenantId, USER_KEY, UserId, login, logout,
};
pub use config::Config;
pub use context::{RequestContext, Services};
pub use csrf::{CSRF_FORM_FIELD, CSRF_HEADER_NAME, CSRF_SESSION_KEY, CsrfField, CsrfGuard};
pub use directory::MemoryDirectory;
pub use dispatcher::Dispatcher;
pub use error::{BoxError, Error};
pub use method::Method;
pub use middleware::{Middleware, MiddlewareRegistry, MiddlewareSpec, Outcome, Pipeline};
pub use request::Request;
pub use responder::{ErrorPage, ErrorResponder, HtmlRenderer, Renderer, escape};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::{Constraint, Route, RouteMatch, RouteTable, Router};
pub use server::Server;
pub use session::{MemorySessionStore, Session, SessionData, SessionId, SessionStore};
